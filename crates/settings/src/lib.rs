pub mod preferences;
pub mod templates;

pub use preferences::{
    BrowserPreferences, Preferences, PreferencesError, PreferencesStore, UiPreferences,
};
pub use templates::{TemplateCatalog, TemplateError, TemplateItem, TemplateSource, BLANK_TEMPLATE};
