use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::preferences::BrowserPreferences;

/// Identifier of the built-in empty template.
pub const BLANK_TEMPLATE: &str = "BLANK";

/// Starting text of a blank Python file.
const BLANK_PYTHON: &str = "# New Python file\n";

/// Templates shipped with the crate, listed before the user's template folder.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[(
    "keymap.py",
    include_str!("../templates/keymap.py"),
)];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template '{0}'")]
    NotFound(String),
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the text of a [`TemplateItem`] comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Blank,
    Builtin(&'static str),
    File(PathBuf),
}

/// A template offered when creating a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateItem {
    /// File name of the template, or [`BLANK_TEMPLATE`].
    pub id: String,
    pub label: String,
    pub source: TemplateSource,
}

impl TemplateItem {
    fn blank() -> Self {
        Self {
            id: BLANK_TEMPLATE.to_string(),
            label: "Blank".to_string(),
            source: TemplateSource::Blank,
        }
    }

    fn named(name: &str, source: TemplateSource) -> Self {
        let label = Path::new(name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(name)
            .to_string();
        Self {
            id: name.to_string(),
            label,
            source,
        }
    }
}

/// Lazily scanned list of file templates.
///
/// The scan result is cached until [`TemplateCatalog::invalidate`] is called.
/// [`TemplateCatalog::sync`] invalidates whenever the template folder or extension in the
/// preferences changes, which is the only event that can change the list.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    dir: Option<PathBuf>,
    extension: String,
    cache: Option<Vec<TemplateItem>>,
}

impl TemplateCatalog {
    pub fn new(dir: Option<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir,
            extension: extension.into(),
            cache: None,
        }
    }

    pub fn from_preferences(prefs: &BrowserPreferences) -> Self {
        Self::new(prefs.template_dir.clone(), prefs.template_extension.clone())
    }

    /// Applies changed preferences; returns `true` when the cache was dropped.
    pub fn sync(&mut self, prefs: &BrowserPreferences) -> bool {
        if self.dir == prefs.template_dir && self.extension == prefs.template_extension {
            return false;
        }
        self.dir = prefs.template_dir.clone();
        self.extension = prefs.template_extension.clone();
        self.invalidate();
        true
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Returns the templates, scanning the folder on first use after an invalidation.
    pub fn get(&mut self) -> &[TemplateItem] {
        let (dir, extension) = (&self.dir, &self.extension);
        self.cache
            .get_or_insert_with(|| scan(dir.as_deref(), extension))
            .as_slice()
    }

    pub fn find(&mut self, id: &str) -> Option<TemplateItem> {
        self.get().iter().find(|item| item.id == id).cloned()
    }

    /// Text a new file created from template `id` starts with.
    pub fn content_for(&mut self, id: &str) -> Result<String, TemplateError> {
        let item = self
            .find(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
        match item.source {
            TemplateSource::Blank => Ok(blank_content(&self.extension).to_string()),
            TemplateSource::Builtin(text) => Ok(text.to_string()),
            TemplateSource::File(path) => {
                fs::read_to_string(&path).map_err(|source| TemplateError::Read { path, source })
            }
        }
    }

    /// Suggested file name for a file created from template `id`.
    pub fn default_file_name(&self, id: &str) -> String {
        if id == BLANK_TEMPLATE {
            format!("new_file.{}", self.extension)
        } else {
            id.to_string()
        }
    }
}

fn blank_content(extension: &str) -> &'static str {
    if extension.eq_ignore_ascii_case("py") {
        BLANK_PYTHON
    } else {
        ""
    }
}

fn has_extension(name: &Path, extension: &str) -> bool {
    name.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Blank, then the built-ins, then the folder's files; a name already listed is skipped.
fn scan(dir: Option<&Path>, extension: &str) -> Vec<TemplateItem> {
    let mut items = vec![TemplateItem::blank()];
    let mut seen = HashSet::new();
    for (name, text) in BUILTIN_TEMPLATES {
        if has_extension(Path::new(name), extension) && seen.insert(name.to_string()) {
            items.push(TemplateItem::named(name, TemplateSource::Builtin(*text)));
        }
    }

    let Some(dir) = dir else {
        return items;
    };
    let reader = match fs::read_dir(dir) {
        Ok(reader) => reader,
        Err(err) => {
            debug!(path = %dir.display(), error = %err, "template folder unavailable");
            return items;
        }
    };

    let mut found: Vec<PathBuf> = reader
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extension))
        .collect();
    found.sort();

    for path in found {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !seen.insert(name.to_string()) {
            debug!(template = name, "skipping template shadowed by an earlier one");
            continue;
        }
        let name = name.to_string();
        items.push(TemplateItem::named(&name, TemplateSource::File(path)));
    }
    items
}
