use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

const PREFERENCES_VERSION: u32 = 1;
const MAX_ROWS: usize = 100;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("cannot {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed preferences in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown preference '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for preference '{key}'")]
    InvalidValue { key: String, value: String },
}

impl PreferencesError {
    fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| PreferencesError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub browser: BrowserPreferences,
    #[serde(default)]
    pub ui: UiPreferences,
}

fn default_version() -> u32 {
    PREFERENCES_VERSION
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            browser: BrowserPreferences::default(),
            ui: UiPreferences::default(),
        }
    }
}

impl Preferences {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = PREFERENCES_VERSION;
        }
        self.browser.sanitize();
        self.ui.sanitize();
    }

    /// Keys accepted by [`Preferences::set`].
    pub const KEYS: &'static [&'static str] = &[
        "browser.auto_detect_root",
        "browser.default_root_dir",
        "browser.template_dir",
        "browser.template_extension",
        "browser.project_markers",
        "browser.confirm_permanent_delete",
        "ui.use_custom_icons",
        "ui.show_search_bar",
        "ui.dynamic_list_height",
        "ui.min_rows",
        "ui.max_rows",
    ];

    /// Sets a preference from its dotted key and textual value.
    ///
    /// Empty values clear optional paths; `project_markers` takes a comma-separated list.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PreferencesError> {
        let invalid = || PreferencesError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let flag = || parse_bool(value).ok_or_else(invalid);
        let optional_path = || {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
        };

        match key {
            "browser.auto_detect_root" => self.browser.auto_detect_root = flag()?,
            "browser.default_root_dir" => self.browser.default_root_dir = optional_path(),
            "browser.template_dir" => self.browser.template_dir = optional_path(),
            "browser.template_extension" => {
                self.browser.template_extension = value.trim().to_string()
            }
            "browser.project_markers" => {
                self.browser.project_markers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|marker| !marker.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "browser.confirm_permanent_delete" => {
                self.browser.confirm_permanent_delete = flag()?
            }
            "ui.use_custom_icons" => self.ui.use_custom_icons = flag()?,
            "ui.show_search_bar" => self.ui.show_search_bar = flag()?,
            "ui.dynamic_list_height" => self.ui.dynamic_list_height = flag()?,
            "ui.min_rows" => self.ui.min_rows = value.trim().parse().map_err(|_| invalid())?,
            "ui.max_rows" => self.ui.max_rows = value.trim().parse().map_err(|_| invalid())?,
            other => return Err(PreferencesError::UnknownKey(other.to_string())),
        }
        self.sanitize();
        Ok(())
    }

    /// Textual value of a dotted key, in the format [`Preferences::set`] accepts.
    pub fn get(&self, key: &str) -> Option<String> {
        let path = |value: &Option<PathBuf>| {
            value
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default()
        };
        let value = match key {
            "browser.auto_detect_root" => self.browser.auto_detect_root.to_string(),
            "browser.default_root_dir" => path(&self.browser.default_root_dir),
            "browser.template_dir" => path(&self.browser.template_dir),
            "browser.template_extension" => self.browser.template_extension.clone(),
            "browser.project_markers" => self.browser.project_markers.join(","),
            "browser.confirm_permanent_delete" => {
                self.browser.confirm_permanent_delete.to_string()
            }
            "ui.use_custom_icons" => self.ui.use_custom_icons.to_string(),
            "ui.show_search_bar" => self.ui.show_search_bar.to_string(),
            "ui.dynamic_list_height" => self.ui.dynamic_list_height.to_string(),
            "ui.min_rows" => self.ui.min_rows.to_string(),
            "ui.max_rows" => self.ui.max_rows.to_string(),
            _ => return None,
        };
        Some(value)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserPreferences {
    #[serde(default)]
    pub auto_detect_root: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_root_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    #[serde(default = "default_template_extension")]
    pub template_extension: String,
    #[serde(default = "default_project_markers")]
    pub project_markers: Vec<String>,
    #[serde(default = "default_true")]
    pub confirm_permanent_delete: bool,
}

fn default_true() -> bool {
    true
}

fn default_template_extension() -> String {
    "py".to_string()
}

fn default_project_markers() -> Vec<String> {
    [
        "blender_manifest.toml",
        "__init__.py",
        "Cargo.toml",
        "pyproject.toml",
        ".git",
    ]
    .iter()
    .map(|marker| marker.to_string())
    .collect()
}

impl Default for BrowserPreferences {
    fn default() -> Self {
        Self {
            auto_detect_root: false,
            default_root_dir: None,
            template_dir: None,
            template_extension: default_template_extension(),
            project_markers: default_project_markers(),
            confirm_permanent_delete: true,
        }
    }
}

impl BrowserPreferences {
    fn sanitize(&mut self) {
        let extension = self.template_extension.trim().trim_start_matches('.');
        self.template_extension = if extension.is_empty() {
            default_template_extension()
        } else {
            extension.to_string()
        };
        self.project_markers.retain(|marker| !marker.trim().is_empty());
        if self.project_markers.is_empty() {
            self.project_markers = default_project_markers();
        }
        if self
            .default_root_dir
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            self.default_root_dir = None;
        }
        if self
            .template_dir
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            self.template_dir = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiPreferences {
    #[serde(default)]
    pub use_custom_icons: bool,
    #[serde(default = "default_true")]
    pub show_search_bar: bool,
    #[serde(default = "default_true")]
    pub dynamic_list_height: bool,
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_min_rows() -> usize {
    8
}

fn default_max_rows() -> usize {
    20
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            use_custom_icons: false,
            show_search_bar: true,
            dynamic_list_height: true,
            min_rows: default_min_rows(),
            max_rows: default_max_rows(),
        }
    }
}

impl UiPreferences {
    fn sanitize(&mut self) {
        self.min_rows = self.min_rows.clamp(1, MAX_ROWS);
        self.max_rows = self.max_rows.clamp(self.min_rows, MAX_ROWS);
    }

    /// Number of list rows to show for `entry_count` visible entries.
    pub fn list_rows(&self, entry_count: usize) -> usize {
        if self.dynamic_list_height {
            entry_count.clamp(self.min_rows, self.max_rows)
        } else {
            self.min_rows
        }
    }
}

/// Preferences backed by a JSON file; every change is written through immediately.
#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        Self {
            path: path.into(),
            data: preferences,
        }
    }

    /// Opens the store at `path`; a missing file yields the defaults without creating it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        let data = match read_preferences(&path) {
            Err(PreferencesError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                let mut data = Preferences::default();
                data.sanitize();
                data
            }
            other => other?,
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), PreferencesError>
    where
        F: FnMut(&mut Preferences),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), PreferencesError> {
        write_preferences(&self.data, &self.path, true)
    }

    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), PreferencesError> {
        write_preferences(&self.data, path.as_ref(), false)
    }

    /// Replaces the current preferences with `source`, keeping a `.bak` of the old file.
    pub fn import_from(&mut self, source: impl AsRef<Path>) -> Result<(), PreferencesError> {
        let imported = read_preferences(source.as_ref())?;
        if self.path.is_file() {
            let backup = self.path.with_extension("bak");
            fs::copy(&self.path, &backup).map_err(PreferencesError::io("back up", &backup))?;
        }
        self.data = imported;
        self.save()
    }
}

fn read_preferences(path: &Path) -> Result<Preferences, PreferencesError> {
    let contents = fs::read_to_string(path).map_err(PreferencesError::io("read", path))?;
    let mut data: Preferences =
        serde_json::from_str(&contents).map_err(|source| PreferencesError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    data.sanitize();
    Ok(data)
}

/// Pretty-prints `data` to `path`; `atomic` goes through a sibling temp file and a rename.
fn write_preferences(data: &Preferences, path: &Path, atomic: bool) -> Result<(), PreferencesError> {
    let mut payload = serde_json::to_string_pretty(data).map_err(|source| {
        PreferencesError::Json {
            path: path.to_path_buf(),
            source,
        }
    })?;
    payload.push('\n');

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(PreferencesError::io("create", parent))?;
    }
    if !atomic {
        return fs::write(path, payload).map_err(PreferencesError::io("write", path));
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, payload).map_err(PreferencesError::io("write", &staging))?;
    fs::rename(&staging, path).map_err(PreferencesError::io("replace", path))
}
