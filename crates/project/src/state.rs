use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current panel-state format version.
pub const PANEL_STATE_VERSION: u32 = 1;

/// Everything the browser panel remembers between runs.
/// 瀏覽面板在多次執行之間保留的狀態。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelState {
    #[serde(default = "default_version")]
    pub format_version: u32,
    #[serde(default, with = "crate::serde_path::list")]
    pub roots: Vec<PathBuf>,
    #[serde(
        default,
        with = "crate::serde_path::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub active: Option<PathBuf>,
    #[serde(default, with = "crate::serde_path::list")]
    pub expanded: Vec<PathBuf>,
    #[serde(
        default,
        with = "crate::serde_path::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub selected: Option<PathBuf>,
}

fn default_version() -> u32 {
    PANEL_STATE_VERSION
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            format_version: PANEL_STATE_VERSION,
            roots: Vec::new(),
            active: None,
            expanded: Vec::new(),
            selected: None,
        }
    }
}

/// Persists [`PanelState`] snapshots as JSON with atomic writes.
/// 以 JSON 搭配原子寫入方式儲存 [`PanelState`]。
#[derive(Debug)]
pub struct PanelStateStore {
    path: PathBuf,
}

impl PanelStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state, returning `Ok(None)` when nothing was saved yet.
    /// 載入狀態；若尚未儲存過則回傳 `Ok(None)`。
    pub fn load(&self) -> Result<Option<PanelState>, PanelStateError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let state = serde_json::from_str(&contents)
                    .map_err(|err| PanelStateError::Invalid(err.to_string()))?;
                Ok(Some(state))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PanelStateError::Io(err)),
        }
    }

    pub fn load_or_default(&self) -> Result<PanelState, PanelStateError> {
        Ok(self.load()?.unwrap_or_default())
    }

    pub fn save(&self, state: &PanelState) -> Result<(), PanelStateError> {
        let payload = serde_json::to_vec_pretty(state)
            .map_err(|err| PanelStateError::Invalid(err.to_string()))?;
        replace_file(&self.path, &payload)?;
        Ok(())
    }
}

/// Writes `payload` to a sibling temp file, flushes it, then renames it over `path`.
fn replace_file(path: &Path, payload: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().map(OsString::from).unwrap_or_default();
    tmp_name.push(".partial");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(payload)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)
}

/// Errors emitted by [`PanelStateStore`].
#[derive(Debug, Error)]
pub enum PanelStateError {
    #[error("panel state IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid panel state payload: {0}")]
    Invalid(String),
}
