use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by [`RootRegistry`].
/// [`RootRegistry`] 的錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RootError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("root {} is not registered", .0.display())]
    NotFound(PathBuf),
}

/// Whether a newly selected root replaces the registry or joins it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSelection {
    Replace,
    Add,
}

/// Known root folders plus the active one.
/// 已知的根資料夾集合與目前使用中的根。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootRegistry {
    roots: Vec<PathBuf>,
    active: Option<PathBuf>,
}

impl RootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted data, dropping duplicates and a dangling active root.
    pub fn restore(roots: Vec<PathBuf>, active: Option<PathBuf>) -> Self {
        let mut registry = Self::new();
        for root in roots {
            if !registry.roots.contains(&root) {
                registry.roots.push(root);
            }
        }
        registry.active = active
            .filter(|path| registry.roots.contains(path))
            .or_else(|| registry.roots.first().cloned());
        registry
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn active(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        let resolved = resolve(path);
        self.roots.iter().any(|root| *root == resolved)
    }

    /// Registers `path` in its resolved form. Returns `false` when it was already known.
    /// 以解析後的絕對路徑註冊根資料夾；已存在時回傳 `false`。
    pub fn add_root(&mut self, path: &Path) -> Result<bool, RootError> {
        if !path.is_dir() {
            return Err(RootError::NotADirectory(path.to_path_buf()));
        }
        let resolved = resolve(path);
        if self.roots.contains(&resolved) {
            return Ok(false);
        }
        debug!(root = %resolved.display(), "registered root");
        self.roots.push(resolved.clone());
        if self.active.is_none() {
            self.active = Some(resolved);
        }
        Ok(true)
    }

    /// Adds (or replaces all roots with) `path` and makes it active.
    /// 新增或取代根資料夾，並設為使用中。
    pub fn select_root(&mut self, path: &Path, mode: RootSelection) -> Result<PathBuf, RootError> {
        if !path.is_dir() {
            return Err(RootError::NotADirectory(path.to_path_buf()));
        }
        if mode == RootSelection::Replace {
            self.roots.clear();
            self.active = None;
        }
        self.add_root(path)?;
        let resolved = resolve(path);
        self.active = Some(resolved.clone());
        Ok(resolved)
    }

    /// Removes `path`. When it was active, the first remaining root takes over.
    pub fn remove_root(&mut self, path: &Path) -> bool {
        let resolved = resolve(path);
        let before = self.roots.len();
        self.roots.retain(|root| *root != resolved && root != path);
        let removed = before != self.roots.len();
        if removed
            && self
                .active
                .as_ref()
                .is_some_and(|active| *active == resolved || active == path)
        {
            self.active = self.roots.first().cloned();
        }
        removed
    }

    /// Removes the active root and returns it.
    pub fn remove_active(&mut self) -> Option<PathBuf> {
        let active = self.active.clone()?;
        self.remove_root(&active);
        Some(active)
    }

    pub fn set_active(&mut self, path: &Path) -> Result<(), RootError> {
        let resolved = resolve(path);
        let found = self
            .roots
            .iter()
            .find(|root| **root == resolved || root.as_path() == path)
            .cloned();
        match found {
            Some(root) => {
                self.active = Some(root);
                Ok(())
            }
            None => {
                warn!(root = %path.display(), "attempted to activate an unknown root");
                Err(RootError::NotFound(path.to_path_buf()))
            }
        }
    }
}

fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Walks up from `file` until a folder contains one of `markers`.
/// 自 `file` 往上尋找含有任一標記檔的資料夾。
pub fn find_project_root(file: &Path, markers: &[String]) -> Option<PathBuf> {
    let file = resolve(file);
    let start = if file.is_dir() {
        file.as_path()
    } else {
        file.parent()?
    };
    start
        .ancestors()
        .find(|dir| markers.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}

/// Inputs for picking the initial root folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootDetection {
    pub auto_detect: bool,
    pub markers: Vec<String>,
    pub default_root: Option<PathBuf>,
}

/// How the initial root folder was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootResolution {
    Detected(PathBuf),
    Fallback(PathBuf),
    Failed,
}

impl RootResolution {
    pub fn path(&self) -> Option<&Path> {
        match self {
            RootResolution::Detected(path) | RootResolution::Fallback(path) => Some(path),
            RootResolution::Failed => None,
        }
    }
}

/// Auto-detects from `current_file` when enabled, then falls back to the configured default.
/// 啟用時先自動偵測，失敗則使用預設根資料夾。
pub fn resolve_startup_root(current_file: Option<&Path>, detection: &RootDetection) -> RootResolution {
    if detection.auto_detect {
        if let Some(root) =
            current_file.and_then(|file| find_project_root(file, &detection.markers))
        {
            return RootResolution::Detected(root);
        }
    }
    match &detection.default_root {
        Some(root) if root.is_dir() => RootResolution::Fallback(root.clone()),
        _ => RootResolution::Failed,
    }
}
