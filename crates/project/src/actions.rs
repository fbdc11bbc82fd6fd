use std::fmt;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const COPY_SUFFIX: &str = "_copy";

/// Errors surfaced by single-entry filesystem mutations.
/// 單一項目檔案操作的錯誤。
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("permission denied for {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot duplicate folder {}", .0.display())]
    UnsupportedForFolders(PathBuf),
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("cannot move {} into {}", .source_path.display(), .destination.display())]
    InvalidDestination {
        source_path: PathBuf,
        destination: PathBuf,
    },
    #[error("filesystem error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ActionError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => ActionError::NotFound(path.to_path_buf()),
            ErrorKind::AlreadyExists => ActionError::AlreadyExists(path.to_path_buf()),
            ErrorKind::PermissionDenied => ActionError::PermissionDenied {
                path: path.to_path_buf(),
                source,
            },
            _ => ActionError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Failure reported by a [`TrashBin`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TrashError(pub String);

/// Reversible-delete service (system trash / recycle bin).
/// 可復原刪除服務（系統垃圾桶／資源回收筒）。
pub trait TrashBin {
    fn move_to_trash(&self, path: &Path) -> Result<(), TrashError>;
}

/// Trash backed by the platform's recycle bin.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrash;

impl TrashBin for SystemTrash {
    fn move_to_trash(&self, path: &Path) -> Result<(), TrashError> {
        trash::delete(path).map_err(|err| TrashError(err.to_string()))
    }
}

/// How a delete request should treat the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Trash,
    Permanent,
}

/// Result of a delete, including the downgraded soft-delete case.
/// 刪除結果，包含垃圾桶失敗後改為永久刪除的情況。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Trashed,
    Deleted,
    DeletedAfterTrashFailure { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed(PathBuf),
    Unchanged,
}

/// A single user-triggered mutation, decided by the presentation layer.
/// 由呈現層決定的單一檔案操作指令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAction {
    CreateFile {
        parent: PathBuf,
        name: String,
        content: String,
    },
    CreateFolder {
        parent: PathBuf,
        name: String,
    },
    Rename {
        path: PathBuf,
        new_name: String,
    },
    Duplicate {
        path: PathBuf,
    },
    Move {
        source: PathBuf,
        destination_dir: PathBuf,
    },
    Delete {
        path: PathBuf,
        mode: DeleteMode,
    },
}

/// Successful outcome of an [`ItemAction`]; `Display` yields the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    FileCreated(PathBuf),
    FolderCreated(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Unchanged(PathBuf),
    Duplicated(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
    Deleted { path: PathBuf, outcome: DeleteOutcome },
}

impl ActionOutcome {
    /// True when the outcome should be shown as a warning rather than plain info.
    pub fn is_downgraded(&self) -> bool {
        matches!(
            self,
            ActionOutcome::Deleted {
                outcome: DeleteOutcome::DeletedAfterTrashFailure { .. },
                ..
            }
        )
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::FileCreated(path) => write!(f, "Created {}", file_name(path)),
            ActionOutcome::FolderCreated(path) => {
                write!(f, "Created folder: {}", file_name(path))
            }
            ActionOutcome::Renamed { to, .. } => write!(f, "Renamed to: {}", file_name(to)),
            ActionOutcome::Unchanged(path) => write!(f, "{} unchanged", file_name(path)),
            ActionOutcome::Duplicated(path) => write!(f, "Duplicated to: {}", file_name(path)),
            ActionOutcome::Moved { to, .. } => write!(f, "Moved to {}", to.display()),
            ActionOutcome::Deleted { path, outcome } => match outcome {
                DeleteOutcome::Trashed => write!(f, "Moved to trash: {}", file_name(path)),
                DeleteOutcome::Deleted => write!(f, "Permanently deleted: {}", file_name(path)),
                DeleteOutcome::DeletedAfterTrashFailure { reason } => write!(
                    f,
                    "Failed to move to trash, permanently deleted instead: {reason}"
                ),
            },
        }
    }
}

/// Performs filesystem mutations on one entry at a time.
/// 針對單一項目執行檔案系統變更。
#[derive(Debug, Clone, Default)]
pub struct ActionExecutor<T = SystemTrash> {
    trash: T,
}

impl ActionExecutor<SystemTrash> {
    pub fn new() -> Self {
        Self { trash: SystemTrash }
    }
}

impl<T: TrashBin> ActionExecutor<T> {
    pub fn with_trash(trash: T) -> Self {
        Self { trash }
    }

    /// Dispatches an [`ItemAction`] to the matching operation.
    pub fn execute(&self, action: ItemAction) -> Result<ActionOutcome, ActionError> {
        match action {
            ItemAction::CreateFile {
                parent,
                name,
                content,
            } => self
                .create_file(&parent, &name, &content)
                .map(ActionOutcome::FileCreated),
            ItemAction::CreateFolder { parent, name } => self
                .create_folder(&parent, &name)
                .map(ActionOutcome::FolderCreated),
            ItemAction::Rename { path, new_name } => {
                Ok(match self.rename(&path, &new_name)? {
                    RenameOutcome::Renamed(to) => ActionOutcome::Renamed { from: path, to },
                    RenameOutcome::Unchanged => ActionOutcome::Unchanged(path),
                })
            }
            ItemAction::Duplicate { path } => {
                self.duplicate_file(&path).map(ActionOutcome::Duplicated)
            }
            ItemAction::Move {
                source,
                destination_dir,
            } => {
                let to = self.move_entry(&source, &destination_dir)?;
                Ok(ActionOutcome::Moved { from: source, to })
            }
            ItemAction::Delete { path, mode } => {
                let outcome = self.delete(&path, mode)?;
                Ok(ActionOutcome::Deleted { path, outcome })
            }
        }
    }

    /// Creates `parent/name` with `content`; refuses to overwrite.
    /// 建立新檔案並寫入內容，不覆寫既有檔案。
    pub fn create_file(
        &self,
        parent: &Path,
        name: &str,
        content: &str,
    ) -> Result<PathBuf, ActionError> {
        validate_name(name)?;
        let path = parent.join(name);
        if path.exists() {
            return Err(ActionError::AlreadyExists(path));
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|err| ActionError::from_io(dir, err))?;
        }
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .and_then(|mut file| io::Write::write_all(&mut file, content.as_bytes()))
            .map_err(|err| ActionError::from_io(&path, err))?;
        info!(path = %path.display(), "created file");
        Ok(path)
    }

    /// Creates `parent/name`, including any missing ancestors.
    pub fn create_folder(&self, parent: &Path, name: &str) -> Result<PathBuf, ActionError> {
        validate_name(name)?;
        let path = parent.join(name);
        if path.exists() {
            return Err(ActionError::AlreadyExists(path));
        }
        fs::create_dir_all(&path).map_err(|err| ActionError::from_io(&path, err))?;
        info!(path = %path.display(), "created folder");
        Ok(path)
    }

    /// Renames within the same parent. Refuses to replace a different existing entry.
    /// 於同一父資料夾內重新命名；不會覆蓋其他既有項目。
    pub fn rename(&self, path: &Path, new_name: &str) -> Result<RenameOutcome, ActionError> {
        if fs::symlink_metadata(path).is_err() {
            return Err(ActionError::NotFound(path.to_path_buf()));
        }
        if path.file_name().and_then(|name| name.to_str()) == Some(new_name) {
            return Ok(RenameOutcome::Unchanged);
        }
        validate_name(new_name)?;

        let target = path.with_file_name(new_name);
        // A case-only rename on a case-insensitive filesystem sees the source itself.
        if target.exists() && !same_entry(path, &target) {
            return Err(ActionError::AlreadyExists(target));
        }
        fs::rename(path, &target).map_err(|err| ActionError::from_io(path, err))?;
        info!(from = %path.display(), to = %target.display(), "renamed entry");
        Ok(RenameOutcome::Renamed(target))
    }

    /// Copies a file next to itself as `stem_copy.ext`, `stem_copy1.ext`, ...
    /// 在原處複製檔案，名稱依序為 `_copy`、`_copy1`…。
    pub fn duplicate_file(&self, path: &Path) -> Result<PathBuf, ActionError> {
        let metadata = fs::metadata(path).map_err(|err| ActionError::from_io(path, err))?;
        if metadata.is_dir() {
            return Err(ActionError::UnsupportedForFolders(path.to_path_buf()));
        }

        let target = next_copy_path(path);
        fs::copy(path, &target).map_err(|err| ActionError::from_io(&target, err))?;
        if let Ok(modified) = metadata.modified() {
            if let Err(err) = fs::File::open(&target).and_then(|file| file.set_modified(modified))
            {
                debug!(path = %target.display(), error = %err, "could not copy modification time");
            }
        }
        info!(from = %path.display(), to = %target.display(), "duplicated file");
        Ok(target)
    }

    /// Moves a file or folder under `destination_dir` without overwriting.
    /// 將檔案或資料夾移動到目的資料夾，不覆寫既有項目。
    pub fn move_entry(&self, source: &Path, destination_dir: &Path) -> Result<PathBuf, ActionError> {
        let metadata =
            fs::symlink_metadata(source).map_err(|_| ActionError::NotFound(source.to_path_buf()))?;
        if !destination_dir.is_dir() {
            return Err(ActionError::NotFound(destination_dir.to_path_buf()));
        }
        let Some(name) = source.file_name() else {
            return Err(ActionError::InvalidName(source.display().to_string()));
        };
        let target = destination_dir.join(name);
        if fs::symlink_metadata(&target).is_ok() {
            return Err(ActionError::AlreadyExists(target));
        }
        if metadata.is_dir() && is_within(destination_dir, source) {
            return Err(ActionError::InvalidDestination {
                source_path: source.to_path_buf(),
                destination: destination_dir.to_path_buf(),
            });
        }

        match fs::rename(source, &target) {
            Ok(()) => {}
            Err(err) if is_cross_device(&err) => {
                debug!(from = %source.display(), to = %target.display(), "falling back to copy for move");
                copy_then_remove(source, &target, metadata.is_dir())?;
            }
            Err(err) => return Err(ActionError::from_io(source, err)),
        }
        info!(from = %source.display(), to = %target.display(), "moved entry");
        Ok(target)
    }

    /// Deletes `path`. Trash mode falls back to permanent deletion when the trash fails.
    /// 刪除 `path`；垃圾桶失敗時改為永久刪除並回報。
    pub fn delete(&self, path: &Path, mode: DeleteMode) -> Result<DeleteOutcome, ActionError> {
        let metadata =
            fs::symlink_metadata(path).map_err(|_| ActionError::NotFound(path.to_path_buf()))?;
        let is_dir = metadata.is_dir();

        match mode {
            DeleteMode::Permanent => {
                remove_permanently(path, is_dir)?;
                info!(path = %path.display(), "permanently deleted");
                Ok(DeleteOutcome::Deleted)
            }
            DeleteMode::Trash => match self.trash.move_to_trash(path) {
                Ok(()) => {
                    info!(path = %path.display(), "moved to trash");
                    Ok(DeleteOutcome::Trashed)
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "trash failed, deleting permanently");
                    remove_permanently(path, is_dir)?;
                    Ok(DeleteOutcome::DeletedAfterTrashFailure {
                        reason: err.to_string(),
                    })
                }
            },
        }
    }
}

fn validate_name(name: &str) -> Result<(), ActionError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(ActionError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn next_copy_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = path.with_file_name(format!("{stem}{COPY_SUFFIX}{extension}"));
    let mut counter = 1u32;
    while fs::symlink_metadata(&candidate).is_ok() {
        candidate = path.with_file_name(format!("{stem}{COPY_SUFFIX}{counter}{extension}"));
        counter += 1;
    }
    candidate
}

fn same_entry(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

/// Whether `candidate` is `ancestor` or lies below it, after resolving links.
fn is_within(candidate: &Path, ancestor: &Path) -> bool {
    match (fs::canonicalize(candidate), fs::canonicalize(ancestor)) {
        (Ok(candidate), Ok(ancestor)) => candidate.starts_with(ancestor),
        _ => candidate.starts_with(ancestor),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    const EXDEV: i32 = 18;
    #[cfg(windows)]
    const EXDEV: i32 = 17;
    #[cfg(not(any(unix, windows)))]
    const EXDEV: i32 = -1;
    err.raw_os_error() == Some(EXDEV)
}

/// Copies `source` to `target` and removes the source; a failed copy leaves no partial target.
fn copy_then_remove(source: &Path, target: &Path, is_dir: bool) -> Result<(), ActionError> {
    let copied = if is_dir {
        copy_dir_all(source, target)
    } else {
        fs::copy(source, target)
            .map(|_| ())
            .map_err(|err| ActionError::from_io(target, err))
    };
    if let Err(err) = copied {
        discard_partial_copy(target, is_dir);
        return Err(err);
    }
    remove_permanently(source, is_dir)
}

fn discard_partial_copy(target: &Path, is_dir: bool) {
    if fs::symlink_metadata(target).is_err() {
        return;
    }
    let removed = if is_dir {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    if let Err(err) = removed {
        warn!(path = %target.display(), error = %err, "could not remove partial copy");
    }
}

fn copy_dir_all(source: &Path, target: &Path) -> Result<(), ActionError> {
    fs::create_dir_all(target).map_err(|err| ActionError::from_io(target, err))?;
    let reader = fs::read_dir(source).map_err(|err| ActionError::from_io(source, err))?;
    for entry in reader {
        let entry = entry.map_err(|err| ActionError::from_io(source, err))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|err| ActionError::from_io(&from, err))?;
        }
    }
    Ok(())
}

fn remove_permanently(path: &Path, is_dir: bool) -> Result<(), ActionError> {
    if !is_dir {
        make_writable(path);
        return fs::remove_file(path).map_err(|err| ActionError::from_io(path, err));
    }

    if let Err(err) = fs::remove_dir_all(path) {
        debug!(path = %path.display(), error = %err, "retrying folder removal after clearing read-only flags");
        for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
            make_writable(entry.path());
        }
        fs::remove_dir_all(path).map_err(|err| ActionError::from_io(path, err))?;
    }
    Ok(())
}

fn make_writable(path: &Path) {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return;
    };
    if metadata.file_type().is_symlink() {
        return;
    }
    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    permissions.set_readonly(false);
    if let Err(err) = fs::set_permissions(path, permissions) {
        debug!(path = %path.display(), error = %err, "could not clear read-only flag");
    }
}
