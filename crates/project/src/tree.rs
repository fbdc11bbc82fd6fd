use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::serde_path;

/// A single file or folder row in the flattened project tree.
/// 扁平化專案樹中的單一檔案或資料夾列。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub display_name: String,
    #[serde(with = "serde_path")]
    pub full_path: PathBuf,
    pub is_folder: bool,
    pub depth: usize,
    #[serde(default)]
    pub is_expanded: bool,
}

impl DirectoryEntry {
    fn folder(path: PathBuf, depth: usize, is_expanded: bool) -> Self {
        Self {
            display_name: display_name_of(&path),
            full_path: path,
            is_folder: true,
            depth,
            is_expanded,
        }
    }

    fn file(path: PathBuf, depth: usize) -> Self {
        Self {
            display_name: display_name_of(&path),
            full_path: path,
            is_folder: false,
            depth,
            is_expanded: false,
        }
    }
}

/// Per-folder expand/collapse flags keyed by absolute path.
/// 依絕對路徑記錄每個資料夾的展開狀態。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    flags: HashMap<PathBuf, bool>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the state from a list of expanded folders.
    /// 由已展開的資料夾清單建立狀態。
    pub fn with_expanded<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            flags: paths.into_iter().map(|path| (path.into(), true)).collect(),
        }
    }

    /// Snapshots the folder flags of a materialized list.
    /// 擷取已建構清單中資料夾的展開旗標。
    pub fn from_entries(entries: &[DirectoryEntry]) -> Self {
        Self {
            flags: entries
                .iter()
                .filter(|entry| entry.is_folder)
                .map(|entry| (entry.full_path.clone(), entry.is_expanded))
                .collect(),
        }
    }

    pub fn get(&self, path: &Path) -> bool {
        self.flags.get(path).copied().unwrap_or(false)
    }

    pub fn set(&mut self, path: impl Into<PathBuf>, expanded: bool) {
        self.flags.insert(path.into(), expanded);
    }

    /// Flips the flag for `path` and returns the new value.
    pub fn toggle(&mut self, path: &Path) -> bool {
        let next = !self.get(path);
        self.flags.insert(path.to_path_buf(), next);
        next
    }

    /// Overlays a snapshot; flags in `snapshot` win.
    pub fn merge(&mut self, snapshot: ExpansionState) {
        self.flags.extend(snapshot.flags);
    }

    /// Moves every flag at or below `old` so it lives under `new`.
    /// 將 `old` 底下的所有旗標搬移至 `new`。
    pub fn rename_prefix(&mut self, old: &Path, new: &Path) {
        let moved: Vec<(PathBuf, bool)> = self
            .flags
            .iter()
            .filter_map(|(path, expanded)| {
                let rest = path.strip_prefix(old).ok()?;
                Some((new.join(rest), *expanded))
            })
            .collect();
        if moved.is_empty() {
            return;
        }
        self.flags.retain(|path, _| !path.starts_with(old));
        self.flags.extend(moved);
    }

    /// Drops flags of folders that no longer exist on disk.
    pub fn prune_missing(&mut self) {
        self.flags.retain(|path, _| path.is_dir());
    }

    /// Returns the expanded folders in a stable order.
    pub fn expanded_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .flags
            .iter()
            .filter(|(_, expanded)| **expanded)
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Errors raised while materializing a tree.
/// 建構專案樹時的錯誤。
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("root folder {0} does not exist or is not a directory")]
    RootNotFound(PathBuf),
}

/// Rebuilds the flat entry list for `root`, recursing only into expanded folders.
/// 重新建構 `root` 的扁平清單，只遞迴進入已展開的資料夾。
///
/// Unreadable folders contribute no entries.
pub fn materialize(
    root: &Path,
    expansion: &ExpansionState,
) -> Result<Vec<DirectoryEntry>, TreeError> {
    if !root.is_dir() {
        return Err(TreeError::RootNotFound(root.to_path_buf()));
    }
    let mut entries = Vec::new();
    populate(root, 0, expansion, &mut entries);
    Ok(entries)
}

fn populate(
    dir: &Path,
    depth: usize,
    expansion: &ExpansionState,
    entries: &mut Vec<DirectoryEntry>,
) {
    let Some((folders, files)) = read_children(dir) else {
        return;
    };

    for folder in folders {
        let expanded = expansion.get(&folder);
        entries.push(DirectoryEntry::folder(folder.clone(), depth, expanded));
        if expanded {
            populate(&folder, depth + 1, expansion, entries);
        }
    }
    for file in files {
        entries.push(DirectoryEntry::file(file, depth));
    }
}

/// Lists the immediate children of `dir`, split into sorted folders and files.
fn read_children(dir: &Path) -> Option<(Vec<PathBuf>, Vec<PathBuf>)> {
    let reader = match fs::read_dir(dir) {
        Ok(reader) => reader,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            debug!(path = %dir.display(), "skipping unreadable folder");
            return None;
        }
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "failed to list folder");
            return None;
        }
    };

    let mut folders = Vec::new();
    let mut files = Vec::new();
    for entry in reader {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();
        // Follows symlinks; dangling links are neither.
        if path.is_dir() {
            folders.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }
    folders.sort_by(|a, b| compare_names(a, b));
    files.sort_by(|a, b| compare_names(a, b));
    Some((folders, files))
}

/// Case-insensitive name order, exact name as tie-breaker.
fn compare_names(a: &Path, b: &Path) -> Ordering {
    let left = display_name_of(a);
    let right = display_name_of(b);
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(&right))
}

fn display_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Immediate sub-folders of `path`, sorted case-insensitively.
/// 取得 `path` 的直屬子資料夾（不分大小寫排序）。
pub fn list_child_folders(path: &Path) -> Vec<PathBuf> {
    read_children(path)
        .map(|(folders, _)| folders)
        .unwrap_or_default()
}

pub fn has_child_folders(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|reader| reader.flatten().any(|entry| entry.path().is_dir()))
        .unwrap_or(false)
}

/// Every non-hidden folder below `root`, depth-first, minus the exact paths in `exclude`.
/// 列出 `root` 底下所有非隱藏資料夾（深度優先），排除 `exclude` 指定的路徑。
///
/// Hidden folders are pruned together with their subtrees.
pub fn compute_move_targets(root: &Path, exclude: &[PathBuf]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by(|a, b| compare_names(a.path(), b.path()))
        .into_iter()
        .filter_entry(|entry| entry.file_type().is_dir() && !is_hidden(entry.path()))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(err) => {
                debug!(error = %err, "skipping folder while collecting move targets");
                None
            }
        })
        .filter(|path| !exclude.iter().any(|excluded| excluded == path))
        .collect()
}

/// Destinations offered when moving `source`: everything except `source`, its subtree
/// and its current parent. The root comes first when `source` is nested deeper.
/// 移動 `source` 時可選的目的地。
pub fn move_targets_for(root: &Path, source: &Path) -> Vec<PathBuf> {
    let parent = source.parent().map(Path::to_path_buf);
    let mut exclude = vec![source.to_path_buf()];
    exclude.extend(parent.clone());

    let mut targets: Vec<PathBuf> = compute_move_targets(root, &exclude)
        .into_iter()
        .filter(|path| !path.starts_with(source))
        .collect();
    if parent.as_deref() != Some(root) {
        targets.insert(0, root.to_path_buf());
    }
    targets
}

/// Case-insensitive name search anywhere below `root`.
/// 在 `root` 底下以不分大小寫的子字串搜尋名稱。
///
/// `display_name` holds the path relative to `root`.
pub fn search(root: &Path, term: &str) -> Vec<DirectoryEntry> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    WalkDir::new(root)
        .min_depth(1)
        .sort_by(|a, b| compare_names(a.path(), b.path()))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .contains(&needle)
        })
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?.to_path_buf();
            Some(DirectoryEntry {
                display_name: relative.display().to_string(),
                depth: relative.components().count().saturating_sub(1),
                is_folder: entry.file_type().is_dir(),
                full_path: entry.into_path(),
                is_expanded: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(entries: &[DirectoryEntry]) -> Vec<(&str, usize, bool)> {
        entries
            .iter()
            .map(|entry| (entry.display_name.as_str(), entry.depth, entry.is_folder))
            .collect()
    }

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("x.txt"), "x").unwrap();
        fs::write(dir.path().join("z.py"), "print()").unwrap();
        dir
    }

    #[test]
    fn collapsed_folders_hide_children() {
        let dir = sample_tree();
        let entries = materialize(dir.path(), &ExpansionState::new()).unwrap();
        assert_eq!(
            names(&entries),
            vec![
                ("a", 0, true),
                ("b", 0, true),
                ("z.py", 0, false),
            ]
        );
        assert!(entries.iter().all(|entry| !entry.is_expanded));
    }

    #[test]
    fn expanded_folder_lists_children_in_place() {
        let dir = sample_tree();
        let expansion = ExpansionState::with_expanded([dir.path().join("b")]);
        let entries = materialize(dir.path(), &expansion).unwrap();
        assert_eq!(
            names(&entries),
            vec![
                ("a", 0, true),
                ("b", 0, true),
                ("x.txt", 1, false),
                ("z.py", 0, false),
            ]
        );
        assert!(entries[1].is_expanded);
        assert_eq!(entries[2].full_path, dir.path().join("b").join("x.txt"));
    }

    #[test]
    fn folders_sort_before_files_case_insensitively() {
        let dir = tempdir().unwrap();
        for name in ["beta.txt", "Alpha.txt", "gamma"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        for name in ["Zeta", "delta"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let entries = materialize(dir.path(), &ExpansionState::new()).unwrap();
        let order: Vec<_> = entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(order, vec!["delta", "Zeta", "Alpha.txt", "beta.txt", "gamma"]);
    }

    #[test]
    fn nested_expansion_requires_expanded_parent() {
        let dir = tempdir().unwrap();
        let outer = dir.path().join("outer");
        let inner = outer.join("inner");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("deep.rs"), "").unwrap();

        let only_inner = ExpansionState::with_expanded([inner.clone()]);
        let entries = materialize(dir.path(), &only_inner).unwrap();
        assert_eq!(entries.len(), 1);

        let both = ExpansionState::with_expanded([outer, inner]);
        let entries = materialize(dir.path(), &both).unwrap();
        assert_eq!(
            names(&entries),
            vec![
                ("outer", 0, true),
                ("inner", 1, true),
                ("deep.rs", 2, false),
            ]
        );
    }

    #[test]
    fn snapshot_rebuild_keeps_expanded_folders() {
        let dir = sample_tree();
        let expansion = ExpansionState::with_expanded([dir.path().join("b")]);
        let first = materialize(dir.path(), &expansion).unwrap();
        let snapshot = ExpansionState::from_entries(&first);
        let second = materialize(dir.path(), &snapshot).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_root_is_reported() {
        let dir = tempdir().unwrap();
        let err = materialize(&dir.path().join("nope"), &ExpansionState::new()).unwrap_err();
        assert!(matches!(err, TreeError::RootNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_folder_contributes_nothing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("secret.txt"), "").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let expansion = ExpansionState::with_expanded([locked.clone()]);
        let entries = materialize(dir.path(), &expansion).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(entries[0].display_name, "locked");
        // Root bypasses permission checks, so only assert when access was actually denied.
        if fs::read_dir(&locked).is_err() {
            assert_eq!(entries.len(), 1);
        }
    }

    #[test]
    fn rename_prefix_moves_nested_flags() {
        let mut state = ExpansionState::with_expanded(["/p/old", "/p/old/inner", "/p/other"]);
        state.rename_prefix(Path::new("/p/old"), Path::new("/p/new"));
        assert_eq!(
            state.expanded_paths(),
            vec![
                PathBuf::from("/p/new"),
                PathBuf::from("/p/new/inner"),
                PathBuf::from("/p/other"),
            ]
        );
    }

    #[test]
    fn move_targets_skip_hidden_source_and_parent() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for folder in ["docs", "src/nested", ".git/objects", "assets"] {
            fs::create_dir_all(root.join(folder)).unwrap();
        }
        fs::write(root.join("src").join("main.py"), "").unwrap();

        let all = compute_move_targets(root, &[]);
        assert_eq!(
            all,
            vec![
                root.join("assets"),
                root.join("docs"),
                root.join("src"),
                root.join("src").join("nested"),
            ]
        );

        let for_file = move_targets_for(root, &root.join("src").join("main.py"));
        assert_eq!(
            for_file,
            vec![
                root.to_path_buf(),
                root.join("assets"),
                root.join("docs"),
                root.join("src").join("nested"),
            ]
        );

        let for_folder = move_targets_for(root, &root.join("src"));
        assert_eq!(for_folder, vec![root.join("assets"), root.join("docs")]);
    }

    #[test]
    fn child_folder_queries() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b").join("inner")).unwrap();
        fs::create_dir(dir.path().join("A")).unwrap();
        fs::write(dir.path().join("file.txt"), "").unwrap();

        assert_eq!(
            list_child_folders(dir.path()),
            vec![dir.path().join("A"), dir.path().join("b")]
        );
        assert!(has_child_folders(&dir.path().join("b")));
        assert!(!has_child_folders(&dir.path().join("A")));
    }

    #[test]
    fn search_matches_names_below_root() {
        let dir = sample_tree();
        fs::write(dir.path().join("a").join("X-ray.md"), "").unwrap();

        let hits = search(dir.path(), "x");
        let found: Vec<_> = hits
            .iter()
            .map(|entry| (entry.display_name.replace('\\', "/"), entry.depth))
            .collect();
        assert_eq!(
            found,
            vec![("a/X-ray.md".to_string(), 1), ("b/x.txt".to_string(), 1)]
        );
        assert!(search(dir.path(), "  ").is_empty());
    }
}
