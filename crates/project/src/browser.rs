use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actions::{
    ActionError, ActionExecutor, ActionOutcome, ItemAction, SystemTrash, TrashBin,
};
use crate::roots::RootRegistry;
use crate::state::PanelState;
use crate::tree::{self, DirectoryEntry, ExpansionState, TreeError};

/// Errors surfaced by [`FileBrowser`].
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no root folder selected")]
    NoActiveRoot,
    #[error("entry index {0} is out of range")]
    InvalidIndex(usize),
    #[error("{} is not a folder", .0.display())]
    NotAFolder(PathBuf),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Flat project tree of the active root plus the selection and expansion state.
/// 使用中根資料夾的扁平專案樹，以及選取與展開狀態。
///
/// Every mutating method takes `&mut self`, so a mutation can never interleave with a
/// rebuild; the entry list is replaced only once it is fully built.
#[derive(Debug)]
pub struct FileBrowser<T = SystemTrash> {
    registry: RootRegistry,
    expansion: ExpansionState,
    entries: Vec<DirectoryEntry>,
    selected: Option<usize>,
    executor: ActionExecutor<T>,
}

impl FileBrowser<SystemTrash> {
    pub fn new(registry: RootRegistry) -> Self {
        Self::with_executor(registry, ActionExecutor::new())
    }
}

impl<T: TrashBin> FileBrowser<T> {
    pub fn with_executor(registry: RootRegistry, executor: ActionExecutor<T>) -> Self {
        Self {
            registry,
            expansion: ExpansionState::new(),
            entries: Vec::new(),
            selected: None,
            executor,
        }
    }

    /// Restores a browser from persisted state and materializes the active root.
    /// 由儲存的狀態還原瀏覽器並建構使用中的根資料夾。
    pub fn from_state(state: PanelState, executor: ActionExecutor<T>) -> Self {
        let registry = RootRegistry::restore(state.roots, state.active);
        let mut browser = Self::with_executor(registry, executor);
        browser.expansion = ExpansionState::with_expanded(state.expanded);
        if browser.registry.active().is_some() {
            if let Err(err) = browser.refresh() {
                debug!(error = %err, "restored root could not be materialized");
            }
        }
        if let Some(selected) = state.selected {
            browser.select_path(&selected);
        }
        browser
    }

    pub fn to_state(&self) -> PanelState {
        let mut expansion = self.expansion.clone();
        expansion.merge(ExpansionState::from_entries(&self.entries));
        PanelState {
            roots: self.registry.roots().to_vec(),
            active: self.registry.active().map(Path::to_path_buf),
            expanded: expansion.expanded_paths(),
            selected: self.selected_entry().map(|entry| entry.full_path.clone()),
            ..PanelState::default()
        }
    }

    pub fn registry(&self) -> &RootRegistry {
        &self.registry
    }

    /// Registry access for root changes; call [`FileBrowser::refresh`] afterwards.
    pub fn registry_mut(&mut self) -> &mut RootRegistry {
        &mut self.registry
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    pub fn active_root(&self) -> Result<&Path, BrowserError> {
        self.registry.active().ok_or(BrowserError::NoActiveRoot)
    }

    pub fn selected_entry(&self) -> Option<&DirectoryEntry> {
        self.selected.and_then(|index| self.entries.get(index))
    }

    pub fn select(&mut self, index: usize) -> Result<&DirectoryEntry, BrowserError> {
        let entry = self
            .entries
            .get(index)
            .ok_or(BrowserError::InvalidIndex(index))?;
        self.selected = Some(index);
        Ok(entry)
    }

    /// Selects the entry with `path`, if it is currently visible.
    pub fn select_path(&mut self, path: &Path) -> bool {
        self.selected = self
            .entries
            .iter()
            .position(|entry| entry.full_path == path);
        self.selected.is_some()
    }

    /// Rebuilds the list for the active root, keeping expansion and selection by path.
    /// 重新建構使用中根資料夾的清單，並依路徑保留展開與選取狀態。
    pub fn refresh(&mut self) -> Result<&[DirectoryEntry], BrowserError> {
        let root = self.active_root()?.to_path_buf();
        let selected_path = self.selected_entry().map(|entry| entry.full_path.clone());

        self.expansion
            .merge(ExpansionState::from_entries(&self.entries));
        self.expansion.prune_missing();
        let rebuilt = tree::materialize(&root, &self.expansion)?;
        debug!(root = %root.display(), entries = rebuilt.len(), "materialized tree");
        self.entries = rebuilt;

        match selected_path {
            Some(path) => {
                self.select_path(&path);
            }
            None => self.selected = None,
        }
        Ok(&self.entries)
    }

    /// Flips the folder at `index` and rebuilds.
    pub fn toggle(&mut self, index: usize) -> Result<bool, BrowserError> {
        let entry = self
            .entries
            .get(index)
            .ok_or(BrowserError::InvalidIndex(index))?;
        if !entry.is_folder {
            return Err(BrowserError::NotAFolder(entry.full_path.clone()));
        }
        let path = entry.full_path.clone();
        let expanded = !entry.is_expanded;
        self.set_expanded(&path, expanded)
    }

    /// Sets the expansion flag of the folder at `path` and rebuilds.
    pub fn set_expanded(&mut self, path: &Path, expanded: bool) -> Result<bool, BrowserError> {
        if !path.is_dir() {
            return Err(BrowserError::NotAFolder(path.to_path_buf()));
        }
        // refresh() merges the visible flags again, so the visible row is updated as well.
        self.expansion
            .merge(ExpansionState::from_entries(&self.entries));
        self.expansion.set(path, expanded);
        for entry in self.entries.iter_mut().filter(|entry| entry.full_path == path) {
            entry.is_expanded = expanded;
        }
        self.refresh()?;
        Ok(expanded)
    }

    /// Runs a mutation and re-materializes the tree on success.
    /// 執行檔案操作，成功後重新建構專案樹。
    ///
    /// Once the mutation succeeded its outcome is returned even if the rebuild fails.
    pub fn perform(&mut self, action: ItemAction) -> Result<ActionOutcome, BrowserError> {
        let outcome = self.executor.execute(action)?;
        info!(%outcome, "action completed");

        match &outcome {
            ActionOutcome::Renamed { from, to } | ActionOutcome::Moved { from, to } => {
                self.expansion
                    .merge(ExpansionState::from_entries(&self.entries));
                self.expansion.rename_prefix(from, to);
                for entry in &mut self.entries {
                    if let Ok(rest) = entry.full_path.strip_prefix(from) {
                        entry.full_path = to.join(rest);
                    }
                }
            }
            _ => {}
        }

        self.drop_vanished_roots();
        if self.registry.active().is_none() {
            self.entries.clear();
            self.selected = None;
        } else if let Err(err) = self.refresh() {
            warn!(error = %err, "tree could not be rebuilt after action");
        }
        Ok(outcome)
    }

    /// Unregisters roots whose folder no longer exists, e.g. after deleting or moving one.
    fn drop_vanished_roots(&mut self) {
        let vanished: Vec<PathBuf> = self
            .registry
            .roots()
            .iter()
            .filter(|root| !root.is_dir())
            .cloned()
            .collect();
        for root in vanished {
            warn!(root = %root.display(), "root folder is gone, removing it");
            self.registry.remove_root(&root);
        }
    }

    /// Search results for `term`; an empty term restores the regular tree.
    pub fn search(&mut self, term: &str) -> Result<Vec<DirectoryEntry>, BrowserError> {
        let root = self.active_root()?.to_path_buf();
        if term.trim().is_empty() {
            return Ok(self.refresh()?.to_vec());
        }
        Ok(tree::search(&root, term))
    }

    /// Destinations for moving `source` within the active root.
    pub fn move_targets(&self, source: &Path) -> Result<Vec<PathBuf>, BrowserError> {
        let root = self.active_root()?;
        Ok(tree::move_targets_for(root, source))
    }
}
