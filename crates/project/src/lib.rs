//! Project tree, item actions and root management for FilePane.
//! FilePane 的專案樹、項目操作與根資料夾管理模組。

mod serde_path;

pub mod actions;
pub mod browser;
pub mod roots;
pub mod state;
pub mod tree;

pub use actions::{
    ActionError, ActionExecutor, ActionOutcome, DeleteMode, DeleteOutcome, ItemAction,
    RenameOutcome, SystemTrash, TrashBin, TrashError,
};
pub use browser::{BrowserError, FileBrowser};
pub use roots::{
    find_project_root, resolve_startup_root, RootDetection, RootError, RootRegistry,
    RootResolution, RootSelection,
};
pub use state::{PanelState, PanelStateError, PanelStateStore, PANEL_STATE_VERSION};
pub use tree::{
    compute_move_targets, has_child_folders, list_child_folders, materialize, move_targets_for,
    search, DirectoryEntry, ExpansionState, TreeError,
};
