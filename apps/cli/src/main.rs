use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use filepane_project::{
    has_child_folders, list_child_folders, resolve_startup_root, ActionExecutor, DeleteMode,
    DirectoryEntry, FileBrowser, ItemAction, PanelStateStore, RootDetection, RootResolution,
    RootSelection,
};
use filepane_settings::{Preferences, PreferencesStore, TemplateCatalog, BLANK_TEMPLATE};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "FILEPANE_LOG";

#[derive(Parser)]
#[command(
    name = "filepane",
    about = "Project file browser: tree, roots and file actions",
    author,
    version
)]
struct Cli {
    /// 指定工作區根目錄；預設為目前目錄。 / Workspace root (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,
    /// 顯示除錯訊息。 / Emit debug logging on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 顯示專案樹。 / Print the project tree of the active root.
    Tree(TreeArgs),
    /// 切換資料夾展開狀態。 / Toggle a folder between expanded and collapsed.
    Toggle(PathArg),
    /// 展開資料夾。 / Expand a folder.
    Expand(PathArg),
    /// 收合資料夾。 / Collapse a folder.
    Collapse(PathArg),
    /// 管理根資料夾。 / Manage root folders.
    #[command(subcommand)]
    Roots(RootsCommand),
    /// 建立新檔案。 / Create a file, optionally from a template.
    NewFile(NewFileArgs),
    /// 建立新資料夾。 / Create a folder.
    NewFolder(NewFolderArgs),
    /// 重新命名。 / Rename a file or folder.
    Rename(RenameArgs),
    /// 複製檔案。 / Duplicate a file next to itself.
    Duplicate(PathArg),
    /// 移動項目。 / Move a file or folder into another folder.
    Move(MoveArgs),
    /// 列出可移動的目的地。 / List the folders an item can be moved to.
    MoveTargets(PathArg),
    /// 列出子資料夾。 / List the direct child folders of a folder.
    Children(PathArg),
    /// 刪除項目。 / Delete a file or folder (trash by default).
    Delete(DeleteArgs),
    /// 列出檔案範本。 / List the available file templates.
    Templates,
    /// 檢視或修改偏好設定。 / Show, change, import or export preferences.
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(Args)]
struct TreeArgs {
    /// 依名稱搜尋。 / Only list entries whose name contains TERM.
    #[arg(long, value_name = "TERM")]
    search: Option<String>,
}

#[derive(Args)]
struct PathArg {
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Subcommand)]
enum RootsCommand {
    /// 列出根資料夾。 / List registered roots; the active one is marked with `*`.
    List,
    /// 新增根資料夾並設為使用中。 / Add a root and make it active.
    Add {
        #[arg(value_name = "PATH")]
        path: PathBuf,
        /// 取代既有的根資料夾。 / Replace all registered roots.
        #[arg(long)]
        replace: bool,
    },
    /// 移除根資料夾；預設為使用中的根。 / Remove a root (the active one by default).
    Remove {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// 切換使用中的根資料夾。 / Make a registered root active.
    Use {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// 由檔案位置偵測專案根目錄。 / Detect the project root containing FILE and add it.
    Detect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args)]
struct NewFileArgs {
    #[arg(value_name = "PARENT")]
    parent: PathBuf,
    /// 檔名；預設取自範本。 / File name; defaults to the template's file name.
    #[arg(long)]
    name: Option<String>,
    /// 使用的範本。 / Template to start from.
    #[arg(long, default_value = BLANK_TEMPLATE)]
    template: String,
}

#[derive(Args)]
struct NewFolderArgs {
    #[arg(value_name = "PARENT")]
    parent: PathBuf,
    #[arg(value_name = "NAME")]
    name: String,
}

#[derive(Args)]
struct RenameArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,
    #[arg(value_name = "NAME")]
    name: String,
}

#[derive(Args)]
struct MoveArgs {
    #[arg(value_name = "SOURCE")]
    source: PathBuf,
    #[arg(value_name = "DEST_DIR")]
    destination: PathBuf,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// 永久刪除，不經資源回收筒。 / Delete permanently instead of moving to the trash.
    #[arg(long)]
    permanent: bool,
    /// 不再確認。 / Confirm a permanent delete.
    #[arg(long)]
    yes: bool,
}

#[derive(Subcommand)]
enum PrefsCommand {
    /// 顯示所有偏好設定。 / Print every preference as `key = value`.
    Show,
    /// 修改單一偏好設定。 / Change one preference.
    Set {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// 匯出偏好設定。 / Export preferences to a JSON file.
    Export {
        #[arg(value_name = "FILE")]
        output: PathBuf,
    },
    /// 匯入偏好設定 JSON。 / Import preferences from a JSON file.
    Import {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        workspace,
        verbose,
        command,
    } = Cli::parse();
    init_tracing(verbose);

    let workspace_root = resolve_workspace(workspace)?;
    match command {
        Commands::Prefs(subcommand) => execute_prefs_command(subcommand, &workspace_root),
        Commands::Templates => {
            let prefs = load_preferences(&workspace_root)?;
            let mut catalog = TemplateCatalog::from_preferences(&prefs.preferences().browser);
            for item in catalog.get() {
                println!("{}\t{}", item.id, item.label);
            }
            Ok(())
        }
        Commands::Children(arg) => {
            let path = resolve_existing(&arg.path)?;
            if !path.is_dir() {
                bail!("{} is not a folder", path.display());
            }
            for child in list_child_folders(&path) {
                let marker = if has_child_folders(&child) { '+' } else { ' ' };
                println!("{marker} {}", file_label(&child));
            }
            Ok(())
        }
        command => {
            let mut session = Session::open(&workspace_root)?;
            session.execute(command)?;
            session.save()
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Browser state restored from and written back to `<workspace>/.filepane/`.
struct Session {
    store: PanelStateStore,
    prefs: PreferencesStore,
    browser: FileBrowser,
}

impl Session {
    fn open(workspace_root: &Path) -> Result<Self> {
        let store = PanelStateStore::new(state_path(workspace_root));
        let state = store.load_or_default().with_context(|| {
            format!("failed to load panel state from {}", store.path().display())
        })?;
        let prefs = load_preferences(workspace_root)?;
        let mut browser = FileBrowser::from_state(state, ActionExecutor::new());

        if browser.registry().is_empty() {
            let detection = detection_for(prefs.preferences(), false);
            if let RootResolution::Fallback(root) = resolve_startup_root(None, &detection) {
                info!(root = %root.display(), "using default root folder");
                browser.registry_mut().select_root(&root, RootSelection::Add)?;
                refresh_quietly(&mut browser);
            }
        }

        Ok(Self {
            store,
            prefs,
            browser,
        })
    }

    fn save(&self) -> Result<()> {
        self.store.save(&self.browser.to_state()).with_context(|| {
            format!("failed to save panel state to {}", self.store.path().display())
        })
    }

    fn execute(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Tree(args) => self.print_tree(args.search.as_deref()),
            Commands::Toggle(arg) => {
                let path = resolve_existing(&arg.path)?;
                let expanded = !self.browser.expansion().get(&path);
                self.set_expanded(&path, expanded)
            }
            Commands::Expand(arg) => self.set_expanded(&resolve_existing(&arg.path)?, true),
            Commands::Collapse(arg) => self.set_expanded(&resolve_existing(&arg.path)?, false),
            Commands::Roots(subcommand) => self.execute_roots_command(subcommand),
            Commands::NewFile(args) => {
                let parent = resolve_existing(&args.parent)?;
                let mut catalog =
                    TemplateCatalog::from_preferences(&self.prefs.preferences().browser);
                let content = catalog.content_for(&args.template)?;
                let name = args
                    .name
                    .unwrap_or_else(|| catalog.default_file_name(&args.template));
                self.perform(ItemAction::CreateFile {
                    parent,
                    name,
                    content,
                })
            }
            Commands::NewFolder(args) => self.perform(ItemAction::CreateFolder {
                parent: resolve_existing(&args.parent)?,
                name: args.name,
            }),
            Commands::Rename(args) => self.perform(ItemAction::Rename {
                path: resolve_existing(&args.path)?,
                new_name: args.name,
            }),
            Commands::Duplicate(arg) => self.perform(ItemAction::Duplicate {
                path: resolve_existing(&arg.path)?,
            }),
            Commands::Move(args) => self.perform(ItemAction::Move {
                source: resolve_existing(&args.source)?,
                destination_dir: resolve_existing(&args.destination)?,
            }),
            Commands::MoveTargets(arg) => {
                let source = resolve_existing(&arg.path)?;
                let root = self.browser.active_root()?.to_path_buf();
                for target in self.browser.move_targets(&source)? {
                    println!("{}", relative_label(&root, &target));
                }
                Ok(())
            }
            Commands::Delete(args) => {
                let path = resolve_existing(&args.path)?;
                let mode = if args.permanent {
                    DeleteMode::Permanent
                } else {
                    DeleteMode::Trash
                };
                if args.permanent
                    && self.prefs.preferences().browser.confirm_permanent_delete
                    && !args.yes
                {
                    bail!(
                        "refusing to permanently delete {} without --yes",
                        path.display()
                    );
                }
                self.perform(ItemAction::Delete { path, mode })
            }
            Commands::Prefs(_) | Commands::Templates | Commands::Children(_) => {
                Err(anyhow!("command does not use the browser session"))
            }
        }
    }

    fn print_tree(&mut self, search: Option<&str>) -> Result<()> {
        let root = self.browser.active_root()?.to_path_buf();
        match search.filter(|term| !term.trim().is_empty()) {
            Some(term) => {
                for entry in self.browser.search(term)? {
                    let suffix = if entry.is_folder { "/" } else { "" };
                    println!("{}{suffix}", entry.display_name);
                }
            }
            None => {
                let entries = self.browser.refresh()?;
                let rows = self.prefs.preferences().ui.list_rows(entries.len());
                debug!(entries = entries.len(), rows, "tree listing");
                println!("{}", root.display());
                for entry in entries {
                    println!("{}", tree_line(entry));
                }
            }
        }
        Ok(())
    }

    fn set_expanded(&mut self, path: &Path, expanded: bool) -> Result<()> {
        self.browser.active_root()?;
        self.browser.set_expanded(path, expanded)?;
        let verb = if expanded { "Expanded" } else { "Collapsed" };
        println!("{verb} {}", file_label(path));
        Ok(())
    }

    fn perform(&mut self, action: ItemAction) -> Result<()> {
        let outcome = self.browser.perform(action)?;
        if outcome.is_downgraded() {
            warn!(%outcome, "action downgraded");
            eprintln!("Warning: {outcome}");
        } else {
            println!("{outcome}");
        }
        Ok(())
    }

    fn execute_roots_command(&mut self, command: RootsCommand) -> Result<()> {
        match command {
            RootsCommand::List => {
                let active = self.browser.registry().active().map(Path::to_path_buf);
                for root in self.browser.registry().roots() {
                    let marker = if Some(root) == active.as_ref() { '*' } else { ' ' };
                    println!("{marker} {}", root.display());
                }
                return Ok(());
            }
            RootsCommand::Add { path, replace } => {
                let path = resolve_existing(&path)?;
                let mode = if replace {
                    RootSelection::Replace
                } else {
                    RootSelection::Add
                };
                let root = self.browser.registry_mut().select_root(&path, mode)?;
                println!("Active root: {}", root.display());
            }
            RootsCommand::Remove { path } => {
                let removed = match path {
                    Some(path) => {
                        let path = resolve_input_path(&path)?;
                        let path = path.canonicalize().unwrap_or(path);
                        self.browser.registry_mut().remove_root(&path).then_some(path)
                    }
                    None => self.browser.registry_mut().remove_active(),
                };
                let removed = removed.ok_or_else(|| anyhow!("no matching root folder"))?;
                println!("Removed root: {}", removed.display());
            }
            RootsCommand::Use { path } => {
                let path = resolve_existing(&path)?;
                self.browser.registry_mut().set_active(&path)?;
                println!("Active root: {}", path.display());
            }
            RootsCommand::Detect { file } => {
                let file = resolve_existing(&file)?;
                let detection = detection_for(self.prefs.preferences(), true);
                let root = match resolve_startup_root(Some(&file), &detection) {
                    RootResolution::Detected(root) => root,
                    RootResolution::Fallback(root) => {
                        warn!(file = %file.display(), "no project marker found, using default root");
                        root
                    }
                    RootResolution::Failed => {
                        bail!("could not detect a project root for {}", file.display())
                    }
                };
                let root = self
                    .browser
                    .registry_mut()
                    .select_root(&root, RootSelection::Add)?;
                println!("Active root: {}", root.display());
            }
        }

        if self.browser.registry().active().is_some() {
            self.browser.refresh()?;
        }
        Ok(())
    }
}

fn refresh_quietly(browser: &mut FileBrowser) {
    if let Err(err) = browser.refresh() {
        debug!(error = %err, "initial refresh failed");
    }
}

fn detection_for(prefs: &Preferences, force_auto_detect: bool) -> RootDetection {
    RootDetection {
        auto_detect: force_auto_detect || prefs.browser.auto_detect_root,
        markers: prefs.browser.project_markers.clone(),
        default_root: prefs.browser.default_root_dir.clone(),
    }
}

fn tree_line(entry: &DirectoryEntry) -> String {
    let marker = match (entry.is_folder, entry.is_expanded) {
        (true, true) => '-',
        (true, false) => '+',
        (false, _) => ' ',
    };
    format!(
        "{}{marker} {}",
        "  ".repeat(entry.depth),
        entry.display_name
    )
}

fn relative_label(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rest) if rest.as_os_str().is_empty() => ".".to_string(),
        Ok(rest) => rest.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn execute_prefs_command(command: PrefsCommand, workspace_root: &Path) -> Result<()> {
    let mut store = load_preferences(workspace_root)?;
    match command {
        PrefsCommand::Show => {
            let prefs = store.preferences();
            for key in Preferences::KEYS {
                println!("{key} = {}", prefs.get(key).unwrap_or_default());
            }
        }
        PrefsCommand::Set { key, value } => {
            let mut updated = store.preferences().clone();
            updated.set(&key, &value)?;
            store
                .update(|prefs| *prefs = updated.clone())
                .with_context(|| {
                    format!(
                        "failed to save preferences to {}",
                        store_path(workspace_root).display()
                    )
                })?;
            println!("{key} = {}", store.preferences().get(&key).unwrap_or_default());
        }
        PrefsCommand::Export { output } => {
            let output = resolve_input_path(&output)?;
            store
                .export_to(&output)
                .with_context(|| format!("failed to export preferences to {}", output.display()))?;
            println!("Exported preferences to {}", output.display());
        }
        PrefsCommand::Import { input } => {
            let input = resolve_input_path(&input)?;
            if !input.exists() {
                bail!("preferences file '{}' does not exist", input.display());
            }
            store
                .import_from(&input)
                .with_context(|| format!("failed to import preferences from {}", input.display()))?;
            println!("Imported preferences from {}", input.display());
        }
    }
    Ok(())
}

fn load_preferences(workspace_root: &Path) -> Result<PreferencesStore> {
    let path = store_path(workspace_root);
    PreferencesStore::load(&path)
        .with_context(|| format!("failed to load preferences from {}", path.display()))
}

fn data_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".filepane")
}

fn store_path(workspace_root: &Path) -> PathBuf {
    data_dir(workspace_root).join("preferences.json")
}

fn state_path(workspace_root: &Path) -> PathBuf {
    data_dir(workspace_root).join("state.json")
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => resolve_input_path(&path),
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}

/// Absolute form of an existing path with its parent resolved the way roots are registered.
///
/// The last component is kept as given, so a symlink names the link itself and not its target.
fn resolve_existing(path: &Path) -> Result<PathBuf> {
    let absolute = resolve_input_path(path)?;
    std::fs::symlink_metadata(&absolute)
        .with_context(|| format!("path '{}' does not exist", absolute.display()))?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = parent
                .canonicalize()
                .with_context(|| format!("path '{}' does not exist", parent.display()))?;
            Ok(parent.join(name))
        }
        _ => absolute
            .canonicalize()
            .with_context(|| format!("path '{}' does not exist", absolute.display())),
    }
}
