use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use scriptorium_outline::{OutlineItem, OutlineKind, OutlineParser};
use scriptorium_project::{
    find_project, handle, list_projects, EngineConfig, ImportReport, Item, ItemId, ItemRef,
    OperationRequest, ProjectSummary, ProjectWorkspace,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scriptorium-cli",
    about = "Manage Scriptorium writing projects from the command line",
    author,
    version
)]
struct Cli {
    /// 專案根目錄；預設為目前目錄。 / Project root (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    project: Option<PathBuf>,
    /// 引擎設定檔（JSON）。 / Engine configuration file (JSON).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// 提高日誌詳細程度（-v、-vv）。 / Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 掃描專案並列出項目樹。 / Scan the project and print its item tree.
    Scan(ScanArgs),
    /// 建立新檔案。 / Create a new file.
    CreateFile(CreateFileArgs),
    /// 建立新資料夾。 / Create a new folder.
    CreateFolder(CreateFolderArgs),
    /// 取代檔案內容。 / Replace the content of a file.
    Write(WriteArgs),
    /// 重新命名項目。 / Rename an item.
    Rename(RenameArgs),
    /// 移動項目至其他資料夾。 / Move an item to another folder.
    Move(MoveArgs),
    /// 刪除項目。 / Delete an item.
    Delete(TargetArgs),
    /// 預覽 Markdown 大綱拆分結果。 / Preview how a markdown file splits into an outline.
    Outline(OutlineArgs),
    /// 將 Markdown 大綱匯入專案。 / Import a markdown outline into the project.
    Import(ImportArgs),
    /// 執行 JSON 操作請求。 / Run a JSON operation request.
    Op(OpArgs),
    /// 列出專案總目錄（--project）下的專案。 / List projects under the projects root given by --project.
    Projects(ProjectsArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// 以 JSON 輸出。 / Print JSON instead of a tree.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["id", "path"])))]
struct TargetArgs {
    /// 項目代號。 / Item id.
    #[arg(long)]
    id: Option<String>,
    /// 專案相對路徑。 / Project-relative path.
    #[arg(long)]
    path: Option<String>,
}

impl TargetArgs {
    fn item_ref(&self) -> Result<ItemRef> {
        match (&self.id, &self.path) {
            (Some(id), _) => Ok(ItemRef::Id(ItemId::from_string(id.clone()))),
            (None, Some(path)) => Ok(ItemRef::Path(path.clone())),
            (None, None) => bail!("either --id or --path is required"),
        }
    }
}

#[derive(Args)]
#[command(group(ArgGroup::new("body").args(["content", "from"])))]
struct CreateFileArgs {
    /// 檔名；未含副檔名時補上預設副檔名。 / File name; the default extension is added when missing.
    name: String,
    /// 上層資料夾代號。 / Parent folder id.
    #[arg(long)]
    parent: Option<String>,
    /// 檔案內容。 / File content.
    #[arg(long)]
    content: Option<String>,
    /// 從檔案讀取內容（`-` 代表標準輸入）。 / Read content from a file (`-` for stdin).
    #[arg(long, value_name = "FILE")]
    from: Option<PathBuf>,
}

#[derive(Args)]
struct CreateFolderArgs {
    name: String,
    /// 上層資料夾代號。 / Parent folder id.
    #[arg(long)]
    parent: Option<String>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("body").required(true).args(["content", "from"])))]
struct WriteArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long)]
    content: Option<String>,
    /// 從檔案讀取內容（`-` 代表標準輸入）。 / Read content from a file (`-` for stdin).
    #[arg(long, value_name = "FILE")]
    from: Option<PathBuf>,
}

#[derive(Args)]
struct RenameArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// 新名稱。 / New name.
    new_name: String,
}

#[derive(Args)]
struct MoveArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// 目標資料夾代號；省略則移至根目錄。 / Destination folder id; the project root when omitted.
    #[arg(long)]
    to: Option<String>,
}

#[derive(Args)]
struct OutlineArgs {
    /// Markdown 來源檔（`-` 代表標準輸入）。 / Markdown source (`-` for stdin).
    input: PathBuf,
    /// 無標題文字使用的名稱。 / Name for text outside any heading.
    #[arg(long)]
    fallback: Option<String>,
    /// 以 JSON 輸出。 / Print JSON instead of a tree.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// Markdown 來源檔（`-` 代表標準輸入）。 / Markdown source (`-` for stdin).
    input: PathBuf,
    /// 匯入目標資料夾代號。 / Destination folder id.
    #[arg(long)]
    parent: Option<String>,
    /// 無標題文字使用的名稱。 / Name for text outside any heading.
    #[arg(long)]
    fallback: Option<String>,
}

#[derive(Args)]
struct OpArgs {
    /// JSON 請求檔（`-` 或省略代表標準輸入）。 / JSON request file (`-` or omitted for stdin).
    request: Option<PathBuf>,
}

#[derive(Args)]
struct ProjectsArgs {
    /// 只顯示指定代號的專案。 / Show only the project with this id.
    #[arg(long)]
    id: Option<String>,
    /// 以 JSON 輸出。 / Print JSON instead of a list.
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        project,
        config,
        verbose,
        command,
    } = Cli::parse();
    init_logging(verbose);

    let config = load_config(config.as_deref())?;
    let root = resolve_project(project)?;
    tracing::debug!(root = %root.display(), manifest = %config.manifest_file_name, "resolved project");
    match command {
        Commands::Scan(args) => execute_scan(args, &root, config),
        Commands::CreateFile(args) => execute_create_file(args, &root, config),
        Commands::CreateFolder(args) => {
            let mut workspace = open_workspace(&root, config)?;
            let parent = args.parent.map(ItemId::from_string);
            let item = workspace.create_folder(&args.name, parent.as_ref())?;
            println!("Created folder {} [{}]", item.path, item.id);
            Ok(())
        }
        Commands::Write(args) => {
            let content = read_body(args.content, args.from.as_deref())?;
            let mut workspace = open_workspace(&root, config)?;
            let item = workspace.update_content(&args.target.item_ref()?, &content)?;
            println!("Wrote {} bytes to {}", item.size, item.path);
            Ok(())
        }
        Commands::Rename(args) => {
            let mut workspace = open_workspace(&root, config)?;
            let item = workspace.rename(&args.target.item_ref()?, &args.new_name)?;
            println!("Renamed to {} [{}]", item.path, item.id);
            Ok(())
        }
        Commands::Move(args) => {
            let mut workspace = open_workspace(&root, config)?;
            let to = args.to.map(ItemId::from_string);
            let item = workspace.move_item(&args.target.item_ref()?, to.as_ref())?;
            println!("Moved to {} [{}]", item.path, item.id);
            Ok(())
        }
        Commands::Delete(args) => execute_delete(args, &root, config),
        Commands::Outline(args) => execute_outline(args, config),
        Commands::Import(args) => execute_import(args, &root, config),
        Commands::Op(args) => execute_op(args, config),
        Commands::Projects(args) => execute_projects(args, &root),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading engine config");
            EngineConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn resolve_project(project: Option<PathBuf>) -> Result<PathBuf> {
    match project {
        Some(path) if path.is_absolute() => Ok(path),
        Some(path) => Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path)),
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn open_workspace(root: &Path, config: EngineConfig) -> Result<ProjectWorkspace> {
    ProjectWorkspace::open(root, config)
        .with_context(|| format!("failed to open project {}", root.display()))
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_body(content: Option<String>, from: Option<&Path>) -> Result<String> {
    match (content, from) {
        (Some(content), _) => Ok(content),
        (None, Some(path)) => read_source(path),
        (None, None) => Ok(String::new()),
    }
}

fn execute_scan(args: ScanArgs, root: &Path, config: EngineConfig) -> Result<()> {
    let mut workspace = open_workspace(root, config)?;
    let structure = workspace.structure()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&structure)?);
        return Ok(());
    }

    println!("{}", structure.name);
    print_items(&structure.items);
    let stats = &structure.stats;
    println!(
        "{} files, {} folders, {} words",
        stats.total_files, stats.total_folders, stats.total_words
    );
    for warning in &structure.warnings {
        eprintln!("warning: {}: {}", warning.path, warning.message);
    }
    Ok(())
}

fn print_items(items: &[Item]) {
    let mut pending: Vec<(usize, &Item)> = items.iter().rev().map(|item| (1, item)).collect();
    while let Some((level, item)) = pending.pop() {
        let marker = if item.is_folder() { "/" } else { "" };
        println!("{}{}{}  [{}]", "  ".repeat(level), item.name, marker, item.id);
        pending.extend(item.children().iter().rev().map(|child| (level + 1, child)));
    }
}

fn execute_create_file(args: CreateFileArgs, root: &Path, config: EngineConfig) -> Result<()> {
    let content = read_body(args.content, args.from.as_deref())?;
    let mut workspace = open_workspace(root, config)?;
    let parent = args.parent.map(ItemId::from_string);
    let item = workspace.create_file(&args.name, &content, parent.as_ref())?;
    println!("Created file {} [{}]", item.path, item.id);
    Ok(())
}

fn execute_delete(args: TargetArgs, root: &Path, config: EngineConfig) -> Result<()> {
    let mut workspace = open_workspace(root, config)?;
    let report = workspace.delete(&args.item_ref()?)?;
    for failure in &report.failed {
        eprintln!("warning: {}: {}", failure.path, failure.message);
    }
    println!(
        "Deleted {} ({} entries removed)",
        report.target,
        report.removed_paths.len()
    );
    if !report.is_complete() {
        bail!("{} entries could not be removed", report.failed.len());
    }
    Ok(())
}

fn parse_outline(
    input: &Path,
    fallback: Option<String>,
    config: &EngineConfig,
) -> Result<Vec<OutlineItem>> {
    let text = read_source(input)?;
    let fallback = fallback.unwrap_or_else(|| {
        input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| stem != "-")
            .unwrap_or_else(|| "Imported".to_string())
    });
    let parser = OutlineParser::new(config.outline.clone()).context("invalid outline policy")?;
    Ok(parser.parse(&text, &fallback))
}

fn execute_outline(args: OutlineArgs, config: EngineConfig) -> Result<()> {
    let items = parse_outline(&args.input, args.fallback, &config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    let mut pending: Vec<(usize, &OutlineItem)> =
        items.iter().rev().map(|item| (0, item)).collect();
    while let Some((level, item)) = pending.pop() {
        let marker = match item.kind {
            OutlineKind::Folder => "/",
            OutlineKind::File => "",
        };
        println!("{}{}{}", "  ".repeat(level), item.name, marker);
        pending.extend(item.children.iter().rev().map(|child| (level + 1, child)));
    }
    Ok(())
}

fn execute_import(args: ImportArgs, root: &Path, config: EngineConfig) -> Result<()> {
    let items = parse_outline(&args.input, args.fallback, &config)?;
    let mut workspace = open_workspace(root, config)?;
    let parent = args.parent.map(ItemId::from_string);
    let report = scriptorium_project::ImportOrchestrator::new(&mut workspace)
        .import_tree(parent.as_ref(), &items)?;
    print_import_report(&report);
    if !report.is_success() {
        bail!("{} item(s) failed to import", report.failed.len());
    }
    Ok(())
}

fn print_import_report(report: &ImportReport) {
    for created in &report.created {
        println!("created {}", created.path);
    }
    for warning in &report.warnings {
        eprintln!("warning: {}: {}", warning.path, warning.message);
    }
    for failure in &report.failed {
        eprintln!(
            "failed: {} ({}): {}",
            failure.path.as_deref().unwrap_or(&failure.title),
            failure.code,
            failure.message
        );
    }
    println!(
        "Imported {} item(s), {} failed",
        report.created.len(),
        report.failed.len()
    );
}

fn execute_op(args: OpArgs, config: EngineConfig) -> Result<()> {
    let source = args.request.unwrap_or_else(|| PathBuf::from("-"));
    let payload = read_source(&source)?;
    let request: OperationRequest =
        serde_json::from_str(&payload).context("invalid operation request")?;
    let response = handle(request, &config);
    println!("{}", serde_json::to_string_pretty(&response)?);
    if let Some(error) = &response.error {
        bail!("{}: {}", error.code, error.message);
    }
    Ok(())
}

fn execute_projects(args: ProjectsArgs, projects_root: &Path) -> Result<()> {
    if let Some(id) = args.id {
        let Some(project) = find_project(projects_root, &id)? else {
            bail!("no project `{id}` under {}", projects_root.display());
        };
        if args.json {
            println!("{}", serde_json::to_string_pretty(&project)?);
        } else {
            print_project(&project);
            println!("{}", project.root(projects_root).display());
        }
        return Ok(());
    }

    let catalog = list_projects(projects_root)
        .with_context(|| format!("failed to list projects in {}", projects_root.display()))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for (label, projects) in [
        ("Books", &catalog.books),
        ("Scripts", &catalog.scripts),
        ("Blogs", &catalog.blogs),
    ] {
        println!("{label}:");
        for project in projects {
            print_project(project);
        }
    }
    println!("{} project(s)", catalog.len());
    Ok(())
}

fn print_project(project: &ProjectSummary) {
    println!("  {}  [{}]", project.title, project.path);
}
