//! Binary entry point for the pyscout CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Parse one file and print its scope tree as JSON
//! pyscout parse src/app.py
//!
//! # Completion proposals at a cursor position (line:column or character offset)
//! pyscout complete src/app.py --at 12:9 --project src
//!
//! # Hover text and declaration lookup
//! pyscout tooltip src/app.py --at 12:9
//! pyscout goto src/app.py --at 12:9 --project src
//!
//! # Project-wide symbol search
//! pyscout search "connection open" --project src
//!
//! # Dump the embedded worker program
//! pyscout script
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use walkdir::WalkDir;

use pyscout::config::PyscoutConfig;
use pyscout::error::{PyscoutError, PyscoutResult};
use pyscout::pool::WorkerPool;
use pyscout::pyworker::WORKER_SCRIPT;
use pyscout::session::Session;
use pyscout_core::message::{ResponsePayload, SymbolKind};
use pyscout_core::scope::IconKind;

// ============================================================================
// CLI Structure
// ============================================================================

/// Python code intelligence from the command line.
///
/// Parsing runs in a pool of Python worker processes; completion, hover and
/// declaration lookup are answered from the scope model built on the results.
#[derive(Parser, Debug)]
#[command(name = "pyscout", version, about = "Python code intelligence engine")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Configuration file (default: $PYSCOUT_CONFIG, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Python interpreter for the workers (default: $PYSCOUT_PYTHON, then PATH).
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Number of worker processes.
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a file in a worker and print its scope tree as JSON.
    Parse {
        /// File to parse.
        file: PathBuf,
        /// Dotted module name (default: derived from the package layout).
        #[arg(long)]
        module_name: Option<String>,
    },
    /// List completion proposals at a cursor position.
    Complete {
        /// File the cursor is in.
        file: PathBuf,
        /// Cursor position as 1-based line:column or a character offset.
        #[arg(long)]
        at: String,
        /// Project root to analyze for cross-module types.
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Show hover text for the name under a cursor position.
    Tooltip {
        /// File the cursor is in.
        file: PathBuf,
        /// Cursor position as 1-based line:column or a character offset.
        #[arg(long)]
        at: String,
        /// Project root to analyze for cross-module types.
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Print the declaration site of the name under a cursor position.
    Goto {
        /// File the cursor is in.
        file: PathBuf,
        /// Cursor position as 1-based line:column or a character offset.
        #[arg(long)]
        at: String,
        /// Project root to analyze for cross-module types.
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Search the project symbol index.
    Search {
        /// Query terms; every term must match somewhere in the symbol name.
        query: String,
        /// Project root to index and search.
        #[arg(long)]
        project: PathBuf,
        /// Only report symbols declared in this file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Only report symbols of this kind.
        #[arg(long, value_enum)]
        kind: Option<SymbolKindArg>,
    },
    /// Print the embedded Python worker program.
    Script,
}

/// Symbol kind filter for the search command.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum SymbolKindArg {
    Module,
    Class,
    Function,
    Variable,
}

impl From<SymbolKindArg> for SymbolKind {
    fn from(kind: SymbolKindArg) -> Self {
        match kind {
            SymbolKindArg::Module => SymbolKind::Module,
            SymbolKindArg::Class => SymbolKind::Class,
            SymbolKindArg::Function => SymbolKind::Function,
            SymbolKindArg::Variable => SymbolKind::Variable,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pyscout: {err}");
            ExitCode::from(err.exit_code().code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

// ============================================================================
// Command Execution
// ============================================================================

async fn execute(cli: Cli) -> PyscoutResult<()> {
    // The script dump needs no workers.
    if matches!(cli.command, Command::Script) {
        print!("{WORKER_SCRIPT}");
        return Ok(());
    }

    let mut config = PyscoutConfig::load(cli.global.config.as_deref())?;
    if let Some(workers) = cli.global.workers {
        config.worker_count = workers;
    }
    if let Some(python) = cli.global.python {
        config.python = Some(python);
    }

    let pool = WorkerPool::start(&config).await?;
    let session = Session::new(pool.clone());
    run_command(session, pool, cli.command).await
}

async fn run_command(
    mut session: Session,
    pool: WorkerPool,
    command: Command,
) -> PyscoutResult<()> {
    let result = match command {
        Command::Parse { file, module_name } => print_parse(&pool, &file, module_name).await,
        Command::Complete { file, at, project } => {
            print_completions(&mut session, &file, &at, project.as_deref()).await
        }
        Command::Tooltip { file, at, project } => {
            print_tooltip(&mut session, &file, &at, project.as_deref()).await
        }
        Command::Goto { file, at, project } => {
            print_definition(&mut session, &file, &at, project.as_deref()).await
        }
        Command::Search {
            query,
            project,
            file,
            kind,
        } => print_search(&mut session, &query, &project, file, kind).await,
        Command::Script => Ok(()),
    };
    let shutdown = session.shutdown().await;
    result.and(shutdown)
}

async fn print_parse(
    pool: &WorkerPool,
    file: &Path,
    module_name: Option<String>,
) -> PyscoutResult<()> {
    let response = pool
        .parse_file(path_string(file), module_name)
        .expect_success()
        .await?;
    match response.payload {
        ResponsePayload::ParseFileResponse { file } => {
            println!("{}", serde_json::to_string_pretty(&file)?);
            Ok(())
        }
        other => Err(PyscoutError::transport(format!(
            "unexpected response to parse_file: {}",
            other.kind()
        ))),
    }
}

async fn print_completions(
    session: &mut Session,
    file: &Path,
    at: &str,
    project: Option<&Path>,
) -> PyscoutResult<()> {
    let (path, source, position) = load_cursor(session, file, at, project).await?;
    for item in session.completions_at(&path, &source, position) {
        match &item.detail {
            Some(detail) => println!("{:<8} {}  ({detail})", icon_label(item.icon), item.text),
            None => println!("{:<8} {}", icon_label(item.icon), item.text),
        }
    }
    Ok(())
}

async fn print_tooltip(
    session: &mut Session,
    file: &Path,
    at: &str,
    project: Option<&Path>,
) -> PyscoutResult<()> {
    let (path, source, position) = load_cursor(session, file, at, project).await?;
    if let Some(text) = session.tooltip_at(&path, &source, position) {
        println!("{text}");
    }
    Ok(())
}

async fn print_definition(
    session: &mut Session,
    file: &Path,
    at: &str,
    project: Option<&Path>,
) -> PyscoutResult<()> {
    let (path, source, position) = load_cursor(session, file, at, project).await?;
    if let Some(location) = session.definition_at(&path, &source, position) {
        println!("{}:{}", location.file_path, location.line);
    }
    Ok(())
}

async fn print_search(
    session: &mut Session,
    query: &str,
    project: &Path,
    file: Option<PathBuf>,
    kind: Option<SymbolKindArg>,
) -> PyscoutResult<()> {
    session.open_project(path_string(project)).await?;
    let results = session
        .search(
            query,
            file.as_deref().map(path_string),
            kind.map(SymbolKind::from),
        )
        .await?;
    for result in results {
        println!(
            "{}:{}  {}  {}",
            result.file_path,
            result.line,
            kind_label(result.kind),
            result.symbol_name
        );
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Reads the cursor file, analyzes it (and, when given, the whole project)
/// into the model, and resolves the `--at` spec to a character position.
async fn load_cursor(
    session: &mut Session,
    file: &Path,
    at: &str,
    project: Option<&Path>,
) -> PyscoutResult<(String, String, usize)> {
    if let Some(root) = project {
        analyze_project(session, root).await?;
    }
    let path = path_string(file);
    session.analyze_file(&path, None).await?;
    let source =
        std::fs::read_to_string(file).map_err(|error| PyscoutError::io(file.to_owned(), error))?;
    let position = position_in(&source, at)?;
    Ok((path, source, position))
}

/// Analyzes every Python file under `root`. Files that fail to parse are
/// skipped; the cursor file itself is analyzed separately and fails hard.
async fn analyze_project(session: &mut Session, root: &Path) -> PyscoutResult<()> {
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "py") {
            continue;
        }
        let path = path_string(path);
        if let Err(error) = session.analyze_file(&path, None).await {
            debug!(%path, %error, "skipping file that does not analyze");
        }
    }
    Ok(())
}

/// Resolves a cursor spec to a character offset. `12:9` addresses line 12,
/// column 9, both 1-based; a bare number is a character offset.
fn position_in(source: &str, spec: &str) -> PyscoutResult<usize> {
    let Some((line, column)) = spec.split_once(':') else {
        return spec
            .parse::<usize>()
            .map_err(|_| PyscoutError::invalid_arguments(format!("invalid cursor spec: {spec}")));
    };
    let line: usize = line
        .parse()
        .map_err(|_| PyscoutError::invalid_arguments(format!("invalid cursor spec: {spec}")))?;
    let column: usize = column
        .parse()
        .map_err(|_| PyscoutError::invalid_arguments(format!("invalid cursor spec: {spec}")))?;
    if line == 0 || column == 0 {
        return Err(PyscoutError::invalid_arguments(format!(
            "cursor lines and columns are 1-based: {spec}"
        )));
    }

    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let content_len = text.trim_end_matches(['\n', '\r']).chars().count();
            return Ok(offset + (column - 1).min(content_len));
        }
        offset += text.chars().count();
    }
    Err(PyscoutError::invalid_arguments(format!(
        "line {line} is past the end of the file"
    )))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn icon_label(icon: IconKind) -> &'static str {
    match icon {
        IconKind::Class => "class",
        IconKind::Function | IconKind::FunctionPrivate => "func",
        IconKind::Variable | IconKind::VariablePrivate => "var",
        IconKind::Namespace => "mod",
        IconKind::Keyword => "keyword",
    }
}

fn kind_label(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Module => "module",
        SymbolKind::Class => "class",
        SymbolKind::Function => "func",
        SymbolKind::Variable => "var",
    }
}

// ============================================================================
// Tests
// ============================================================================
