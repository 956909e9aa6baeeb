/// quarry: workspace code search and intelligence engine
///
/// Indexes a source workspace into a symbol store plus an inverted index
/// and serves queries against them through the operation registry.
///
/// Commands:
/// - index: full scan of a workspace (optionally forced)
/// - search: text search with shaped, token-budgeted output
/// - symbols: symbol lookup across all tiers
/// - refs: relationship fan-out plus text mentions for a symbol
/// - watch: keep the index live while files change
/// - health: engine diagnostics
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quarry::ops::OperationRegistry;
use quarry::QuarryWorkspace;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Workspace code search and intelligence engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Optional log file (stderr when omitted)
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the workspace and build or update the index
    Index {
        /// Re-extract every file, changed or not
        #[arg(short, long)]
        force: bool,
    },

    /// Search file content
    Search {
        query: String,

        /// standard | wildcard | fuzzy | phrase | regex
        #[arg(short = 't', long, default_value = "standard")]
        search_type: String,

        /// Restrict to extensions (comma separated)
        #[arg(short, long)]
        extensions: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        max_results: usize,

        /// Token budget for the shaped response
        #[arg(short = 'b', long)]
        budget: Option<usize>,
    },

    /// Look up symbols by name
    Symbols {
        query: String,

        /// Filter by kind (class, struct, function, ...)
        #[arg(short, long)]
        kind: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Find references and relationships for a symbol
    Refs {
        name: String,

        #[arg(short, long, default_value_t = 2)]
        depth: u32,
    },

    /// Index, then watch for changes until interrupted
    Watch,

    /// Print engine diagnostics
    Health,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().context("cannot resolve current directory")?,
    };

    let engine = Arc::new(
        QuarryWorkspace::open(&root)
            .with_context(|| format!("failed to open workspace {}", root.display()))?,
    );
    engine.spawn_background_tasks();
    let registry = OperationRegistry::new();

    match cli.command {
        Commands::Index { force } => {
            let response = registry
                .dispatch(
                    Arc::clone(&engine),
                    "index_workspace",
                    json!({ "force_rebuild": force }),
                )
                .await;
            print_response(&response)?;
        }

        Commands::Search {
            query,
            search_type,
            extensions,
            max_results,
            budget,
        } => {
            let extensions: Vec<String> = extensions
                .map(|e| e.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            let response = registry
                .dispatch(
                    Arc::clone(&engine),
                    "text_search",
                    json!({
                        "query": query,
                        "search_type": search_type,
                        "extensions": extensions,
                        "max_results": max_results,
                        "token_budget": budget,
                    }),
                )
                .await;
            print_response(&response)?;
        }

        Commands::Symbols { query, kind, limit } => {
            let response = registry
                .dispatch(
                    Arc::clone(&engine),
                    "symbol_search",
                    json!({ "query": query, "kind": kind, "limit": limit }),
                )
                .await;
            print_response(&response)?;
        }

        Commands::Refs { name, depth } => {
            let response = registry
                .dispatch(
                    Arc::clone(&engine),
                    "find_references",
                    json!({ "name": name, "max_depth": depth }),
                )
                .await;
            print_response(&response)?;
        }

        Commands::Watch => {
            registry
                .dispatch(
                    Arc::clone(&engine),
                    "index_workspace",
                    json!({ "force_rebuild": false }),
                )
                .await;
            engine.start_watching().context("failed to start watcher")?;
            info!("Watching {}; press Ctrl-C to stop", root.display());
            tokio::signal::ctrl_c().await.context("signal handler failed")?;
        }

        Commands::Health => {
            let response = registry
                .dispatch(Arc::clone(&engine), "system_health", json!({}))
                .await;
            print_response(&response)?;
            let response = registry
                .dispatch(Arc::clone(&engine), "index_health", json!({}))
                .await;
            print_response(&response)?;
        }
    }

    engine.shutdown().await?;
    Ok(())
}

fn print_response(response: &quarry::OperationResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

fn init_logging(log_path: Option<&std::path::Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_path {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "quarry.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
