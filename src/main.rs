//! Devac CLI entry point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "devac")]
#[command(about = "Incremental code-intelligence seeds with a SQL-capable hub", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a package and commit its seed
    Analyze {
        /// Package root (defaults to current directory)
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Repo name recorded in entity IDs (defaults to the parent directory name)
        #[arg(long)]
        repo: Option<String>,

        /// Package name recorded in entity IDs (defaults to the directory name)
        #[arg(long)]
        package: Option<String>,
    },
    /// Watch a package and keep its seed current
    Watch {
        #[arg(default_value = ".")]
        root: PathBuf,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        package: Option<String>,

        /// Debounce window in milliseconds
        #[arg(long, default_value = "100")]
        debounce_ms: u64,
    },
    /// Run the workspace hub server on its unix socket
    Serve {
        /// Workspace root (parent of the git repos)
        #[arg(default_value = ".")]
        workspace: PathBuf,

        /// Repos to register before serving
        #[arg(long)]
        repo: Vec<PathBuf>,
    },
    /// Run a read-only SQL query against the workspace seeds
    Query {
        sql: String,

        #[arg(long, default_value = ".")]
        workspace: PathBuf,

        /// Restrict to these packages; the first becomes the primary
        #[arg(long)]
        package: Vec<String>,

        /// Branch overlay to apply
        #[arg(long)]
        branch: Option<String>,
    },
    /// Register a repo with the workspace hub
    Register {
        repo: PathBuf,

        #[arg(long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("devac={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Analyze { root, repo, package } => commands::analyze(root, repo, package).await,
        Commands::Watch {
            root,
            repo,
            package,
            debounce_ms,
        } => commands::watch(root, repo, package, debounce_ms).await,
        Commands::Serve { workspace, repo } => commands::serve(workspace, repo).await,
        Commands::Query {
            sql,
            workspace,
            package,
            branch,
        } => commands::query(workspace, sql, package, branch).await,
        Commands::Register { repo, workspace } => commands::register(workspace, repo).await,
        Commands::Version => {
            println!("devac v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
