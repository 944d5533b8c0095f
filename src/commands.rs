//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use devac_hub::{CentralHub, HubClient, HubServer, QueryOptions};
use devac_parser::ParserRegistry;
use devac_watcher::{FileChange, PackageWatcher, RenameDetector, UpdateManager, WatcherOptions};
use walkdir::WalkDir;

fn dir_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(fallback)
        .to_string()
}

fn identity(root: &Path, repo: Option<String>, package: Option<String>) -> (String, String) {
    let package = package.unwrap_or_else(|| dir_name(root, "package"));
    let repo = repo.unwrap_or_else(|| {
        root.parent()
            .map(|p| dir_name(p, "repo"))
            .unwrap_or_else(|| "repo".to_string())
    });
    (repo, package)
}

/// Walk the package and feed every parseable file through the update
/// manager as an add.
pub async fn analyze(root: PathBuf, repo: Option<String>, package: Option<String>) -> Result<()> {
    let root = root.canonicalize().context("package root does not exist")?;
    let (repo, package) = identity(&root, repo, package);
    tracing::info!("analyzing {package} at {}", root.display());

    let registry = ParserRegistry::with_defaults();
    let mut changes = Vec::new();
    for entry in WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .map(|name| !devac_watcher::watcher::ALWAYS_IGNORED.contains(&name))
                .unwrap_or(true)
        })
        .flatten()
    {
        if entry.file_type().is_file() && registry.for_path(entry.path()).is_some() {
            changes.push(FileChange::Add(entry.path().to_path_buf()));
        }
    }

    let mut manager = UpdateManager::new(&root, &repo, &package);
    let summary = tokio::task::spawn_blocking(move || manager.process_batch(&changes)).await?;

    tracing::info!(
        "analyze complete: {} updated, {} skipped, {} failed",
        summary.processed,
        summary.skipped,
        summary.failed
    );
    for outcome in summary.outcomes.iter().filter(|o| o.error.is_some()) {
        tracing::warn!("{}: {}", outcome.path, outcome.error.as_deref().unwrap_or(""));
    }
    Ok(())
}

/// Analyze once, then keep the seed current from watcher batches.
pub async fn watch(
    root: PathBuf,
    repo: Option<String>,
    package: Option<String>,
    debounce_ms: u64,
) -> Result<()> {
    analyze(root.clone(), repo.clone(), package.clone()).await?;

    let root = root.canonicalize()?;
    let (repo, package) = identity(&root, repo, package);
    let mut manager = UpdateManager::new(&root, &repo, &package);
    let mut detector = RenameDetector::new();

    let options = WatcherOptions {
        debounce_ms,
        ..Default::default()
    };
    let mut watcher = PackageWatcher::new(&root, options)?;
    let (_events, mut batches) = watcher.start()?;
    tracing::info!("watching {} (ctrl-c to stop)", root.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                watcher.stop();
                tracing::info!("watch stopped");
                return Ok(());
            }
            batch = batches.recv() => {
                let Some(batch) = batch else { return Ok(()) };
                let changes = detector.process_batch(&batch);
                let summary = manager.process_batch(&changes);
                if summary.processed + summary.failed > 0 {
                    tracing::info!(
                        "batch: {} updated, {} skipped, {} failed",
                        summary.processed,
                        summary.skipped,
                        summary.failed
                    );
                }
            }
        }
    }
}

/// Start the workspace hub and serve queries on its socket.
pub async fn serve(workspace: PathBuf, repos: Vec<PathBuf>) -> Result<()> {
    let workspace = workspace.canonicalize().context("workspace does not exist")?;
    let mut hub = CentralHub::new(&workspace)?;
    for repo in repos {
        let summary = hub.register_repo(&repo)?;
        tracing::info!("registered {} ({} packages)", summary.repo_id, summary.packages);
    }
    HubServer::new(hub).serve().await?;
    Ok(())
}

/// Query through the routing client: shared hub process when one is
/// listening, direct in-process hub otherwise.
pub async fn query(
    workspace: PathBuf,
    sql: String,
    packages: Vec<String>,
    branch: Option<String>,
) -> Result<()> {
    let workspace = workspace.canonicalize().context("workspace does not exist")?;
    let mut client = HubClient::connect(&workspace).await?;
    let options = QueryOptions {
        branch,
        packages: (!packages.is_empty()).then_some(packages),
    };
    let output = client.query(&sql, &options).await?;

    for warning in &output.warnings {
        tracing::warn!("{warning}");
    }
    println!("{}", serde_json::to_string_pretty(&output.rows)?);
    tracing::info!("{} row(s) in {} ms", output.row_count, output.time_ms);
    Ok(())
}

pub async fn register(workspace: PathBuf, repo: PathBuf) -> Result<()> {
    let workspace = workspace.canonicalize().context("workspace does not exist")?;
    let mut client = HubClient::connect(&workspace).await?;
    let summary = client.register(&repo).await?;
    tracing::info!(
        "registered {} with {} package(s)",
        summary.repo_id,
        summary.packages
    );
    Ok(())
}
