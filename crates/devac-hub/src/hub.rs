//! Workspace-level hub: repo registry, refresh orchestration, and the
//! query entry points
//!
//! Exactly one hub instance owns the workspace state; concurrent consumers
//! multiplex through the IPC server. The hub holds lookup-only references
//! to package seeds: deleting a seed drops the package from query views but
//! never destroys hub state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use devac_core::{Edge, ExternalRef, Node};
use devac_seed::SeedReader;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{self, CachedRepo, StateCache};
use crate::discovery::{self, DiscoveredPackage};
use crate::error::HubError;
use crate::query::{PackageRows, QueryEngine, QueryOutput, rewrite_package_refs};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSummary {
    pub repo_id: String,
    pub name: String,
    pub packages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub packages_updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Branch overlay to apply; base when `None`.
    pub branch: Option<String>,
    /// Restrict the context to these package names; the first one becomes
    /// the primary package behind unqualified view names.
    pub packages: Option<Vec<String>>,
}

#[derive(Debug)]
struct RepoEntry {
    name: String,
    path: PathBuf,
    packages: Vec<DiscoveredPackage>,
}

pub struct CentralHub {
    workspace_root: PathBuf,
    repos: HashMap<String, RepoEntry>,
    /// (repo_id, package path) → issues pushed by validation runners.
    validation_errors: DashMap<(String, String), Vec<serde_json::Value>>,
}

impl CentralHub {
    /// Open a hub for `workspace_root`, restoring the discovery cache.
    /// Fails when the root sits inside a git repository.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Result<Self, HubError> {
        let workspace_root = workspace_root.into();
        config::validate_workspace_root(&workspace_root)?;

        let mut hub = CentralHub {
            repos: HashMap::new(),
            validation_errors: DashMap::new(),
            workspace_root,
        };
        for cached in StateCache::load(&hub.workspace_root).repos {
            hub.repos.insert(
                cached.repo_id.clone(),
                RepoEntry {
                    name: repo_name(&cached.path),
                    path: cached.path,
                    packages: cached.packages,
                },
            );
        }
        Ok(hub)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Index the packages under `repo_path` and add the repo to the
    /// registry. Registering the same path again re-discovers.
    pub fn register_repo(&mut self, repo_path: &Path) -> Result<RepoSummary, HubError> {
        if !repo_path.is_dir() {
            return Err(HubError::Input(format!(
                "repo path {} is not a directory",
                repo_path.display()
            )));
        }
        let repo_path = repo_path.canonicalize()?;
        let name = repo_name(&repo_path);
        let repo_id = self.repo_id_for(&repo_path, &name);

        let packages = discovery::discover_packages(&repo_path);
        info!(
            "registered repo {repo_id} with {} package(s)",
            packages.len()
        );
        let summary = RepoSummary {
            repo_id: repo_id.clone(),
            name: name.clone(),
            packages: packages.len(),
        };
        self.repos.insert(
            repo_id,
            RepoEntry {
                name,
                path: repo_path,
                packages,
            },
        );
        self.persist_state()?;
        Ok(summary)
    }

    /// Re-discover a repo's packages.
    pub fn refresh_repo(&mut self, repo_id: &str) -> Result<RefreshReport, HubError> {
        let entry = self
            .repos
            .get_mut(repo_id)
            .ok_or_else(|| HubError::Input(format!("unknown repo {repo_id}")))?;

        let mut errors = Vec::new();
        if !entry.path.is_dir() {
            errors.push(format!("repo path {} no longer exists", entry.path.display()));
            entry.packages.clear();
        } else {
            entry.packages = discovery::discover_packages(&entry.path);
        }
        let packages_updated = entry.packages.len();
        self.persist_state()?;
        Ok(RefreshReport {
            packages_updated,
            errors,
        })
    }

    pub fn list_repos(&self) -> Vec<RepoSummary> {
        let mut summaries: Vec<RepoSummary> = self
            .repos
            .iter()
            .map(|(id, entry)| RepoSummary {
                repo_id: id.clone(),
                name: entry.name.clone(),
                packages: entry.packages.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.repo_id.cmp(&b.repo_id));
        summaries
    }

    /// Execute a read-only query over the seeds in scope.
    ///
    /// Packages whose seed cannot be read (schema mismatch, corrupt file)
    /// are skipped with a warning rather than failing the whole query;
    /// cross-package results are eventually consistent by design.
    pub fn query(&self, sql: &str, options: &QueryOptions) -> Result<QueryOutput, HubError> {
        let branch = options.branch.as_deref();
        let in_scope: Vec<&DiscoveredPackage> = match &options.packages {
            Some(filter) => {
                let mut selected = Vec::new();
                for name in filter {
                    let found = self
                        .all_packages()
                        .into_iter()
                        .find(|p| &p.name == name)
                        .ok_or_else(|| HubError::Input(format!("unknown package @{name}")))?;
                    selected.push(found);
                }
                selected
            }
            None => self.all_packages(),
        };

        let mut warnings = Vec::new();
        let mut loaded = Vec::new();
        for pkg in &in_scope {
            match load_package_rows(pkg, branch) {
                Ok(rows) => loaded.push(rows),
                Err(e) => {
                    warn!("package {} not queryable: {e}", pkg.name);
                    warnings.push(format!("package {} skipped: {e}", pkg.name));
                }
            }
        }

        let known: Vec<String> = loaded.iter().map(|p| p.name.clone()).collect();
        let rewritten = rewrite_package_refs(sql, &known)?;
        let primary = options
            .packages
            .as_ref()
            .and_then(|p| p.first())
            .map(|s| s.as_str());

        let engine = QueryEngine::build(&loaded, primary)?;
        let mut output = engine.run(&rewritten)?;
        output.warnings.extend(warnings);
        Ok(output)
    }

    /// Store validation issues for later querying. The hub never acts on
    /// them.
    pub fn push_validation_errors(
        &self,
        repo_id: &str,
        package_path: &str,
        errors: Vec<serde_json::Value>,
    ) -> Result<(), HubError> {
        if !self.repos.contains_key(repo_id) {
            return Err(HubError::Input(format!("unknown repo {repo_id}")));
        }
        self.validation_errors
            .insert((repo_id.to_string(), package_path.to_string()), errors);
        Ok(())
    }

    pub fn validation_errors(&self, repo_id: &str, package_path: &str) -> Vec<serde_json::Value> {
        self.validation_errors
            .get(&(repo_id.to_string(), package_path.to_string()))
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn all_packages(&self) -> Vec<&DiscoveredPackage> {
        let mut packages: Vec<&DiscoveredPackage> = self
            .repos
            .values()
            .flat_map(|r| r.packages.iter())
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        packages
    }

    fn repo_id_for(&self, path: &Path, name: &str) -> String {
        // Re-registering the same path keeps its id stable.
        if let Some((id, _)) = self.repos.iter().find(|(_, e)| e.path == path) {
            return id.clone();
        }
        let mut candidate = name.to_string();
        let mut counter = 2;
        while self.repos.contains_key(&candidate) {
            candidate = format!("{name}-{counter}");
            counter += 1;
        }
        candidate
    }

    fn persist_state(&self) -> Result<(), HubError> {
        let cache = StateCache {
            repos: self
                .repos
                .iter()
                .map(|(id, entry)| CachedRepo {
                    repo_id: id.clone(),
                    path: entry.path.clone(),
                    packages: entry.packages.clone(),
                })
                .collect(),
        };
        cache.save(&self.workspace_root)
    }
}

fn repo_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo")
        .to_string()
}

/// Load a package's three relations with the branch overlay applied.
fn load_package_rows(
    pkg: &DiscoveredPackage,
    branch: Option<&str>,
) -> Result<PackageRows, HubError> {
    let reader = SeedReader::new(&pkg.root);
    let nodes: Vec<Node> = reader.read(branch)?;
    let edges: Vec<Edge> = reader.read(branch)?;
    let external_refs: Vec<ExternalRef> = reader.read(branch)?;
    Ok(PackageRows {
        name: pkg.name.clone(),
        nodes,
        edges,
        external_refs,
    })
}
