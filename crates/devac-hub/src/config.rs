//! Workspace configuration and hub location validation
//!
//! Persisted state lives under `<workspace>/.devac/`: `workspace.json` for
//! configuration and `state.json` as a discovery cache. The hub must sit at
//! the workspace root — the parent of the git repos — never inside one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveredPackage;
use crate::error::HubError;

pub const DEVAC_DIR: &str = ".devac";
pub const WORKSPACE_FILE: &str = "workspace.json";
pub const STATE_FILE: &str = "state.json";
pub const SOCKET_FILE: &str = "mcp.sock";

pub fn devac_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(DEVAC_DIR)
}

pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    devac_dir(workspace_root).join(WORKSPACE_FILE)
}

pub fn state_path(workspace_root: &Path) -> PathBuf {
    devac_dir(workspace_root).join(STATE_FILE)
}

pub fn socket_path(workspace_root: &Path) -> PathBuf {
    devac_dir(workspace_root).join(SOCKET_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    pub auto_refresh: bool,
    pub refresh_debounce_ms: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        HubSettings {
            auto_refresh: true,
            refresh_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatcherSettings {
    pub auto_start: bool,
    pub ignore_patterns: Vec<String>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        WatcherSettings {
            auto_start: false,
            ignore_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceConfig {
    pub version: u32,
    pub exclude: Vec<String>,
    pub hub: HubSettings,
    pub watcher: WatcherSettings,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            version: 1,
            exclude: Vec::new(),
            hub: HubSettings::default(),
            watcher: WatcherSettings::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Load `workspace.json`, falling back to defaults when absent.
    pub fn load(workspace_root: &Path) -> Result<Self, HubError> {
        let path = workspace_config_path(workspace_root);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| HubError::Input(format!("invalid {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, workspace_root: &Path) -> Result<(), HubError> {
        let dir = devac_dir(workspace_root);
        std::fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| HubError::Internal(format!("config encode: {e}")))?;
        std::fs::write(workspace_config_path(workspace_root), bytes)?;
        Ok(())
    }
}

/// Cached discovery results, rebuilt on register/refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateCache {
    pub repos: Vec<CachedRepo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRepo {
    pub repo_id: String,
    pub path: PathBuf,
    pub packages: Vec<DiscoveredPackage>,
}

impl StateCache {
    pub fn load(workspace_root: &Path) -> Self {
        std::fs::read(state_path(workspace_root))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, workspace_root: &Path) -> Result<(), HubError> {
        std::fs::create_dir_all(devac_dir(workspace_root))?;
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| HubError::Internal(format!("state encode: {e}")))?;
        std::fs::write(state_path(workspace_root), bytes)?;
        Ok(())
    }
}

/// Refuse to operate when the workspace root is, or sits inside, a git
/// repository. The error names the closest valid root.
pub fn validate_workspace_root(workspace_root: &Path) -> Result<(), HubError> {
    let mut current = Some(workspace_root);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            let suggestion = dir
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "/".to_string());
            return Err(HubError::HubLocation(format!(
                "{} is inside the git repository at {}; place the workspace at {suggestion} instead",
                workspace_root.display(),
                dir.display()
            )));
        }
        current = dir.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips() {
        let ws = tempfile::tempdir().unwrap();
        let mut config = WorkspaceConfig::default();
        config.exclude.push("vendor".to_string());
        config.hub.refresh_debounce_ms = 250;
        config.save(ws.path()).unwrap();

        let loaded = WorkspaceConfig::load(ws.path()).unwrap();
        assert_eq!(loaded.exclude, vec!["vendor".to_string()]);
        assert_eq!(loaded.hub.refresh_debounce_ms, 250);
        assert!(loaded.hub.auto_refresh);
    }

    #[test]
    fn missing_config_is_defaulted() {
        let ws = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::load(ws.path()).unwrap();
        assert_eq!(config.version, 1);
    }

    #[test]
    fn workspace_inside_git_repo_is_rejected() {
        let ws = tempfile::tempdir().unwrap();
        let repo = ws.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        let nested = repo.join("packages/app");
        std::fs::create_dir_all(&nested).unwrap();

        assert!(validate_workspace_root(ws.path()).is_ok());
        let err = validate_workspace_root(&nested).unwrap_err();
        assert!(matches!(err, HubError::HubLocation(_)));
        assert!(err.to_string().contains("git repository"));
    }
}
