//! Package discovery under registered repo roots
//!
//! A package is any directory whose `.devac/seed/base/` exists. The walk
//! skips the conventional noise directories and never descends into a
//! package's own `.devac` tree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

/// Directories never entered during discovery.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".devac",
    "dist",
    "build",
    "coverage",
    "__pycache__",
    ".venv",
    "venv",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredPackage {
    /// Short name, from `package.json` or the directory basename.
    pub name: String,
    pub root: PathBuf,
}

/// Recursively enumerate every package under `root`.
pub fn discover_packages(root: &Path) -> Vec<DiscoveredPackage> {
    let mut packages = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| !is_excluded(e.path())) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        if devac_seed::has_seed(dir) {
            let name = package_name(dir);
            debug!("discovered package {name} at {}", dir.display());
            packages.push(DiscoveredPackage {
                name,
                root: dir.to_path_buf(),
            });
        }
    }
    packages
}

fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| EXCLUDED_DIRS.contains(&name))
        .unwrap_or(false)
}

/// Short name for a package directory: the `name` field of its
/// `package.json` with any scope segment stripped, falling back to the
/// directory basename.
pub fn package_name(dir: &Path) -> String {
    if let Ok(bytes) = std::fs::read(dir.join("package.json")) {
        if let Ok(manifest) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            if let Some(name) = manifest.get("name").and_then(|n| n.as_str()) {
                let short = name.rsplit('/').next().unwrap_or(name);
                if !short.is_empty() {
                    return short.to_string();
                }
            }
        }
    }
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("package")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_seed(dir: &Path) {
        std::fs::create_dir_all(dir.join(".devac/seed/base")).unwrap();
    }

    #[test]
    fn finds_nested_packages() {
        let ws = tempfile::tempdir().unwrap();
        init_seed(&ws.path().join("repo/pkg-a"));
        init_seed(&ws.path().join("repo/nested/pkg-b"));
        std::fs::create_dir_all(ws.path().join("repo/not-a-package/src")).unwrap();

        let mut found = discover_packages(ws.path());
        found.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "pkg-a");
        assert_eq!(found[1].name, "pkg-b");
    }

    #[test]
    fn skips_noise_directories() {
        let ws = tempfile::tempdir().unwrap();
        init_seed(&ws.path().join("node_modules/evil-pkg"));
        init_seed(&ws.path().join("dist/built-pkg"));
        init_seed(&ws.path().join("real-pkg"));

        let found = discover_packages(ws.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "real-pkg");
    }

    #[test]
    fn package_json_name_wins_with_scope_stripped() {
        let ws = tempfile::tempdir().unwrap();
        let dir = ws.path().join("pkg-dir");
        init_seed(&dir);
        std::fs::write(
            dir.join("package.json"),
            br#"{ "name": "@acme/widgets", "version": "1.0.0" }"#,
        )
        .unwrap();
        assert_eq!(package_name(&dir), "widgets");
    }

    #[test]
    fn basename_fallback_without_manifest() {
        let ws = tempfile::tempdir().unwrap();
        let dir = ws.path().join("plain-pkg");
        init_seed(&dir);
        assert_eq!(package_name(&dir), "plain-pkg");
    }
}
