//! On-disk layout of a package seed
//!
//! ```text
//! <pkg>/.devac/seed/
//!   meta.json
//!   base/{nodes,edges,external_refs}.col
//!   branch/<name>/{nodes,edges,external_refs}.col
//!   .devac.lock
//!   .tmp/
//! ```

use std::path::{Path, PathBuf};

use devac_core::BASE_BRANCH;

/// Seed subtree relative to a package root.
pub const SEED_DIR: &str = ".devac/seed";
pub const META_FILE: &str = "meta.json";
pub const LOCK_FILE: &str = ".devac.lock";
pub const TMP_DIR: &str = ".tmp";
pub const BASE_DIR: &str = "base";
pub const BRANCH_DIR: &str = "branch";

/// Schema version written to `meta.json`. Breaking changes bump the major.
pub const SCHEMA_VERSION: &str = "1.0.0";

pub fn seed_dir(package_root: &Path) -> PathBuf {
    package_root.join(SEED_DIR)
}

pub fn meta_path(seed_dir: &Path) -> PathBuf {
    seed_dir.join(META_FILE)
}

pub fn lock_path(seed_dir: &Path) -> PathBuf {
    seed_dir.join(LOCK_FILE)
}

pub fn tmp_dir(seed_dir: &Path) -> PathBuf {
    seed_dir.join(TMP_DIR)
}

/// Directory of a branch partition; `base` lives at the top level.
pub fn partition_dir(seed_dir: &Path, branch: &str) -> PathBuf {
    if branch == BASE_BRANCH {
        seed_dir.join(BASE_DIR)
    } else {
        seed_dir.join(BRANCH_DIR).join(branch)
    }
}

/// Whether `package_root` holds an initialized seed (its base partition
/// directory exists).
pub fn has_seed(package_root: &Path) -> bool {
    seed_dir(package_root).join(BASE_DIR).is_dir()
}

/// Major component of a semver-ish version string.
pub fn major_of(version: &str) -> Option<&str> {
    version.split('.').next().filter(|s| !s.is_empty())
}

/// True when `found` can be read by a reader expecting `expected`.
pub fn schema_compatible(found: &str, expected: &str) -> bool {
    match (major_of(found), major_of(expected)) {
        (Some(f), Some(e)) => f == e,
        _ => false,
    }
}
