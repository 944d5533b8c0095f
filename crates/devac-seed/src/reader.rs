//! Seed reader with branch-over-base overlay
//!
//! Readers never take the lock: writer atomicity (temp + rename) guarantees
//! each relation file is either the previous or the new committed snapshot.
//! Missing relation files contribute zero rows; a missing seed directory
//! means "no package".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use devac_core::{BASE_BRANCH, Edge, ExternalRef, Node};

use crate::columnar;
use crate::error::SeedError;
use crate::layout::{self, SCHEMA_VERSION};
use crate::schema::Relation;

/// Load one relation from a partition directory. Missing file → empty.
pub fn load_partition<R: Relation>(partition: &Path) -> Result<Vec<R>, SeedError> {
    let path = partition.join(R::FILE);
    match columnar::read_file(&path, &R::schema(), None)? {
        Some(table) => R::from_table(&table),
        None => Ok(Vec::new()),
    }
}

/// Branch rows (including tombstones) shadow base rows by natural key;
/// tombstoned rows disappear from the view.
pub fn overlay<R: Relation>(base: Vec<R>, branch_rows: Vec<R>) -> Vec<R> {
    if branch_rows.is_empty() {
        return base;
    }
    let shadowed: HashMap<String, ()> = branch_rows
        .iter()
        .map(|r| (r.overlay_key(), ()))
        .collect();
    let mut out: Vec<R> = base
        .into_iter()
        .filter(|r| !shadowed.contains_key(&r.overlay_key()))
        .collect();
    out.extend(branch_rows.into_iter().filter(|r| !r.is_deleted()));
    out
}

pub struct SeedReader {
    seed_dir: PathBuf,
}

impl SeedReader {
    pub fn new(package_root: &Path) -> Self {
        SeedReader {
            seed_dir: layout::seed_dir(package_root),
        }
    }

    /// Open a seed directory directly (already `<pkg>/.devac/seed`).
    pub fn at_seed_dir(seed_dir: impl Into<PathBuf>) -> Self {
        SeedReader {
            seed_dir: seed_dir.into(),
        }
    }

    pub fn seed_dir(&self) -> &Path {
        &self.seed_dir
    }

    /// Whether a base partition has ever been committed.
    pub fn exists(&self) -> bool {
        self.seed_dir.join(layout::BASE_DIR).is_dir()
    }

    /// Readers refuse partitions written under a schema they do not
    /// understand. A missing `meta.json` is treated as an empty seed.
    pub fn check_schema(&self) -> Result<(), SeedError> {
        let meta = layout::meta_path(&self.seed_dir);
        let bytes = match std::fs::read(&meta) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|_| SeedError::Corrupt {
                path: meta.clone(),
                reason: "undecodable meta.json".to_string(),
            })?;
        let found = value
            .get("schemaVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if layout::schema_compatible(found, SCHEMA_VERSION) {
            Ok(())
        } else {
            Err(SeedError::SchemaIncompatible {
                found: found.to_string(),
                expected: SCHEMA_VERSION.to_string(),
            })
        }
    }

    /// One relation as seen from `branch` (base when `None`), with the
    /// branch overlay applied.
    pub fn read<R: Relation>(&self, branch: Option<&str>) -> Result<Vec<R>, SeedError> {
        self.check_schema()?;
        let base = load_partition::<R>(&layout::partition_dir(&self.seed_dir, BASE_BRANCH))?;
        match branch {
            Some(name) if name != BASE_BRANCH => {
                let branch_rows =
                    load_partition::<R>(&layout::partition_dir(&self.seed_dir, name))?;
                Ok(overlay(base, branch_rows))
            }
            _ => Ok(base),
        }
    }

    pub fn nodes(&self, branch: Option<&str>) -> Result<Vec<Node>, SeedError> {
        self.read(branch)
    }

    pub fn edges(&self, branch: Option<&str>) -> Result<Vec<Edge>, SeedError> {
        self.read(branch)
    }

    pub fn external_refs(&self, branch: Option<&str>) -> Result<Vec<ExternalRef>, SeedError> {
        self.read(branch)
    }
}
