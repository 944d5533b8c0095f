//! Atomic seed writer
//!
//! Commits parse results to the package seed under the advisory lock. Base
//! writes rewrite the base partition with per-file replacement; branch
//! writes touch only the branch's delta partition, using tombstones to
//! shadow base rows.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devac_core::{BASE_BRANCH, Edge, ExternalRef, Node, ParseResult, now_timestamp};
use tracing::{debug, info};

use crate::atomic;
use crate::error::SeedError;
use crate::layout::{self, SCHEMA_VERSION};
use crate::lock::{LockOptions, SeedLock};
use crate::reader::load_partition;
use crate::schema::Relation;

/// Crashed-writer temps older than this are reaped before a write.
const TEMP_REAP_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Target branch; `None` means base.
    pub branch: Option<String>,
}

impl WriteOptions {
    pub fn branch(name: impl Into<String>) -> Self {
        WriteOptions {
            branch: Some(name.into()),
        }
    }

    fn branch_name(&self) -> &str {
        self.branch.as_deref().unwrap_or(BASE_BRANCH)
    }
}

#[derive(Debug, Clone)]
pub struct WriteReport {
    pub branch: String,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub external_refs_written: usize,
}

#[derive(Debug, Clone)]
pub struct DeleteReport {
    pub branch: String,
    /// Rows dropped on base, or tombstones emitted on a branch.
    pub nodes_affected: usize,
    pub edges_affected: usize,
    pub external_refs_affected: usize,
}

pub struct SeedWriter {
    seed_dir: PathBuf,
    lock_options: LockOptions,
}

impl SeedWriter {
    pub fn new(package_root: &Path) -> Self {
        SeedWriter {
            seed_dir: layout::seed_dir(package_root),
            lock_options: LockOptions::default(),
        }
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    pub fn seed_dir(&self) -> &Path {
        &self.seed_dir
    }

    /// Commit a single-file parse snapshot.
    pub fn write_file(
        &self,
        result: &ParseResult,
        options: &WriteOptions,
    ) -> Result<WriteReport, SeedError> {
        self.update_file(std::slice::from_ref(&result.file_path), result, options)
    }

    /// Replace all rows keyed by `changed_paths` with the rows of `result`.
    ///
    /// On base this merges against the existing base partition; on any other
    /// branch only that branch's delta partition is rewritten.
    pub fn update_file(
        &self,
        changed_paths: &[String],
        result: &ParseResult,
        options: &WriteOptions,
    ) -> Result<WriteReport, SeedError> {
        let branch = options.branch_name();
        let _lock = SeedLock::acquire(&self.seed_dir, &self.lock_options)?;
        atomic::reap_stale_temps(&self.seed_dir, TEMP_REAP_AGE);
        self.check_schema()?;

        let partition = layout::partition_dir(&self.seed_dir, branch);
        let changed: HashSet<&str> = changed_paths.iter().map(|p| p.as_str()).collect();
        let ts = now_timestamp();

        let nodes = merge_rows(&partition, &changed, result.nodes.clone(), branch, &ts)?;
        let edges = merge_rows(&partition, &changed, result.edges.clone(), branch, &ts)?;
        let refs = merge_rows(&partition, &changed, result.external_refs.clone(), branch, &ts)?;

        self.commit_partition(&partition, &nodes, &edges, &refs)?;
        info!(
            "seed update: {} nodes, {} edges, {} refs on {branch} ({})",
            nodes.len(),
            edges.len(),
            refs.len(),
            self.seed_dir.display()
        );
        Ok(WriteReport {
            branch: branch.to_string(),
            nodes_written: nodes.len(),
            edges_written: edges.len(),
            external_refs_written: refs.len(),
        })
    }

    /// Remove every row keyed by `paths`.
    ///
    /// Base deletes rewrite the base partition without the rows; branch
    /// deletes mirror each matching base row as an `is_deleted` tombstone in
    /// the branch partition.
    pub fn delete_file(
        &self,
        paths: &[String],
        options: &WriteOptions,
    ) -> Result<DeleteReport, SeedError> {
        let branch = options.branch_name();
        let _lock = SeedLock::acquire(&self.seed_dir, &self.lock_options)?;
        atomic::reap_stale_temps(&self.seed_dir, TEMP_REAP_AGE);
        self.check_schema()?;

        let doomed: HashSet<&str> = paths.iter().map(|p| p.as_str()).collect();
        let ts = now_timestamp();

        if branch == BASE_BRANCH {
            let partition = layout::partition_dir(&self.seed_dir, BASE_BRANCH);
            let (nodes, n_removed) = retain_rows::<Node>(&partition, &doomed)?;
            let (edges, e_removed) = retain_rows::<Edge>(&partition, &doomed)?;
            let (refs, r_removed) = retain_rows::<ExternalRef>(&partition, &doomed)?;
            self.commit_partition(&partition, &nodes, &edges, &refs)?;
            debug!(
                "seed delete on base: -{n_removed} nodes, -{e_removed} edges, -{r_removed} refs"
            );
            return Ok(DeleteReport {
                branch: branch.to_string(),
                nodes_affected: n_removed,
                edges_affected: e_removed,
                external_refs_affected: r_removed,
            });
        }

        // Branch delete: tombstone every matching base row.
        let base = layout::partition_dir(&self.seed_dir, BASE_BRANCH);
        let partition = layout::partition_dir(&self.seed_dir, branch);
        let (nodes, n_tombs) = tombstone_rows::<Node>(&base, &partition, &doomed, branch, &ts)?;
        let (edges, e_tombs) = tombstone_rows::<Edge>(&base, &partition, &doomed, branch, &ts)?;
        let (refs, r_tombs) =
            tombstone_rows::<ExternalRef>(&base, &partition, &doomed, branch, &ts)?;
        self.commit_partition(&partition, &nodes, &edges, &refs)?;
        Ok(DeleteReport {
            branch: branch.to_string(),
            nodes_affected: n_tombs,
            edges_affected: e_tombs,
            external_refs_affected: r_tombs,
        })
    }

    /// Refuse to merge into a partition written by an incompatible schema.
    fn check_schema(&self) -> Result<(), SeedError> {
        let meta = layout::meta_path(&self.seed_dir);
        let bytes = match std::fs::read(&meta) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|_| {
            SeedError::Corrupt {
                path: meta.clone(),
                reason: "undecodable meta.json".to_string(),
            }
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

    /// Stage all three relations, rename them into place, then refresh
    /// `meta.json`. Stage failures unlink every temp already written.
    fn commit_partition(
        &self,
        partition: &Path,
        nodes: &[Node],
        edges: &[Edge],
        refs: &[ExternalRef],
    ) -> Result<(), SeedError> {
        let encoded = [
            (Node::FILE, crate::columnar::encode(Node::NAME, &Node::to_columns(nodes))?),
            (Edge::FILE, crate::columnar::encode(Edge::NAME, &Edge::to_columns(edges))?),
            (
                ExternalRef::FILE,
                crate::columnar::encode(ExternalRef::NAME, &ExternalRef::to_columns(refs))?,
            ),
        ];

        let mut staged = Vec::with_capacity(encoded.len());
        for (file, bytes) in &encoded {
            match atomic::stage(&self.seed_dir, &partition.join(file), bytes) {
                Ok(s) => staged.push(s),
                Err(e) => {
                    atomic::discard(&staged);
                    return Err(e);
                }
            }
        }
        atomic::commit(staged)?;

        let meta = serde_json::json!({ "schemaVersion": SCHEMA_VERSION });
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| SeedError::write_failed(format!("meta encode: {e}")))?;
        atomic::write_atomic(&self.seed_dir, &layout::meta_path(&self.seed_dir), &meta_bytes)
    }
}

/// Existing partition rows minus `changed`, plus the new rows stamped for
/// `branch`. Per-file atomic replacement without losing unrelated rows.
fn merge_rows<R: Relation>(
    partition: &Path,
    changed: &HashSet<&str>,
    new_rows: Vec<R>,
    branch: &str,
    ts: &str,
) -> Result<Vec<R>, SeedError> {
    let mut rows: Vec<R> = load_partition(partition)?
        .into_iter()
        .filter(|r: &R| !changed.contains(r.file_path_of()))
        .collect();
    for mut row in new_rows {
        row.set_branch(branch);
        row.set_updated_at(ts);
        rows.push(row);
    }
    Ok(rows)
}

fn retain_rows<R: Relation>(
    partition: &Path,
    doomed: &HashSet<&str>,
) -> Result<(Vec<R>, usize), SeedError> {
    let rows: Vec<R> = load_partition(partition)?;
    let before = rows.len();
    let kept: Vec<R> = rows
        .into_iter()
        .filter(|r: &R| !doomed.contains(r.file_path_of()))
        .collect();
    let removed = before - kept.len();
    Ok((kept, removed))
}

/// Branch partition rows with fresh tombstones mirroring the doomed base
/// rows. Prior branch rows for the doomed paths are replaced.
fn tombstone_rows<R: Relation>(
    base: &Path,
    partition: &Path,
    doomed: &HashSet<&str>,
    branch: &str,
    ts: &str,
) -> Result<(Vec<R>, usize), SeedError> {
    let mut rows: Vec<R> = load_partition(partition)?
        .into_iter()
        .filter(|r: &R| !doomed.contains(r.file_path_of()))
        .collect();
    let mut tombstones = 0;
    for base_row in load_partition::<R>(base)? {
        if doomed.contains(base_row.file_path_of()) {
            let mut tomb = base_row.clone();
            tomb.mark_deleted();
            tomb.set_branch(branch);
            tomb.set_updated_at(ts);
            rows.push(tomb);
            tombstones += 1;
        }
    }
    Ok((rows, tombstones))
}
