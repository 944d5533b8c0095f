//! Content-hash rename detection
//!
//! Sits between the watcher and the update manager, fusing `unlink` + `add`
//! pairs whose content hashes match into a single rename. Hash equality is
//! required, so no false renames are possible; without pre-registered
//! delete hashes the detector degrades to pass-through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use devac_core::compute_content_hash;
use tracing::debug;

use crate::watcher::{EventBatch, WatchEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameConfidence {
    /// Byte-identical content.
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameInfo {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub content_hash: String,
    pub confidence: RenameConfidence,
}

/// A primitive change after rename fusion.
#[derive(Debug, Clone, PartialEq)]
pub enum FileChange {
    Add(PathBuf),
    Change(PathBuf),
    Unlink(PathBuf),
    Rename(RenameInfo),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Add(p) | FileChange::Change(p) | FileChange::Unlink(p) => p,
            FileChange::Rename(info) => &info.new_path,
        }
    }
}

struct PendingDelete {
    path: PathBuf,
    registered_at: Instant,
}

pub struct RenameDetector {
    /// content hash → delete registered before the file disappeared.
    pending: HashMap<String, PendingDelete>,
    timeout: Duration,
}

impl RenameDetector {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(1000))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        RenameDetector {
            pending: HashMap::new(),
            timeout,
        }
    }

    /// Record a file's content before it is unlinked, so a matching `add`
    /// within the timeout window can be fused into a rename.
    pub fn register_pending_delete(&mut self, path: impl Into<PathBuf>, content: &[u8]) {
        let hash = compute_content_hash(content);
        self.pending.insert(
            hash,
            PendingDelete {
                path: path.into(),
                registered_at: Instant::now(),
            },
        );
    }

    /// Fuse renames out of a batch; all other primitives pass through in
    /// order.
    pub fn process_batch(&mut self, batch: &EventBatch) -> Vec<FileChange> {
        self.expire();

        // First pass: pair adds against pending deletes.
        let mut renames: Vec<RenameInfo> = Vec::new();
        let mut consumed_old_paths: Vec<PathBuf> = Vec::new();
        let mut consumed_adds: Vec<PathBuf> = Vec::new();
        for event in &batch.events {
            if event.kind != WatchEventKind::Add {
                continue;
            }
            let Ok(content) = std::fs::read(&event.path) else {
                continue;
            };
            let hash = compute_content_hash(&content);
            if let Some(pending) = self.pending.remove(&hash) {
                debug!(
                    "rename detected: {} -> {}",
                    pending.path.display(),
                    event.path.display()
                );
                consumed_old_paths.push(pending.path.clone());
                consumed_adds.push(event.path.clone());
                renames.push(RenameInfo {
                    old_path: pending.path,
                    new_path: event.path.clone(),
                    content_hash: hash,
                    confidence: RenameConfidence::High,
                });
            }
        }

        // Second pass: emit everything not consumed by a rename.
        let mut out = Vec::with_capacity(batch.events.len());
        for event in &batch.events {
            match event.kind {
                WatchEventKind::Add => {
                    if let Some(pos) = consumed_adds.iter().position(|p| p == &event.path) {
                        consumed_adds.remove(pos);
                        continue;
                    }
                    out.push(FileChange::Add(event.path.clone()));
                }
                WatchEventKind::Change => out.push(FileChange::Change(event.path.clone())),
                WatchEventKind::Unlink => {
                    if let Some(pos) =
                        consumed_old_paths.iter().position(|p| p == &event.path)
                    {
                        consumed_old_paths.remove(pos);
                        continue;
                    }
                    out.push(FileChange::Unlink(event.path.clone()));
                }
            }
        }
        out.extend(renames.into_iter().map(FileChange::Rename));
        out
    }

    /// Number of deletes currently awaiting a matching add.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn expire(&mut self) {
        let timeout = self.timeout;
        self.pending
            .retain(|_, pending| pending.registered_at.elapsed() < timeout);
    }
}

impl Default for RenameDetector {
    fn default() -> Self {
        Self::new()
    }
}
