//! Update manager: parse → diff → write for one package
//!
//! Each add/change is hash-gated against the last-seen content hash so a
//! touch without a content change costs one hash, not a parse and a write.
//! The hash cache is in-memory only; it rebuilds naturally after a restart.
//! Batches run sequentially to preserve causal ordering; one file's failure
//! never aborts the rest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use devac_core::{LanguageParser, ParserContext, compute_content_hash};
use devac_parser::ParserRegistry;
use devac_seed::{SeedWriter, WriteOptions};
use tracing::{debug, info, warn};

use crate::rename::{FileChange, RenameInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Updated,
    Deleted,
    Renamed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: String,
    pub action: UpdateAction,
    pub skipped: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl FileOutcome {
    fn skipped(path: String) -> Self {
        FileOutcome {
            path,
            action: UpdateAction::Skipped,
            skipped: true,
            error: None,
            warnings: Vec::new(),
        }
    }

    fn failed(path: String, action: UpdateAction, error: String) -> Self {
        FileOutcome {
            path,
            action,
            skipped: false,
            error: Some(error),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<FileOutcome>,
}

pub struct UpdateManager {
    package_root: PathBuf,
    ctx: ParserContext,
    registry: Arc<ParserRegistry>,
    writer: SeedWriter,
    /// Last-seen content hash per package-relative path.
    hashes: HashMap<String, String>,
}

impl UpdateManager {
    pub fn new(package_root: impl AsRef<Path>, repo: &str, package: &str) -> Self {
        let package_root = package_root.as_ref().to_path_buf();
        UpdateManager {
            writer: SeedWriter::new(&package_root),
            registry: Arc::new(ParserRegistry::with_defaults()),
            ctx: ParserContext::new(repo, package),
            package_root,
            hashes: HashMap::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ParserRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn writer(&self) -> &SeedWriter {
        &self.writer
    }

    /// Package-relative forward-slashed form of an absolute path.
    fn rel_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.package_root).unwrap_or(path);
        devac_core::ids::normalize_path(&relative.to_string_lossy())
    }

    /// Add or change: hash-gate, parse, write.
    pub fn handle_change(&mut self, path: &Path) -> FileOutcome {
        let rel = self.rel_path(path);
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                return FileOutcome::failed(rel, UpdateAction::Updated, format!("read failed: {e}"));
            }
        };
        let hash = compute_content_hash(content.as_bytes());
        if self.hashes.get(&rel) == Some(&hash) {
            debug!("unchanged content, skipping {rel}");
            return FileOutcome::skipped(rel);
        }

        let Some(parser) = self.registry.for_path(path) else {
            return FileOutcome::skipped(rel);
        };
        let result = match parser.parse_content(&content, &rel, &self.ctx) {
            Ok(result) => result,
            Err(e) => {
                return FileOutcome::failed(rel, UpdateAction::Updated, format!("parse failed: {e}"));
            }
        };

        // A syntax error leaves the file's existing seed rows in place; the
        // warnings are surfaced, the write is skipped.
        if !result.warnings.is_empty() {
            warn!("parse of {rel} reported problems: {:?}", result.warnings);
            self.hashes.insert(rel.clone(), hash);
            return FileOutcome {
                path: rel,
                action: UpdateAction::Skipped,
                skipped: true,
                error: None,
                warnings: result.warnings,
            };
        }

        let warnings = result.warnings.clone();
        if let Err(e) = self
            .writer
            .update_file(std::slice::from_ref(&rel), &result, &WriteOptions::default())
        {
            return FileOutcome::failed(rel, UpdateAction::Updated, e.to_string());
        }
        self.hashes.insert(rel.clone(), hash);
        info!("updated seed rows for {rel}");
        FileOutcome {
            path: rel,
            action: UpdateAction::Updated,
            skipped: false,
            error: None,
            warnings,
        }
    }

    pub fn handle_unlink(&mut self, path: &Path) -> FileOutcome {
        let rel = self.rel_path(path);
        self.hashes.remove(&rel);
        match self
            .writer
            .delete_file(std::slice::from_ref(&rel), &WriteOptions::default())
        {
            Ok(_) => FileOutcome {
                path: rel,
                action: UpdateAction::Deleted,
                skipped: false,
                error: None,
                warnings: Vec::new(),
            },
            Err(e) => FileOutcome::failed(rel, UpdateAction::Deleted, e.to_string()),
        }
    }

    /// Old rows are removed before the new path is written, so no window
    /// exists in which both IDs are visible.
    pub fn handle_rename(&mut self, info: &RenameInfo) -> FileOutcome {
        let old_rel = self.rel_path(&info.old_path);
        let new_rel = self.rel_path(&info.new_path);
        self.hashes.remove(&old_rel);

        if let Err(e) = self
            .writer
            .delete_file(std::slice::from_ref(&old_rel), &WriteOptions::default())
        {
            return FileOutcome::failed(new_rel, UpdateAction::Renamed, e.to_string());
        }
        let mut outcome = self.handle_change(&info.new_path);
        if outcome.error.is_none() && !outcome.skipped {
            outcome.action = UpdateAction::Renamed;
        }
        outcome
    }

    pub fn process_change(&mut self, change: &FileChange) -> FileOutcome {
        match change {
            FileChange::Add(path) | FileChange::Change(path) => self.handle_change(path),
            FileChange::Unlink(path) => self.handle_unlink(path),
            FileChange::Rename(info) => self.handle_rename(info),
        }
    }

    /// Sequential, order-preserving batch processing with per-file outcomes.
    pub fn process_batch(&mut self, changes: &[FileChange]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for change in changes {
            let outcome = self.process_change(change);
            if outcome.error.is_some() {
                summary.failed += 1;
            } else if outcome.skipped {
                summary.skipped += 1;
            } else {
                summary.processed += 1;
            }
            summary.outcomes.push(outcome);
        }
        summary
    }
}
