//! Seed storage error taxonomy

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    /// The advisory lock could not be acquired within the timeout.
    /// Callers may retry with backoff.
    #[error("timed out waiting for seed lock at {path}")]
    LockTimeout { path: PathBuf },

    /// A mutating operation failed; any temp files were unlinked.
    #[error("seed write failed: {reason}")]
    WriteFailed { reason: String },

    /// `meta.json` or a relation file carries a schema this build does not
    /// understand. Requires a migration or a clean rebuild.
    #[error("incompatible seed schema: found {found}, expected {expected}")]
    SchemaIncompatible { found: String, expected: String },

    /// A relation file failed its integrity checks.
    #[error("corrupt seed file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SeedError {
    pub fn write_failed(reason: impl Into<String>) -> Self {
        SeedError::WriteFailed {
            reason: reason.into(),
        }
    }
}
