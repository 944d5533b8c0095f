//! Hub error taxonomy

use devac_seed::SeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// Malformed query, unknown `@package`, invalid branch name. Surfaced to
    /// the caller; not retryable.
    #[error("invalid input: {0}")]
    Input(String),

    /// The hub directory may not live inside a git repository.
    #[error("invalid hub location: {0}")]
    HubLocation(String),

    /// Failure on the hub socket; callers fall back to the in-process hub.
    #[error("ipc failure: {0}")]
    Ipc(String),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
