//! Errors returned by the run store.

use std::path::PathBuf;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored report could not be encoded or decoded.
    #[error("report json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The database file's directory could not be created.
    #[error("cannot create database directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row holds values no run record can have.
    #[error("run {run_id} is corrupt: {reason}")]
    CorruptRun { run_id: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The blocking task running a query was cancelled or panicked, or the
    /// connection lock was poisoned.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
