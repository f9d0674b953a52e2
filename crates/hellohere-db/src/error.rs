//! Store error types.
//!
//! - `NotFound`: the addressed row does not exist
//! - `Conflict`: a uniqueness constraint rejected the write
//! - `Backend`: the underlying storage system failed

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Row not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Write rejected by a uniqueness constraint
    ///
    /// Raised when a second non-terminal room is inserted for a pair that
    /// already has one.
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// Backend failure (SQLite, lock poisoning, blocking task join)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("serialization: {}", err))
    }
}
