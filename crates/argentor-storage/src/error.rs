//! Storage error taxonomy, converting into [`argentor_core::AgentorError`]
//! at the orchestrator boundary.

use thiserror::Error;

/// Errors raised by the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A `rusqlite` driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A migration could not be applied.
    #[error("migration {filename} failed: {reason}")]
    Migration {
        /// The migration file that failed.
        filename: String,
        /// The underlying reason.
        reason: String,
    },

    /// A row referenced by id does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// The kind of entity (e.g. "task_node").
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// A stored JSON column failed to (de)serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An id or enum column held a value that does not parse back into its
    /// Rust type.
    #[error("invalid stored value in {column}: {reason}")]
    InvalidValue {
        /// The column the bad value came from.
        column: &'static str,
        /// Why it failed to parse.
        reason: String,
    },
}

/// Convenience alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for argentor_core::AgentorError {
    fn from(err: StorageError) -> Self {
        argentor_core::AgentorError::Storage(err.to_string())
    }
}
