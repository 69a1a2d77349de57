//! Error types for the memory crate.

use thiserror::Error;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem operation failed.
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored document exists but does not have the expected shape.
    #[error("Malformed document '{key}': {reason}")]
    MalformedDocument { key: String, reason: String },

    /// Records a replacement was computed from have changed since.
    #[error("Snapshot is stale: {missing} records no longer exist")]
    StaleSnapshot { missing: usize },

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl MemoryError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        MemoryError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
