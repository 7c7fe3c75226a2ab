//! Store error types.

use thiserror::Error;

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error that did not trigger a reset (reads, counts)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error while managing the database file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while assembling a batch
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A write failed; the store discarded its data and starts over empty
    #[error("Store corrupted and reset: {source}")]
    Corrupted {
        #[source]
        source: rusqlite::Error,
    },

    /// The store could not be recreated after a failure
    #[error("Failed to reset store: {0}")]
    Reset(String),
}

impl StoreError {
    /// Whether the store is still usable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Reset(_))
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
