//! Transport error types.

use thiserror::Error;

/// Transport error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, timeout or non-success status. Worth retrying later.
    #[error("I/O error: {0}")]
    Io(String),

    /// The endpoint URL cannot be used.
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// The request or response exceeded what can be held in memory.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
}

impl TransportError {
    /// Whether the same batch may succeed on a later attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::MalformedUrl(err.to_string())
        } else {
            Self::Io(err.to_string())
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        Self::MalformedUrl(err.to_string())
    }
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
