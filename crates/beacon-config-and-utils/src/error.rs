//! Errors raised while loading configuration and preparing directories.

use thiserror::Error;

/// Failure to produce a usable [`Config`](crate::Config) or [`Paths`](crate::Paths).
#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting the dispatcher cannot run with.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading or writing the config file or a data directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON.
    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to put `~/.beacon` in.
    #[error("cannot resolve path: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
