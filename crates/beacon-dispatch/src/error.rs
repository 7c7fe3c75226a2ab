//! Dispatch error types.
//!
//! None of these reach callers of [`crate::Dispatcher::track`]; they surface
//! only from construction and inside the worker.

use beacon_config_and_utils::CoreError;
use beacon_store::StoreError;
use beacon_transport::TransportError;
use thiserror::Error;

/// Dispatch error type.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Configuration or path error
    #[error("Config error: {0}")]
    Config(#[from] CoreError),

    /// Event store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Transport construction error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO error (thread spawn, identity file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using DispatchError.
pub type DispatchResult<T> = Result<T, DispatchError>;
