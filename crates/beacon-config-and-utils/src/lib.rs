//! Core types, configuration, and utilities for the Beacon telemetry pipeline.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_BULK_UPLOAD_LIMIT, DEFAULT_DATA_EXPIRATION_MS, DEFAULT_EVENTS_ENDPOINT,
    DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_LOG_LEVEL, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
