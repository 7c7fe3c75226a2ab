//! Configuration for the dispatch pipeline.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Queue depth that forces an immediate flush.
pub const DEFAULT_BULK_UPLOAD_LIMIT: usize = 40;

/// Delay before a scheduled flush, in milliseconds (one minute).
pub const DEFAULT_FLUSH_INTERVAL_MS: i64 = 60 * 1000;

/// Age after which queued records are discarded at worker startup (five days).
pub const DEFAULT_DATA_EXPIRATION_MS: u64 = 1000 * 60 * 60 * 24 * 5;

/// Default collection endpoint (can be overridden at compile time via BEACON_EVENTS_ENDPOINT).
pub const DEFAULT_EVENTS_ENDPOINT: &str = match option_env!("BEACON_EVENTS_ENDPOINT") {
    Some(url) => url,
    None => "https://tracker.beacon.dev/v1/track",
};

/// Default per-request timeout for the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Queue depth at which the worker flushes without waiting for the timer.
    #[serde(default = "default_bulk_upload_limit")]
    pub bulk_upload_limit: usize,
    /// Delay before a scheduled flush. Negative disables automatic flushing.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: i64,
    /// Records older than this are pruned when the worker starts.
    #[serde(default = "default_data_expiration_ms")]
    pub data_expiration_ms: u64,
    /// Primary collection endpoint.
    #[serde(default = "default_events_endpoint")]
    pub events_endpoint: String,
    /// Endpoints tried in order when the primary fails with an I/O error.
    #[serde(default)]
    pub fallback_endpoints: Vec<String>,
    /// Request timeout for a single delivery attempt.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Ask the collector for verbose responses.
    #[serde(default)]
    pub verbose: bool,
    /// `host:port` reachable whenever the device has a network, checked
    /// before each flush. Never a collector. Unset means always online.
    #[serde(default)]
    pub connectivity_check: Option<String>,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bulk_upload_limit() -> usize {
    DEFAULT_BULK_UPLOAD_LIMIT
}

fn default_flush_interval_ms() -> i64 {
    DEFAULT_FLUSH_INTERVAL_MS
}

fn default_data_expiration_ms() -> u64 {
    DEFAULT_DATA_EXPIRATION_MS
}

fn default_events_endpoint() -> String {
    DEFAULT_EVENTS_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bulk_upload_limit: DEFAULT_BULK_UPLOAD_LIMIT,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            data_expiration_ms: DEFAULT_DATA_EXPIRATION_MS,
            events_endpoint: DEFAULT_EVENTS_ENDPOINT.to_string(),
            fallback_endpoints: Vec::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            verbose: false,
            connectivity_check: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the config file if present, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `BEACON_*` overrides from the given lookup. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(value) = lookup("BEACON_BULK_UPLOAD_LIMIT").and_then(|v| v.parse().ok()) {
            self.bulk_upload_limit = value;
        }
        if let Some(value) = lookup("BEACON_FLUSH_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.flush_interval_ms = value;
        }
        if let Some(value) = lookup("BEACON_DATA_EXPIRATION_MS").and_then(|v| v.parse().ok()) {
            self.data_expiration_ms = value;
        }
        if let Some(value) = lookup("BEACON_EVENTS_ENDPOINT") {
            self.events_endpoint = value;
        }
        if let Some(value) = lookup("BEACON_VERBOSE") {
            self.verbose = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(value) = lookup("BEACON_CONNECTIVITY_CHECK") {
            self.connectivity_check = Some(value);
        }
        if let Some(value) = lookup("BEACON_LOG_LEVEL") {
            self.log_level = value;
        }
    }

    /// Reject configurations the worker cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.bulk_upload_limit == 0 {
            return Err(CoreError::Config(
                "bulk_upload_limit must be at least 1".to_string(),
            ));
        }
        if self.events_endpoint.trim().is_empty() {
            return Err(CoreError::Config("events_endpoint is empty".to_string()));
        }
        Ok(())
    }

    /// Delay before a scheduled flush, or `None` when automatic flushing is disabled.
    pub fn flush_interval(&self) -> Option<Duration> {
        u64::try_from(self.flush_interval_ms)
            .ok()
            .map(Duration::from_millis)
    }

    /// Maximum age of a queued record.
    pub fn data_expiration(&self) -> Duration {
        Duration::from_millis(self.data_expiration_ms)
    }

    /// Request timeout for the HTTP transport.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Candidate endpoints in delivery order: the primary first, then fallbacks.
    pub fn endpoints(&self) -> Vec<String> {
        std::iter::once(self.events_endpoint.clone())
            .chain(self.fallback_endpoints.iter().cloned())
            .collect()
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
