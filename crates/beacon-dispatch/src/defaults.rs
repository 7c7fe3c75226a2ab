//! Default properties attached to every event.

use serde_json::{Map, Value};

/// Library name reported in `libName`.
pub const LIB_NAME: &str = "beacon-rust";

/// Supplies the lowest-precedence properties of every event.
///
/// Called on the worker thread once per enqueued event.
pub trait DefaultPropertiesProvider: Send {
    fn collect(&self) -> Map<String, Value>;
}

/// A fixed property map, mostly useful in tests.
impl DefaultPropertiesProvider for Map<String, Value> {
    fn collect(&self) -> Map<String, Value> {
        self.clone()
    }
}

/// Describes the library and the host it runs on.
#[derive(Debug, Clone, Default)]
pub struct SystemInformation {
    app_version: Option<String>,
}

impl SystemInformation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the embedding application's version as `appVersion`.
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }
}

impl DefaultPropertiesProvider for SystemInformation {
    fn collect(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("libName".to_string(), Value::from(LIB_NAME));
        props.insert(
            "libVersion".to_string(),
            Value::from(env!("CARGO_PKG_VERSION")),
        );
        props.insert("os".to_string(), Value::from(std::env::consts::OS));
        props.insert("arch".to_string(), Value::from(std::env::consts::ARCH));
        props.insert("osFamily".to_string(), Value::from(std::env::consts::FAMILY));
        if let Some(version) = &self.app_version {
            props.insert("appVersion".to_string(), Value::from(version.as_str()));
        }
        props
    }
}
