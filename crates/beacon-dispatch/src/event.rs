//! Event descriptions and the JSON object stored for each event.

use serde_json::{Map, Value};

/// An event as submitted to the dispatcher, before defaults are merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDescription {
    name: String,
    properties: Map<String, Value>,
    token: String,
}

impl EventDescription {
    pub fn new(
        name: impl Into<String>,
        properties: Map<String, Value>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            properties,
            token: token.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Build the stored event object.
///
/// Property precedence, lowest first: `defaults`, the project token, then the
/// description's own properties. Key order follows insertion.
pub fn build_event_object(description: &EventDescription, defaults: &Map<String, Value>) -> Value {
    let mut properties = defaults.clone();
    properties.insert("token".to_string(), Value::from(description.token()));
    for (key, value) in description.properties() {
        properties.insert(key.clone(), value.clone());
    }

    let mut event = Map::new();
    event.insert("event".to_string(), Value::from(description.name()));
    event.insert("properties".to_string(), Value::Object(properties));
    Value::Object(event)
}
