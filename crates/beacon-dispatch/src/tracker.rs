//! Per-project tracking API.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::event::EventDescription;
use crate::identity::IdentityProvider;

/// Tracks events for one project token.
///
/// Events are stamped on the caller's thread and handed to the dispatcher;
/// `track` never blocks on storage or the network.
#[derive(Clone)]
pub struct Tracker {
    token: String,
    dispatcher: Dispatcher,
    identity: Arc<dyn IdentityProvider>,
}

impl Tracker {
    pub fn new(
        token: impl Into<String>,
        dispatcher: Dispatcher,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            token: token.into(),
            dispatcher,
            identity,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Track an event.
    ///
    /// `time` (unix seconds) and `distinct_id` are set first, so `properties`
    /// may override either.
    pub fn track(&self, name: &str, properties: Option<Map<String, Value>>) {
        let mut merged = Map::new();
        merged.insert("time".to_string(), Value::from(Utc::now().timestamp()));
        merged.insert(
            "distinct_id".to_string(),
            Value::from(self.identity.distinct_id()),
        );
        if let Some(properties) = properties {
            merged.extend(properties);
        }

        self.dispatcher
            .track(EventDescription::new(name, merged, self.token.as_str()));
    }

    /// Send everything queued as soon as the worker gets to it.
    pub fn flush(&self) {
        self.dispatcher.flush();
    }

    pub fn distinct_id(&self) -> String {
        self.identity.distinct_id()
    }

    /// Forget the current user: a new distinct id is generated and events
    /// not yet sent are discarded.
    pub fn reset(&self) {
        self.identity.reset();
        self.dispatcher.purge();
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("token", &self.token)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
