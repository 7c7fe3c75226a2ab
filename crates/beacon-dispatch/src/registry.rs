//! Process-wide registry of dispatchers and trackers.
//!
//! One dispatcher per context (an application, or an isolated test
//! environment) and one tracker per project token within a context. The
//! registry is an ordinary value: create it at startup, pass it where
//! tracking is needed, and call [`Registry::shutdown`] before exit.

use beacon_config_and_utils::{Config, Paths};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::DispatchResult;
use crate::identity::{IdentityProvider, PersistentIdentity};
use crate::tracker::Tracker;

/// Builds the dispatcher for a context.
pub type DispatcherFactory = dyn Fn(&str) -> DispatchResult<Dispatcher> + Send + Sync;

/// Builds the identity for a (context, token) pair.
pub type IdentityFactory = dyn Fn(&str, &str) -> Arc<dyn IdentityProvider> + Send + Sync;

pub struct Registry {
    dispatcher_factory: Box<DispatcherFactory>,
    identity_factory: Box<IdentityFactory>,
    dispatchers: Mutex<HashMap<String, Dispatcher>>,
    trackers: Mutex<HashMap<(String, String), Tracker>>,
}

impl Registry {
    /// Registry whose contexts live under `paths`, each with its own queue
    /// database and identity files.
    pub fn new(config: Config, paths: Paths) -> Self {
        let identity_paths = paths.clone();
        Self::with_factories(
            move |context| Dispatcher::open(&config, &paths.for_context(context)),
            move |context, token| {
                Arc::new(PersistentIdentity::new(
                    identity_paths.for_context(context).identity_file(token),
                ))
            },
        )
    }

    /// Registry with custom construction, e.g. injected stores and transports.
    pub fn with_factories<F, I>(dispatcher_factory: F, identity_factory: I) -> Self
    where
        F: Fn(&str) -> DispatchResult<Dispatcher> + Send + Sync + 'static,
        I: Fn(&str, &str) -> Arc<dyn IdentityProvider> + Send + Sync + 'static,
    {
        Self {
            dispatcher_factory: Box::new(dispatcher_factory),
            identity_factory: Box::new(identity_factory),
            dispatchers: Mutex::new(HashMap::new()),
            trackers: Mutex::new(HashMap::new()),
        }
    }

    /// The dispatcher for `context`, started on first use.
    pub fn dispatcher_for(&self, context: &str) -> DispatchResult<Dispatcher> {
        let mut dispatchers = self.dispatchers.lock();
        if let Some(dispatcher) = dispatchers.get(context) {
            return Ok(dispatcher.clone());
        }

        let dispatcher = (self.dispatcher_factory)(context)?;
        dispatchers.insert(context.to_string(), dispatcher.clone());
        info!(context, "Registered dispatcher");
        Ok(dispatcher)
    }

    /// The tracker for `token` within `context`, created on first use.
    pub fn tracker(&self, context: &str, token: &str) -> DispatchResult<Tracker> {
        let key = (context.to_string(), token.to_string());
        let existing = self.trackers.lock().get(&key).cloned();
        if let Some(tracker) = existing {
            return Ok(tracker);
        }

        // Built unlocked: starting a dispatcher opens its database.
        let dispatcher = self.dispatcher_for(context)?;
        let identity = (self.identity_factory)(context, token);
        let tracker = Tracker::new(token, dispatcher, identity);

        let tracker = self.trackers.lock().entry(key).or_insert(tracker).clone();
        Ok(tracker)
    }

    /// Stop every dispatcher, waiting for queued messages to be handled,
    /// and forget all registrations.
    pub fn shutdown(&self) {
        self.trackers.lock().clear();
        let dispatchers: Vec<_> = self.dispatchers.lock().drain().collect();
        for (context, dispatcher) in dispatchers {
            dispatcher.shutdown();
            info!(context = %context, "Dispatcher shut down");
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let contexts = self.dispatchers.lock().len();
        let trackers = self.trackers.lock().len();
        f.debug_struct("Registry")
            .field("contexts", &contexts)
            .field("trackers", &trackers)
            .finish()
    }
}
