//! # Beacon dispatch
//!
//! Client-side event dispatch: application threads track events, a single
//! background worker queues them durably and delivers them in batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐  mpsc  ┌─────────────────┐   ┌───────────┐
//! │ Tracker  │──▶│ Dispatcher │───────▶│ Dispatch worker │──▶│ Transport │
//! └──────────┘   └────────────┘        └────────┬────────┘   └───────────┘
//!                                               │
//!                                        ┌──────▼──────┐
//!                                        │ Event store │
//!                                        │  (SQLite)   │
//!                                        └─────────────┘
//! ```
//!
//! - Delivery is at least once. A batch is deleted only after an endpoint
//!   answered, or when delivery can never succeed.
//! - Callers never see an error from `track` or `flush`.
//! - A worker that faults stays dead; later calls are dropped.
//!
//! ## Example
//!
//! ```ignore
//! use beacon_config_and_utils::{Config, Paths};
//! use beacon_dispatch::Registry;
//!
//! let paths = Paths::new()?;
//! let registry = Registry::new(Config::load(&paths)?, paths);
//!
//! let tracker = registry.tracker("my-app", "project-token")?;
//! tracker.track("Signed Up", None);
//! tracker.flush();
//!
//! registry.shutdown();
//! ```

mod defaults;
mod dispatcher;
mod error;
mod event;
mod identity;
mod registry;
mod tracker;
mod worker;

#[cfg(test)]
mod tests;

pub use defaults::{DefaultPropertiesProvider, SystemInformation, LIB_NAME};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use event::{build_event_object, EventDescription};
pub use identity::{IdentityProvider, InMemoryIdentity, PersistentIdentity};
pub use registry::{DispatcherFactory, IdentityFactory, Registry};
pub use tracker::Tracker;
pub use worker::{WorkerSettings, WORKER_THREAD_NAME};
