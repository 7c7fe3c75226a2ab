//! Durable event queue for the Beacon dispatch pipeline.
//!
//! Events are appended as JSON text and read back oldest-first in batches.
//! A batch is acknowledged by deleting every record up to its watermark id.
//!
//! Storage failures on writes are treated as corruption: the database is
//! discarded and recreated, and the caller sees [`StoreError::Corrupted`].

mod error;
mod sqlite;
mod store;
mod types;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteEventStore;
pub use store::EventStore;
pub use types::{Batch, Table, MAX_BATCH_SIZE};
