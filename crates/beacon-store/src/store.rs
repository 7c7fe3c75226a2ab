//! The event store trait.

use chrono::{DateTime, Utc};

use crate::{Batch, StoreResult, Table};

/// A durable, ordered queue of serialized events.
///
/// The store is owned by the dispatch worker; implementations need to be
/// `Send` but never shared.
pub trait EventStore: Send {
    /// Append a payload with a fresh id and the current time.
    ///
    /// Returns the number of records in `table` after the insert. On a write
    /// failure the store resets itself and returns [`crate::StoreError::Corrupted`].
    fn append(&mut self, table: Table, payload: &str) -> StoreResult<u64>;

    /// Read up to `max` of the oldest records.
    ///
    /// Records whose payload is not valid JSON are skipped. Returns `None`
    /// when nothing decodable is queued.
    fn read_batch(&mut self, table: Table, max: usize) -> StoreResult<Option<Batch>>;

    /// Delete every record with id less than or equal to `last_id`.
    fn delete_up_to(&mut self, table: Table, last_id: i64) -> StoreResult<()>;

    /// Delete every record created before `cutoff`.
    fn delete_older_than(&mut self, table: Table, cutoff: DateTime<Utc>) -> StoreResult<()>;

    /// Discard all queued data.
    fn reset(&mut self) -> StoreResult<()>;

    /// Number of records in `table`.
    fn count(&mut self, table: Table) -> StoreResult<u64>;
}

impl<S: EventStore + ?Sized> EventStore for Box<S> {
    fn append(&mut self, table: Table, payload: &str) -> StoreResult<u64> {
        (**self).append(table, payload)
    }

    fn read_batch(&mut self, table: Table, max: usize) -> StoreResult<Option<Batch>> {
        (**self).read_batch(table, max)
    }

    fn delete_up_to(&mut self, table: Table, last_id: i64) -> StoreResult<()> {
        (**self).delete_up_to(table, last_id)
    }

    fn delete_older_than(&mut self, table: Table, cutoff: DateTime<Utc>) -> StoreResult<()> {
        (**self).delete_older_than(table, cutoff)
    }

    fn reset(&mut self) -> StoreResult<()> {
        (**self).reset()
    }

    fn count(&mut self, table: Table) -> StoreResult<u64> {
        (**self).count(table)
    }
}
