//! Shared store types.

use serde_json::Value;

/// Maximum records returned by a single batch read.
pub const MAX_BATCH_SIZE: usize = 50;

/// Kinds of queued data, one SQLite table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Tracked events.
    Events,
}

impl Table {
    /// SQLite table name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Events => "events",
        }
    }

    /// All tables, in schema creation order.
    pub fn all() -> &'static [Table] {
        &[Table::Events]
    }
}

/// A batch of queued records, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Id of the newest record in the batch. Deleting up to this id
    /// acknowledges the whole batch.
    pub last_id: i64,
    /// Decoded payloads in id order.
    pub events: Vec<Value>,
    /// The events serialized as a JSON array.
    pub payload: String,
}

impl Batch {
    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch has no events. Batches returned by a store never are.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
