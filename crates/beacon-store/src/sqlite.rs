//! SQLite storage for queued events.
//!
//! Every write commits to SQLite before the worker acts on it. A failed write
//! means the file can no longer be trusted: the database is deleted and
//! recreated empty, and the data it held is lost.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::{Batch, EventStore, StoreError, StoreResult, Table};

/// Where the database lives, so it can be recreated after a failure.
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite-backed [`EventStore`].
pub struct SqliteEventStore {
    conn: Connection,
    location: Location,
}

impl SqliteEventStore {
    /// Opens a SQLite database at the given path.
    ///
    /// Creates the parent directory, the database and the schema if they
    /// don't exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let store = Self {
            conn,
            location: Location::File(path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            location: Location::Memory,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Path of the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        for table in Table::all() {
            let name = table.name();
            self.conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {name} (
                    _id INTEGER PRIMARY KEY AUTOINCREMENT,
                    data TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{name}_created_at ON {name}(created_at);
                "#
            ))?;
        }
        Ok(())
    }

    /// Returns the current Unix timestamp in milliseconds.
    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn insert_at(&mut self, table: Table, payload: &str, created_at: i64) -> StoreResult<u64> {
        let name = table.name();
        let result = self
            .conn
            .execute(
                &format!("INSERT INTO {name} (data, created_at) VALUES (?1, ?2)"),
                params![payload, created_at],
            )
            .and_then(|_| {
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {name}"), [], |row| {
                        row.get::<_, i64>(0)
                    })
            });

        match result {
            Ok(count) => Ok(count as u64),
            Err(source) => Err(self.recover("append", source)),
        }
    }

    /// Reset after a failed write and build the error the caller sees.
    fn recover(&mut self, operation: &str, source: rusqlite::Error) -> StoreError {
        error!(operation, error = %source, "Event store write failed, discarding database");
        match self.reset() {
            Ok(()) => StoreError::Corrupted { source },
            Err(e) => StoreError::Reset(format!("{operation} failed with {source}: {e}")),
        }
    }

    fn reopen(&mut self) -> Result<(), String> {
        match self.location.clone() {
            Location::Memory => {
                self.conn = Connection::open_in_memory().map_err(|e| e.to_string())?;
            }
            Location::File(path) => {
                // Swap in a placeholder so the file handle is closed before unlinking.
                let placeholder = Connection::open_in_memory().map_err(|e| e.to_string())?;
                let old = std::mem::replace(&mut self.conn, placeholder);
                if let Err((_, e)) = old.close() {
                    warn!(error = %e, "Failed to close event database cleanly");
                }
                remove_database_files(&path).map_err(|e| e.to_string())?;
                self.conn = Connection::open(&path).map_err(|e| e.to_string())?;
            }
        }
        self.init_schema().map_err(|e| e.to_string())
    }
}

impl EventStore for SqliteEventStore {
    fn append(&mut self, table: Table, payload: &str) -> StoreResult<u64> {
        let count = self.insert_at(table, payload, Self::now_millis())?;
        debug!(table = table.name(), queue_depth = count, "Appended record");
        Ok(count)
    }

    fn read_batch(&mut self, table: Table, max: usize) -> StoreResult<Option<Batch>> {
        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT _id, data FROM {} ORDER BY _id ASC LIMIT ?1",
            table.name()
        ))?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut events = Vec::new();
        let mut last_id = None;
        for row in rows {
            let (id, data) = row?;
            match serde_json::from_str::<Value>(&data) {
                Ok(value) => {
                    events.push(value);
                    last_id = Some(id);
                }
                Err(e) => {
                    warn!(table = table.name(), id, error = %e, "Skipping undecodable record");
                }
            }
        }

        let Some(last_id) = last_id else {
            return Ok(None);
        };
        let payload = serde_json::to_string(&events)?;
        Ok(Some(Batch {
            last_id,
            events,
            payload,
        }))
    }

    fn delete_up_to(&mut self, table: Table, last_id: i64) -> StoreResult<()> {
        let result = self.conn.execute(
            &format!("DELETE FROM {} WHERE _id <= ?1", table.name()),
            params![last_id],
        );
        match result {
            Ok(deleted) => {
                debug!(table = table.name(), last_id, deleted, "Deleted records up to watermark");
                Ok(())
            }
            Err(source) => Err(self.recover("delete_up_to", source)),
        }
    }

    fn delete_older_than(&mut self, table: Table, cutoff: DateTime<Utc>) -> StoreResult<()> {
        let result = self.conn.execute(
            &format!("DELETE FROM {} WHERE created_at < ?1", table.name()),
            params![cutoff.timestamp_millis()],
        );
        match result {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(table = table.name(), deleted, %cutoff, "Pruned expired records");
                }
                Ok(())
            }
            Err(source) => Err(self.recover("delete_older_than", source)),
        }
    }

    fn reset(&mut self) -> StoreResult<()> {
        self.reopen().map_err(StoreError::Reset)?;
        info!(path = ?self.path(), "Event store reset");
        Ok(())
    }

    fn count(&mut self, table: Table) -> StoreResult<u64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name()),
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u64)
    }
}

/// Remove the database file and its SQLite sidecar files.
fn remove_database_files(path: &Path) -> std::io::Result<()> {
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        match std::fs::remove_file(&name) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;

    fn event(n: u32) -> String {
        json!({ "event": format!("e{n}"), "properties": { "n": n } }).to_string()
    }

    fn insert_raw(store: &SqliteEventStore, data: &str) {
        store
            .conn
            .execute(
                "INSERT INTO events (data, created_at) VALUES (?1, ?2)",
                params![data, SqliteEventStore::now_millis()],
            )
            .unwrap();
    }

    #[test]
    fn append_returns_row_count() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        assert_eq!(store.append(Table::Events, &event(1)).unwrap(), 1);
        assert_eq!(store.append(Table::Events, &event(2)).unwrap(), 2);
        assert_eq!(store.append(Table::Events, &event(3)).unwrap(), 3);
        assert_eq!(store.count(Table::Events).unwrap(), 3);
    }

    #[test]
    fn read_batch_empty_returns_none() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        assert!(store.read_batch(Table::Events, 50).unwrap().is_none());
    }

    #[test]
    fn read_batch_is_oldest_first_and_limited() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        for n in 0..5 {
            store.append(Table::Events, &event(n)).unwrap();
        }

        let batch = store.read_batch(Table::Events, 3).unwrap().unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.last_id, 3);
        let names: Vec<_> = batch
            .events
            .iter()
            .map(|e| e["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["e0", "e1", "e2"]);

        let parsed: Vec<Value> = serde_json::from_str(&batch.payload).unwrap();
        assert_eq!(parsed, batch.events);

        // Reading does not consume.
        assert_eq!(store.count(Table::Events).unwrap(), 5);
    }

    #[test]
    fn read_batch_skips_undecodable_records() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        store.append(Table::Events, &event(1)).unwrap();
        insert_raw(&store, "{not json");
        store.append(Table::Events, &event(3)).unwrap();
        insert_raw(&store, "also not json");

        let batch = store.read_batch(Table::Events, 50).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        // Watermark is the newest decoded record, not the trailing bad row.
        assert_eq!(batch.last_id, 3);

        store.delete_up_to(Table::Events, batch.last_id).unwrap();
        assert_eq!(store.count(Table::Events).unwrap(), 1);
        assert!(store.read_batch(Table::Events, 50).unwrap().is_none());
    }

    #[test]
    fn delete_up_to_keeps_newer_records() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        for n in 0..4 {
            store.append(Table::Events, &event(n)).unwrap();
        }

        store.delete_up_to(Table::Events, 2).unwrap();

        let batch = store.read_batch(Table::Events, 50).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.events[0]["event"], "e2");
        assert_eq!(batch.last_id, 4);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        store.append(Table::Events, &event(1)).unwrap();
        store.append(Table::Events, &event(2)).unwrap();
        store.delete_up_to(Table::Events, 2).unwrap();

        store.append(Table::Events, &event(3)).unwrap();
        let batch = store.read_batch(Table::Events, 50).unwrap().unwrap();
        assert_eq!(batch.last_id, 3);
    }

    #[test]
    fn delete_older_than_prunes_by_creation_time() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        let now = Utc::now();
        let old = (now - Duration::days(6)).timestamp_millis();
        store.insert_at(Table::Events, &event(1), old).unwrap();
        store.insert_at(Table::Events, &event(2), old).unwrap();
        store.append(Table::Events, &event(3)).unwrap();

        store
            .delete_older_than(Table::Events, now - Duration::days(5))
            .unwrap();

        assert_eq!(store.count(Table::Events).unwrap(), 1);
        let batch = store.read_batch(Table::Events, 50).unwrap().unwrap();
        assert_eq!(batch.events[0]["event"], "e3");
    }

    #[test]
    fn failed_write_resets_in_memory_store() {
        let mut store = SqliteEventStore::in_memory().unwrap();
        store.append(Table::Events, &event(1)).unwrap();
        store.conn.execute_batch("DROP TABLE events").unwrap();

        let err = store.append(Table::Events, &event(2)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
        assert!(!err.is_fatal());

        // The store starts over empty and keeps working.
        assert_eq!(store.count(Table::Events).unwrap(), 0);
        assert_eq!(store.append(Table::Events, &event(3)).unwrap(), 1);
    }

    #[test]
    fn failed_delete_resets_file_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beacon.sqlite");
        let mut store = SqliteEventStore::open(&path).unwrap();
        store.append(Table::Events, &event(1)).unwrap();
        store.conn.execute_batch("DROP TABLE events").unwrap();

        let err = store.delete_up_to(Table::Events, 1).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));

        assert!(path.exists());
        assert_eq!(store.count(Table::Events).unwrap(), 0);
        assert_eq!(store.append(Table::Events, &event(2)).unwrap(), 1);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("beacon.sqlite");

        {
            let mut store = SqliteEventStore::open(&path).unwrap();
            store.append(Table::Events, &event(1)).unwrap();
            store.append(Table::Events, &event(2)).unwrap();
        }

        let mut store = SqliteEventStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let batch = store.read_batch(Table::Events, 50).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.last_id, 2);
    }

    #[test]
    fn reset_discards_everything() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beacon.sqlite");
        let mut store = SqliteEventStore::open(&path).unwrap();
        for n in 0..3 {
            store.append(Table::Events, &event(n)).unwrap();
        }

        store.reset().unwrap();

        assert_eq!(store.count(Table::Events).unwrap(), 0);
        assert!(store.read_batch(Table::Events, 50).unwrap().is_none());
        drop(store);

        let mut reopened = SqliteEventStore::open(&path).unwrap();
        assert_eq!(reopened.count(Table::Events).unwrap(), 0);
    }
}
