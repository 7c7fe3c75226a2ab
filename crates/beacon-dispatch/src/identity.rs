//! Distinct ids for the users of an application.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Supplies the `distinct_id` attached to tracked events.
pub trait IdentityProvider: Send + Sync {
    /// The current distinct id, generated on first use.
    fn distinct_id(&self) -> String;

    /// Forget the current id. The next call to
    /// [`distinct_id`](Self::distinct_id) generates a new one.
    fn reset(&self);
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Identity kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryIdentity {
    id: Mutex<Option<String>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Mutex::new(Some(id.into())),
        }
    }
}

impl IdentityProvider for InMemoryIdentity {
    fn distinct_id(&self) -> String {
        self.id.lock().get_or_insert_with(generate_id).clone()
    }

    fn reset(&self) {
        self.id.lock().take();
    }
}

/// On-disk form of a persisted identity.
#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    distinct_id: String,
}

/// Identity stored as a JSON file, one per project token.
///
/// File errors are logged and never fail the caller: an id that cannot be
/// written is still used for the rest of the process.
#[derive(Debug)]
pub struct PersistentIdentity {
    path: PathBuf,
    cached: Mutex<Option<String>>,
}

impl PersistentIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<StoredIdentity>(&content) {
            Ok(stored) if !stored.distinct_id.is_empty() => Some(stored.distinct_id),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable identity file");
                None
            }
        }
    }

    fn store(&self, distinct_id: &str) {
        let stored = StoredIdentity {
            distinct_id: distinct_id.to_string(),
        };
        let result = serde_json::to_string(&stored)
            .map_err(std::io::Error::from)
            .and_then(|content| {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, content)
            });
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to persist identity");
        }
    }
}

impl IdentityProvider for PersistentIdentity {
    fn distinct_id(&self) -> String {
        let mut cached = self.cached.lock();
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let id = match self.load() {
            Some(id) => id,
            None => {
                let id = generate_id();
                debug!(path = %self.path.display(), "Generated new distinct id");
                self.store(&id);
                id
            }
        };
        *cached = Some(id.clone());
        id
    }

    fn reset(&self) {
        let mut cached = self.cached.lock();
        cached.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove identity file");
            }
        }
    }
}
