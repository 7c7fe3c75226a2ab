//! Thread-safe entry point into the dispatch worker.

use beacon_config_and_utils::{Config, Paths};
use beacon_store::{EventStore, SqliteEventStore};
use beacon_transport::{HttpTransport, TcpConnectivityProbe, Transport};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::defaults::{DefaultPropertiesProvider, SystemInformation};
use crate::error::DispatchResult;
use crate::event::EventDescription;
use crate::worker::{Message, Worker, WorkerSettings, WORKER_THREAD_NAME};

/// State shared between dispatcher handles and the worker.
///
/// The sender doubles as the alive flag: `None` means the worker is dead and
/// every post is dropped.
pub(crate) struct Shared {
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn mark_dead(&self) {
        self.sender.lock().take();
    }
}

/// Handle to a dispatch worker.
///
/// Cloning is cheap; all clones feed the same worker. No method blocks on
/// I/O or returns an error: once the worker is dead, calls are dropped with a
/// debug log.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Start a worker thread with the given collaborators.
    pub fn spawn<S, T, D>(
        settings: WorkerSettings,
        store: S,
        transport: T,
        defaults: D,
    ) -> DispatchResult<Self>
    where
        S: EventStore + 'static,
        T: Transport + 'static,
        D: DefaultPropertiesProvider + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(None),
        });

        let worker = Worker::new(
            Box::new(store),
            Box::new(transport),
            Box::new(defaults),
            settings,
        );
        let weak = Arc::downgrade(&shared);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run(receiver, weak))?;
        *shared.worker.lock() = Some(handle);

        Ok(Self { shared })
    }

    /// Start a worker backed by the SQLite queue under `paths` and the HTTP transport.
    ///
    /// Collector reachability is left to delivery itself, so an unreachable
    /// primary falls through to the fallbacks and is retried on schedule.
    pub fn open(config: &Config, paths: &Paths) -> DispatchResult<Self> {
        config.validate()?;
        paths.ensure_dirs()?;

        let store = SqliteEventStore::open(paths.database_file())?;
        let mut transport = HttpTransport::new(config.request_timeout())?;
        if let Some(address) = &config.connectivity_check {
            match TcpConnectivityProbe::resolve(address, TcpConnectivityProbe::DEFAULT_TIMEOUT) {
                Ok(probe) => transport = transport.with_probe(probe),
                Err(e) => {
                    warn!(
                        address = %address,
                        error = %e,
                        "Connectivity check unavailable, assuming online"
                    );
                }
            }
        }

        info!(
            database = %paths.database_file().display(),
            endpoint = %config.events_endpoint,
            bulk_upload_limit = config.bulk_upload_limit,
            flush_interval_ms = config.flush_interval_ms,
            "Starting dispatcher"
        );
        Self::spawn(
            WorkerSettings::from(config),
            store,
            transport,
            SystemInformation::new(),
        )
    }

    /// Queue an event.
    pub fn track(&self, event: EventDescription) {
        self.post(Message::Enqueue(event));
    }

    /// Send everything queued, regardless of the bulk limit or timer.
    pub fn flush(&self) {
        self.post(Message::Flush);
    }

    /// Discard everything queued.
    pub fn purge(&self) {
        self.post(Message::Purge);
    }

    /// Stop the worker. Messages posted earlier are still processed; later
    /// ones are dropped.
    pub fn kill(&self) {
        let mut sender = self.shared.sender.lock();
        if let Some(sender) = sender.take() {
            let _ = sender.send(Message::Kill);
        }
    }

    /// Whether the worker was killed or has failed. A dead worker never recovers.
    pub fn is_dead(&self) -> bool {
        self.shared.sender.lock().is_none()
    }

    /// Whether both handles feed the same worker.
    pub fn same_worker(&self, other: &Dispatcher) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Kill the worker and wait for it to finish the messages ahead of the kill.
    pub fn shutdown(&self) {
        self.kill();
        let handle = self.shared.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Dispatch worker thread panicked");
            }
        }
    }

    fn post(&self, message: Message) {
        let sender = self.shared.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                if let Err(e) = sender.send(message) {
                    debug!(message = e.0.kind(), "Dispatch worker gone, dropping message");
                }
            }
            None => {
                debug!(message = message.kind(), "Dead dispatch worker dropping a message");
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("dead", &self.is_dead())
            .finish()
    }
}
