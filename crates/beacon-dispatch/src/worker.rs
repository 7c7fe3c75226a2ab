//! The dispatch worker.
//!
//! A single thread owns the event store and the transport. It consumes
//! [`Message`]s in the order they were posted and decides when to flush,
//! what to delete, and when to try again.
//!
//! ```text
//! Enqueue ──▶ append ──▶ depth >= bulk limit? ──yes──▶ flush
//!                              │ no
//!                              ▼
//!                    schedule flush in flush_interval
//!                    (unless one is already scheduled)
//!
//! flush: read batch ──▶ try each endpoint in order
//!          ├─ response            ──▶ delete up to last_id, next batch
//!          ├─ unrecoverable error ──▶ delete up to last_id, next batch
//!          └─ I/O on every URL    ──▶ keep batch, schedule retry, stop
//! ```
//!
//! Any panic or store failure that cannot be reset kills the worker for good.

use beacon_config_and_utils::Config;
use beacon_store::{Batch, EventStore, Table, MAX_BATCH_SIZE};
use beacon_transport::{EncodedPayload, Transport};
use chrono::Utc;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Weak;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::defaults::DefaultPropertiesProvider;
use crate::dispatcher::Shared;
use crate::error::DispatchResult;
use crate::event::{build_event_object, EventDescription};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "beacon-dispatch-worker";

/// Messages processed by the worker, in posting order.
#[derive(Debug)]
pub(crate) enum Message {
    /// Store an event.
    Enqueue(EventDescription),
    /// Send everything queued.
    Flush,
    /// Discard everything queued.
    Purge,
    /// Stop processing for good.
    Kill,
}

impl Message {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Enqueue(_) => "enqueue",
            Self::Flush => "flush",
            Self::Purge => "purge",
            Self::Kill => "kill",
        }
    }
}

/// Worker tuning, derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Queue depth that triggers an immediate flush.
    pub bulk_upload_limit: u64,
    /// Delay for scheduled flushes and retries. `None` disables scheduling.
    pub flush_interval: Option<Duration>,
    /// Records older than this are pruned at startup.
    pub data_expiration: Duration,
    /// Candidate URLs, tried in order for each batch.
    pub endpoints: Vec<String>,
    /// Ask the collector for verbose responses.
    pub verbose: bool,
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            bulk_upload_limit: config.bulk_upload_limit as u64,
            flush_interval: config.flush_interval(),
            data_expiration: config.data_expiration(),
            endpoints: config.endpoints(),
            verbose: config.verbose,
        }
    }
}

/// Moving average of the time between flushes. Diagnostic only.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlushStats {
    last_flush: Option<Instant>,
    flush_count: u64,
    average_interval: Duration,
}

impl FlushStats {
    /// Record a flush attempt at `now`.
    pub(crate) fn record(&mut self, now: Instant) {
        let new_count = self.flush_count + 1;

        if let Some(last) = self.last_flush {
            let interval = now.saturating_duration_since(last).as_millis();
            let total =
                interval + self.average_interval.as_millis() * u128::from(self.flush_count);
            let average = u64::try_from(total / u128::from(new_count)).unwrap_or(u64::MAX);
            self.average_interval = Duration::from_millis(average);
            debug!(
                average_secs = self.average_interval.as_secs(),
                "Average flush frequency updated"
            );
        }

        self.last_flush = Some(now);
        self.flush_count = new_count;
    }

    #[cfg(test)]
    pub(crate) fn flush_count(&self) -> u64 {
        self.flush_count
    }

    #[cfg(test)]
    pub(crate) fn average_interval(&self) -> Duration {
        self.average_interval
    }
}

/// What became of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// An endpoint answered.
    Delivered,
    /// Delivery can never succeed; the batch is discarded.
    Dropped,
    /// Every endpoint failed with a recoverable error.
    Retry,
}

/// Whether the loop keeps going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Continue,
    Stop,
}

/// The worker's state. Lives on the worker thread only.
pub(crate) struct Worker {
    store: Box<dyn EventStore>,
    transport: Box<dyn Transport>,
    defaults: Box<dyn DefaultPropertiesProvider>,
    settings: WorkerSettings,
    /// Deadline of the scheduled flush, if any.
    pending_flush: Option<Instant>,
    stats: FlushStats,
}

impl Worker {
    pub(crate) fn new(
        store: Box<dyn EventStore>,
        transport: Box<dyn Transport>,
        defaults: Box<dyn DefaultPropertiesProvider>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            transport,
            defaults,
            settings,
            pending_flush: None,
            stats: FlushStats::default(),
        }
    }

    /// Run the message loop until killed, faulted, or every handle is gone.
    pub(crate) fn run(mut self, receiver: Receiver<Message>, shared: Weak<Shared>) {
        info!("Dispatch worker started");

        if let Err(e) = self.prune_expired() {
            error!(
                error = %e,
                "Dispatch worker failed at startup, no more events will be processed"
            );
            mark_dead(&shared);
            return;
        }

        while let Some(message) = self.next_message(&receiver) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.handle(message)));
            match outcome {
                Ok(Ok(Control::Continue)) => {}
                Ok(Ok(Control::Stop)) => {
                    info!("Dispatch worker killed");
                    mark_dead(&shared);
                    return;
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Dispatch worker failed, no more events will be processed");
                    mark_dead(&shared);
                    return;
                }
                Err(payload) => {
                    error!(
                        panic = %panic_message(payload.as_ref()),
                        "Dispatch worker panicked, no more events will be processed"
                    );
                    mark_dead(&shared);
                    return;
                }
            }
        }

        debug!("All dispatcher handles dropped, worker exiting");
    }

    /// Wait for the next message, or for the scheduled flush to come due.
    fn next_message(&mut self, receiver: &Receiver<Message>) -> Option<Message> {
        let Some(deadline) = self.pending_flush else {
            return receiver.recv().ok();
        };

        let now = Instant::now();
        if deadline <= now {
            self.pending_flush = None;
            return Some(Message::Flush);
        }

        match receiver.recv_timeout(deadline - now) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => {
                self.pending_flush = None;
                Some(Message::Flush)
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn handle(&mut self, message: Message) -> DispatchResult<Control> {
        match message {
            Message::Enqueue(description) => {
                if let Some(queue_depth) = self.enqueue(&description)? {
                    self.after_enqueue(queue_depth)?;
                }
            }
            Message::Flush => {
                debug!("Flushing queue due to scheduled or forced flush");
                self.flush()?;
            }
            Message::Purge => {
                info!("Purging queued events");
                self.store.reset()?;
            }
            Message::Kill => return Ok(Control::Stop),
        }
        Ok(Control::Continue)
    }

    /// Store an event. Returns the queue depth, or `None` if it was dropped.
    fn enqueue(&mut self, description: &EventDescription) -> DispatchResult<Option<u64>> {
        let event = build_event_object(description, &self.defaults.collect());
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    event = description.name(),
                    error = %e,
                    "Could not serialize event, dropping it"
                );
                return Ok(None);
            }
        };

        match self.store.append(Table::Events, &payload) {
            Ok(queue_depth) => {
                debug!(event = description.name(), queue_depth, "Queued event");
                Ok(Some(queue_depth))
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                error!(
                    event = description.name(),
                    error = %e,
                    "Could not queue event, dropping it"
                );
                Ok(None)
            }
        }
    }

    fn after_enqueue(&mut self, queue_depth: u64) -> DispatchResult<()> {
        if queue_depth >= self.settings.bulk_upload_limit {
            info!(queue_depth, "Flushing queue due to bulk upload limit");
            self.flush()?;
        } else if queue_depth > 0 && self.pending_flush.is_none() {
            self.schedule_flush();
        }
        Ok(())
    }

    fn schedule_flush(&mut self) {
        if let Some(interval) = self.settings.flush_interval {
            let delay_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
            debug!(delay_ms, "Scheduling flush");
            self.pending_flush = Some(Instant::now() + interval);
        }
    }

    /// Send queued batches until the store is empty or delivery fails.
    fn flush(&mut self) -> DispatchResult<()> {
        if !self.transport.is_online() {
            info!("Not flushing, collector is unreachable");
            return Ok(());
        }

        self.stats.record(Instant::now());

        loop {
            let batch = match self.store.read_batch(Table::Events, MAX_BATCH_SIZE) {
                Ok(Some(batch)) => batch,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "Could not read queued events");
                    return Ok(());
                }
            };

            match self.deliver(&batch) {
                Delivery::Delivered | Delivery::Dropped => self.delete_batch(batch.last_id)?,
                Delivery::Retry => {
                    info!(last_id = batch.last_id, "Keeping batch for retry");
                    if self.pending_flush.is_none() {
                        self.schedule_flush();
                    }
                    return Ok(());
                }
            }
        }
    }

    fn deliver(&self, batch: &Batch) -> Delivery {
        let payload = EncodedPayload::from_batch_json(&batch.payload, self.settings.verbose);

        for url in &self.settings.endpoints {
            match self.transport.perform_request(url, &payload) {
                Ok(Some(body)) => {
                    debug!(
                        url = %url,
                        count = batch.len(),
                        last_id = batch.last_id,
                        response = %String::from_utf8_lossy(&body),
                        "Posted batch"
                    );
                    return Delivery::Delivered;
                }
                Ok(None) => {
                    warn!(url = %url, count = batch.len(), "Collector sent no response body");
                    return Delivery::Delivered;
                }
                Err(e) if !e.is_recoverable() => {
                    error!(
                        url = %url,
                        error = %e,
                        count = batch.len(),
                        "Dropping batch that cannot be delivered"
                    );
                    return Delivery::Dropped;
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Could not post batch");
                }
            }
        }

        Delivery::Retry
    }

    fn delete_batch(&mut self, last_id: i64) -> DispatchResult<()> {
        match self.store.delete_up_to(Table::Events, last_id) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(last_id, error = %e, "Could not delete delivered batch");
                Ok(())
            }
        }
    }

    fn prune_expired(&mut self) -> DispatchResult<()> {
        let cutoff = chrono::Duration::from_std(self.settings.data_expiration)
            .ok()
            .and_then(|expiration| Utc::now().checked_sub_signed(expiration));
        let Some(cutoff) = cutoff else {
            return Ok(());
        };

        match self.store.delete_older_than(Table::Events, cutoff) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Could not prune expired events");
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn stats(&self) -> &FlushStats {
        &self.stats
    }
}

fn mark_dead(shared: &Weak<Shared>) {
    if let Some(shared) = shared.upgrade() {
        shared.mark_dead();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
