//! Integration tests for the dispatch pipeline.
//!
//! - `harness.rs`  - Shared store, recording transport, running dispatcher
//! - `triggers.rs` - When flushes happen: bulk limit, timer, explicit, offline
//! - `delivery.rs` - What a flush deletes, keeps, and retries
//! - `failures.rs` - Store failures, worker faults, kill, purge, expiration
//! - `scenario.rs` - End-to-end tracking session
//! - `api.rs`      - Tracker, identity, and registry
//! - `collector.rs` - `Dispatcher::open` against HTTP collectors on localhost

mod delivery;
