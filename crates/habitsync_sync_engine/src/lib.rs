//! # HabitSync Sync Engine
//!
//! Push, pull and retry orchestration between HabitSync's local store and
//! a remote multi-user datastore.
//!
//! This crate provides:
//! - The [`RemoteGateway`] contract and an in-process [`MemoryGateway`]
//! - Last-write-wins reconciliation of pulled habits and logs
//! - [`SyncCoordinator`]: queue draining, remote merge, backoff retries,
//!   connectivity transitions and subscriber notification
//!
//! ## Architecture
//!
//! The coordinator runs a **push-then-pull** cycle:
//! 1. Collapse the operation queue, then drain it against the gateway
//! 2. Stamp `last_sync` on the metadata record
//! 3. Fetch remote habits, logs and metadata concurrently
//! 4. Merge them into the local store, newest stamp wins
//!
//! ## Key Invariants
//!
//! - The local store is the durable source of truth; no sync failure
//!   deletes local data
//! - One failing operation never aborts the batch
//! - One cycle at a time; overlapping calls wait
//! - Ties and missing stamps keep the local copy

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod gateway;
mod reconcile;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{
    PullReport, PushReport, Subscription, SyncCoordinator, SyncSnapshot, SyncStats, SyncStatus,
    OFFLINE_MESSAGE,
};
pub use error::{GatewayError, SyncError, SyncResult};
pub use gateway::{GatewayCall, GatewayMethod, MemoryGateway, RemoteGateway};
pub use reconcile::{last_write_wins, ReconcileStats, Reconciled, Versioned};
