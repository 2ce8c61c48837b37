//! # HabitSync Core
//!
//! The local half of HabitSync's offline-first synchronization.
//!
//! This crate provides:
//! - The data model (habits, log entries, metadata) and its field rules
//! - [`LocalStore`], the durable source of truth with secondary log indexes
//! - [`OperationQueue`], the persisted queue of pending remote mutations
//! - [`LocalWriter`], the validating write boundary that stores a mutation
//!   and queues its snapshot
//! - [`StoreDir`], the locked on-disk layout holding the four journals
//!
//! ## Example
//!
//! ```rust
//! use habitsync_core::{LocalStore, LocalWriter, OperationQueue, SystemClock};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(SystemClock);
//! let store = Arc::new(LocalStore::open_in_memory(clock.clone()).unwrap());
//! let queue = Arc::new(OperationQueue::open_in_memory(clock).unwrap());
//! let writer = LocalWriter::new(store.clone(), queue.clone());
//!
//! let habit = writer.create_habit("Read", Some("Learning")).unwrap();
//! assert_eq!(store.get_habits(true), vec![habit]);
//! assert_eq!(queue.get_queue_size(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod dir;
pub mod entity;
mod error;
pub mod journal;
mod queue;
mod store;
pub mod validate;
mod writer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::StoreConfig;
pub use dir::StoreDir;
pub use entity::{
    Entity, EntityType, Habit, HabitStatus, LogEntry, LogStatus, Metadata, Record, METADATA_KEY,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use queue::{ObserverId, OperationQueue, OperationType, QueuedOperation, DEFAULT_MAX_RETRIES};
pub use store::{LocalStore, StoreBackends};
pub use writer::LocalWriter;
