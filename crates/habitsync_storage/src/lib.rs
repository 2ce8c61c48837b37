//! # HabitSync Storage
//!
//! Byte-store backends underneath HabitSync's local collections.
//!
//! Every persisted collection (habits, logs, metadata and the pending
//! operation queue) is an append-only record log. This crate provides the
//! raw storage for those logs and nothing else: backends never interpret
//! the bytes they hold.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - shared in-memory bytes, with write-fault injection for tests
//! - [`FileBackend`] - one file per collection, atomic whole-file replacement
//!
//! ## Example
//!
//! ```rust
//! use habitsync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
