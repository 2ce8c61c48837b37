//! # HabitSync Testkit
//!
//! Test utilities for HabitSync.
//!
//! This crate provides:
//! - Test stores (in-memory or in a temp directory) with a pinned clock
//! - Builders for sample habits, log entries and timestamps
//! - Property-based test generators using proptest
//! - Tracing setup for test output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use habitsync_testkit::prelude::*;
//!
//! #[test]
//! fn writes_are_queued() {
//!     let local = TestStore::memory();
//!     local.writer.create_habit("Read", None).unwrap();
//!     assert_eq!(local.queue.get_queue_size(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
