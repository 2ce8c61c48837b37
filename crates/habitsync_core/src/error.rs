//! Error types for HabitSync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the local store, queue and write boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] habitsync_storage::StorageError),

    /// I/O error outside a backend (store directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A record log is damaged beyond its torn tail.
    #[error("{collection} log corrupted: {message}")]
    Corrupted {
        /// Collection whose log is damaged.
        collection: &'static str,
        /// Description of the damage.
        message: String,
    },

    /// Checksum mismatch in a record log frame.
    #[error("checksum mismatch in {collection} log: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Collection whose log is damaged.
        collection: &'static str,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// A by-id operation referenced a missing record.
    #[error("{collection} not found: {id}")]
    NotFound {
        /// Collection searched.
        collection: &'static str,
        /// The missing id.
        id: String,
    },

    /// An entity failed its shape or range constraints.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The store directory is missing or not a directory.
    #[error("invalid store directory: {0}")]
    InvalidDirectory(String),
}

impl CoreError {
    /// Creates a not-found error.
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(collection: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupted {
            collection,
            message: message.into(),
        }
    }

    /// Creates a codec error from any displayable cause.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }

    /// Returns true if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Reasons an entity is rejected at the write boundary.
///
/// These are never queued: the mutating caller gets them immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Habit name empty after trimming.
    #[error("habit name must not be empty")]
    EmptyName,

    /// Habit name longer than the limit.
    #[error("habit name is {len} characters, limit is {max}")]
    NameTooLong {
        /// Actual length.
        len: usize,
        /// Allowed length.
        max: usize,
    },

    /// Another active habit already uses the name.
    #[error("an active habit named {0:?} already exists")]
    DuplicateName(String),

    /// Category longer than the limit.
    #[error("category is {len} characters, limit is {max}")]
    CategoryTooLong {
        /// Actual length.
        len: usize,
        /// Allowed length.
        max: usize,
    },

    /// Notes longer than the limit.
    #[error("notes are {len} characters, limit is {max}")]
    NotesTooLong {
        /// Actual length.
        len: usize,
        /// Allowed length.
        max: usize,
    },

    /// Log date after today.
    #[error("cannot log {date}: it is in the future")]
    FutureDate {
        /// The rejected date.
        date: chrono::NaiveDate,
    },

    /// Log date too far in the past to edit.
    #[error("cannot log {date}: only the last {window} days can be edited")]
    DateOutsideWindow {
        /// The rejected date.
        date: chrono::NaiveDate,
        /// Editable window in days.
        window: i64,
    },

    /// Logging against an inactive habit.
    #[error("habit {0} is inactive")]
    InactiveHabit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::not_found("habit", "h1");
        assert_eq!(err.to_string(), "habit not found: h1");
        assert!(err.is_not_found());

        let err = CoreError::from(ValidationError::NameTooLong { len: 101, max: 100 });
        assert!(err.to_string().contains("101"));
        assert!(!err.is_not_found());
    }
}
