//! Error types for the sync engine.

use habitsync_core::{CoreError, OperationType};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures reported by a [`crate::RemoteGateway`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network or server trouble; the same call may succeed later.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote store has no such record.
    #[error("{entity_type} not found remotely: {id}")]
    NotFound {
        /// Entity kind looked up.
        entity_type: String,
        /// Missing id.
        id: String,
    },

    /// The remote store refused the write (validation, constraint).
    #[error("rejected by remote store: {0}")]
    Rejected(String),

    /// Credentials missing, expired or insufficient.
    #[error("not authorized: {0}")]
    Unauthorized(String),
}

impl GatewayError {
    /// Creates a not-found error.
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Returns true if repeating the call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote gateway failed.
    #[error("remote error: {0}")]
    Gateway(#[from] GatewayError),

    /// The local store or queue failed.
    #[error("local store error: {0}")]
    Local(#[from] CoreError),

    /// A queued operation names an entity type or operation this build
    /// cannot dispatch.
    #[error("unsupported operation {operation} on entity type {entity_type:?}")]
    UnsupportedEntity {
        /// Persisted entity type name.
        entity_type: String,
        /// Requested operation.
        operation: OperationType,
    },

    /// The app is offline.
    #[error("offline")]
    Offline,
}

impl SyncError {
    /// Returns true if this error can be retried.
    ///
    /// Local storage faults count as transient; decode failures and
    /// unsupported entities never heal on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Gateway(e) => e.is_retryable(),
            SyncError::Local(e) => matches!(e, CoreError::Storage(_) | CoreError::Io(_)),
            SyncError::UnsupportedEntity { .. } => false,
            SyncError::Offline => true,
        }
    }
}
