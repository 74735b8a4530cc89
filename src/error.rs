//! Error types for the sync engine.

use crate::types::SubscriberId;
use thiserror::Error;

/// Main error type for subscription and execution requests.
///
/// Cloneable because a single manager failure is delivered to every
/// subscriber attached to it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Request timed out")]
    Timeout,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Write conflict: document was modified concurrently")]
    WriteConflict,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection terminated")]
    ConnectionTerminated,

    #[error("Execution aborted by caller")]
    ExecutionAborted,

    #[error("Execution gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Server error {code}: {message}")]
    Server { code: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Delivery executor error: {0}")]
    Executor(String),

    #[error("Subscriber buffer overflowed after {capacity} undelivered events")]
    BufferOverflow { capacity: usize },

    #[error("Subscription not found: {0:?}")]
    SubscriptionNotFound(SubscriberId),
}

impl SyncError {
    /// Whether the optimistic flow should fetch fresh state and try again.
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, SyncError::WriteConflict)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::InvalidData(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
