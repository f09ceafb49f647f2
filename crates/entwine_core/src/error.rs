//! Error types for Entwine core operations.

use entwine_storage::StorageError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Entwine core operations.
///
/// [`Error::EndOfEntries`] and [`Error::Break`] are iteration sentinels, not
/// failures: cursors and filtered queries use them to signal exhaustion and
/// early termination. Use [`Error::is_sentinel`] to convert them back into
/// normal control flow.
#[derive(Debug, Error)]
pub enum Error {
    /// A cursor walked past its final entry.
    #[error("end of entries")]
    EndOfEntries,

    /// Iteration was cut short on purpose.
    #[error("iteration stopped")]
    Break,

    /// No entry exists under the requested id.
    #[error("entry was not found")]
    EntryNotFound,

    /// A stored payload could not be decoded into the registered record type.
    #[error("invalid type: {0}")]
    InvalidType(#[from] serde_json::Error),

    /// A record violated the store's relationship registry, or an argument
    /// referenced an unregistered relationship.
    #[error("invalid entry: {reason}")]
    InvalidEntry {
        /// Description of the violation.
        reason: String,
    },

    /// A mutation was attempted inside a read transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The surrounding context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The surrounding context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A batched commit failed; every caller in the batch receives the same
    /// underlying error.
    #[error("batch commit failed: {0}")]
    BatchFailed(Arc<Error>),
}

impl Error {
    /// Creates an invalid entry error.
    pub fn invalid_entry(reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            reason: reason.into(),
        }
    }

    /// Whether this is an iteration sentinel rather than a failure.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::EndOfEntries | Self::Break)
    }
}
