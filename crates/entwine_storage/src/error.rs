//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The underlying database could not be opened or created.
    #[error("engine error: {0}")]
    Database(#[from] ::redb::DatabaseError),

    /// A backend transaction could not be started.
    #[error("transaction error: {0}")]
    Transaction(#[from] ::redb::TransactionError),

    /// A backend table could not be opened.
    #[error("table error: {0}")]
    Table(#[from] ::redb::TableError),

    /// The backend failed while reading or writing.
    #[error("storage error: {0}")]
    Engine(#[from] ::redb::StorageError),

    /// A backend commit failed.
    #[error("commit error: {0}")]
    Commit(#[from] ::redb::CommitError),

    /// A stored key violated the bucket encoding.
    #[error("corrupted key encoding: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Creates a corrupted-encoding error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
