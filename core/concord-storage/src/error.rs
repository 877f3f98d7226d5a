//! Error types for the storage layer.

use concord_types::ParticipantId;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The participant has no identity record.
    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// Stored data could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backing store refused the write.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding the store was poisoned by a panic.
    #[error("storage lock poisoned")]
    Poisoned,
}
