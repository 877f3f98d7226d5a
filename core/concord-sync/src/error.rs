//! Error types for the reconciliation layer.

use concord_storage::StorageError;
use concord_types::ParticipantId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Malformed stored JSON, stale definitions and values that cannot be coerced
/// are recovered locally and never show up here.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Persisting a record failed.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Writing a value to local storage failed.
    #[error("local storage error: {0}")]
    Registry(#[from] concord_model::RegistryError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The participant has no identity.
    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// The acting participant may not stage changes for others.
    #[error("participant {0} is not an administrator")]
    NotAdministrator(ParticipantId),

    /// A reconciliation pass is already waiting on arbitration.
    #[error("participant {0} is already awaiting arbitration")]
    ArbitrationPending(ParticipantId),

    /// A resolution was submitted without a pass awaiting it.
    #[error("no arbitration pending for participant {0}")]
    NoPendingArbitration(ParticipantId),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The orchestrator task is gone.
    #[error("channel closed")]
    ChannelClosed,
}

/// A missing identity surfaces as [`SyncError::UnknownParticipant`].
impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnknownParticipant(id) => SyncError::UnknownParticipant(id),
            other => SyncError::Storage(other),
        }
    }
}
