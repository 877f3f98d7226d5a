//! Core type definitions for Concord.
//!
//! This crate defines the small, storage-agnostic types shared by every
//! other crate in the workspace:
//! - Participant identifiers (UUID v7)
//! - Snapshot save counters
//! - Namespaced, dotted setting keys
//!
//! Setting definitions and values live in `concord-model`.

mod ids;
mod key;

pub use ids::{ParticipantId, SaveId};
pub use key::{KEY_SEPARATOR, SettingKey};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid setting key: {0}")]
    InvalidKey(String),

    #[error("invalid save id: {0}")]
    InvalidSaveId(String),
}
