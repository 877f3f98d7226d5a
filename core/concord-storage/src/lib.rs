//! Participant identity and attached-record storage for Concord.
//!
//! Every participant owns a set of string records keyed by
//! `(namespace, field)`. The reconciliation core keeps its snapshot, save
//! counter, ignore marker and staged administrator changes there.
//!
//! Two implementations of [`IdentityStore`] are provided:
//! - [`MemoryIdentityStore`] for hosts that keep identities in memory (and tests)
//! - [`SqliteIdentityStore`] for persistent storage in a single SQLite file

mod error;
mod identity;
mod memory;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use identity::{IdentityStore, Participant, ParticipantRole};
pub use memory::MemoryIdentityStore;
pub use sqlite::SqliteIdentityStore;
