use concord_types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{StorageError, StorageResult};

/// Privilege level of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Member,
    /// May modify shared and restricted settings but not stage changes for others.
    Moderator,
    /// May modify everything and stage changes for other participants.
    Administrator,
}

impl ParticipantRole {
    pub fn can_modify_settings(&self) -> bool {
        matches!(self, ParticipantRole::Moderator | ParticipantRole::Administrator)
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParticipantRole::Member => "member",
            ParticipantRole::Moderator => "moderator",
            ParticipantRole::Administrator => "administrator",
        };
        f.write_str(s)
    }
}

impl FromStr for ParticipantRole {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(ParticipantRole::Member),
            "moderator" => Ok(ParticipantRole::Moderator),
            "administrator" => Ok(ParticipantRole::Administrator),
            other => Err(StorageError::InvalidData(format!("unknown role: {other}"))),
        }
    }
}

/// An account whose local configuration is synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: ParticipantRole,
}

impl Participant {
    pub fn new(name: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            id: ParticipantId::new(),
            name: name.into(),
            role,
        }
    }

    pub fn member(name: impl Into<String>) -> Self {
        Self::new(name, ParticipantRole::Member)
    }

    pub fn administrator(name: impl Into<String>) -> Self {
        Self::new(name, ParticipantRole::Administrator)
    }

    pub fn is_administrator(&self) -> bool {
        self.role == ParticipantRole::Administrator
    }
}

/// Generic per-participant key-value persistence.
///
/// Record operations on a participant without an identity fail with
/// [`StorageError::UnknownParticipant`].
pub trait IdentityStore: Send + Sync {
    /// Creates or replaces a participant identity.
    fn upsert_participant(&self, participant: &Participant) -> StorageResult<()>;

    fn participant(&self, id: ParticipantId) -> StorageResult<Option<Participant>>;

    fn participants(&self) -> StorageResult<Vec<Participant>>;

    fn get_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
    ) -> StorageResult<Option<String>>;

    fn set_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<()>;

    /// Removes a record. Clearing an absent record is not an error.
    fn clear_attached_record(
        &self,
        id: ParticipantId,
        namespace: &str,
        field: &str,
    ) -> StorageResult<()>;

    /// Fails with [`StorageError::UnknownParticipant`] if there is no identity.
    fn require_participant(&self, id: ParticipantId) -> StorageResult<Participant> {
        self.participant(id)?
            .ok_or(StorageError::UnknownParticipant(id))
    }
}
