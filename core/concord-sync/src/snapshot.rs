//! Persisted per-participant records.
//!
//! Everything lives in the participant's attached records under the
//! configured namespace:
//!
//! | field | content |
//! |---|---|
//! | `client-settings` | cleaned snapshot as a JSON tree |
//! | `save-id` | snapshot counter, integer string |
//! | `ignore-id` | ignore marker, integer string |
//! | `gm-settings` | staged administrator delta for this participant |
//! | `players-settings` | staged administrator delta broadcast to everyone |
//!
//! Malformed JSON or counters are treated as absent data and logged.

use concord_storage::IdentityStore;
use concord_types::{ParticipantId, SaveId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::flat::FlatSettingMap;
use crate::normalizer::SettingNormalizer;

pub const CLIENT_SETTINGS_FIELD: &str = "client-settings";
pub const SAVE_ID_FIELD: &str = "save-id";
pub const IGNORE_ID_FIELD: &str = "ignore-id";
pub const ADMIN_SETTINGS_FIELD: &str = "gm-settings";
pub const BROADCAST_SETTINGS_FIELD: &str = "players-settings";

/// A participant's last persisted configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub settings: FlatSettingMap,
    pub save_id: SaveId,
}

/// Changes an administrator proposed for a participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingAdminDelta(FlatSettingMap);

impl PendingAdminDelta {
    pub fn new(settings: FlatSettingMap) -> Self {
        Self(settings)
    }

    pub fn settings(&self) -> &FlatSettingMap {
        &self.0
    }

    pub fn into_settings(self) -> FlatSettingMap {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<FlatSettingMap> for PendingAdminDelta {
    fn from(settings: FlatSettingMap) -> Self {
        Self(settings)
    }
}

/// Which staged-change record an administrator writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminTarget {
    /// Staged for one participant (`gm-settings`).
    Participant,
    /// Staged for every participant (`players-settings`).
    Broadcast,
}

impl AdminTarget {
    pub fn field(&self) -> &'static str {
        match self {
            AdminTarget::Participant => ADMIN_SETTINGS_FIELD,
            AdminTarget::Broadcast => BROADCAST_SETTINGS_FIELD,
        }
    }
}

/// Reads and writes snapshots, counters and staged deltas.
#[derive(Clone)]
pub struct SnapshotStore {
    identity: Arc<dyn IdentityStore>,
    normalizer: SettingNormalizer,
}

impl SnapshotStore {
    pub fn new(identity: Arc<dyn IdentityStore>, normalizer: SettingNormalizer) -> Self {
        Self {
            identity,
            normalizer,
        }
    }

    pub fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.identity
    }

    fn namespace(&self) -> &str {
        &self.normalizer.config().namespace
    }

    fn get(&self, participant: ParticipantId, field: &str) -> SyncResult<Option<String>> {
        Ok(self
            .identity
            .get_attached_record(participant, self.namespace(), field)?)
    }

    fn set(&self, participant: ParticipantId, field: &str, value: &str) -> SyncResult<()> {
        Ok(self
            .identity
            .set_attached_record(participant, self.namespace(), field, value)?)
    }

    fn clear(&self, participant: ParticipantId, field: &str) -> SyncResult<()> {
        Ok(self
            .identity
            .clear_attached_record(participant, self.namespace(), field)?)
    }

    // ── Snapshot ─────────────────────────────────────────────────

    /// Snapshots the participant's live local configuration.
    ///
    /// Concurrent saves for one participant are last-write-wins.
    pub fn save(&self, participant: ParticipantId) -> SyncResult<SaveId> {
        let live = self.normalizer.registry().live_config_tree();
        let cleaned = self.normalizer.clean_live(&live);
        self.write_snapshot(participant, &cleaned)
    }

    /// Persists `settings` as the snapshot and advances the counter.
    pub fn write_snapshot(
        &self,
        participant: ParticipantId,
        settings: &FlatSettingMap,
    ) -> SyncResult<SaveId> {
        let save_id = self.save_id(participant)?.next();
        let text = serde_json::to_string(settings)?;
        self.set(participant, CLIENT_SETTINGS_FIELD, &text)?;
        self.set(participant, SAVE_ID_FIELD, &save_id.to_string())?;
        debug!(
            "saved snapshot {save_id} for {participant} ({} settings)",
            settings.len()
        );
        Ok(save_id)
    }

    /// Returns the last snapshot, re-cleaned against the current definitions.
    ///
    /// `None` the first time a participant is seen. A snapshot that is not
    /// valid JSON loads as empty.
    pub fn load(&self, participant: ParticipantId) -> SyncResult<Option<Snapshot>> {
        let Some(text) = self.get(participant, CLIENT_SETTINGS_FIELD)? else {
            return Ok(None);
        };
        let tree = parse_tree(&text, CLIENT_SETTINGS_FIELD, participant);
        Ok(Some(Snapshot {
            settings: self.normalizer.clean(&tree),
            save_id: self.save_id(participant)?,
        }))
    }

    /// Whether a snapshot was ever written.
    pub fn has_saved(&self, participant: ParticipantId) -> SyncResult<bool> {
        Ok(self.get(participant, CLIENT_SETTINGS_FIELD)?.is_some())
    }

    // ── Counters ─────────────────────────────────────────────────

    /// The snapshot counter; zero if never saved or unreadable.
    pub fn save_id(&self, participant: ParticipantId) -> SyncResult<SaveId> {
        Ok(self
            .read_counter(participant, SAVE_ID_FIELD)?
            .unwrap_or(SaveId::ZERO))
    }

    /// The ignore marker, if one is set and readable.
    pub fn ignore_id(&self, participant: ParticipantId) -> SyncResult<Option<SaveId>> {
        self.read_counter(participant, IGNORE_ID_FIELD)
    }

    pub fn set_ignore_id(&self, participant: ParticipantId, save_id: SaveId) -> SyncResult<()> {
        self.set(participant, IGNORE_ID_FIELD, &save_id.to_string())
    }

    pub fn clear_ignore_id(&self, participant: ParticipantId) -> SyncResult<()> {
        self.clear(participant, IGNORE_ID_FIELD)
    }

    fn read_counter(&self, participant: ParticipantId, field: &str) -> SyncResult<Option<SaveId>> {
        let Some(text) = self.get(participant, field)? else {
            return Ok(None);
        };
        match text.parse::<SaveId>() {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!("ignoring unreadable {field} for {participant}: {e}");
                Ok(None)
            }
        }
    }

    // ── Administrator deltas ─────────────────────────────────────

    /// The combined staged delta: the broadcast delta with the
    /// participant-specific one written over it.
    pub fn read_admin_delta(&self, participant: ParticipantId) -> SyncResult<PendingAdminDelta> {
        let mut combined = self.read_staged(participant, AdminTarget::Broadcast)?.into_settings();
        combined.overlay(self.read_staged(participant, AdminTarget::Participant)?.settings());
        Ok(PendingAdminDelta::new(combined))
    }

    /// One staged record, normalized. Values equal to the default are kept:
    /// they propose a reset.
    pub fn read_staged(
        &self,
        participant: ParticipantId,
        target: AdminTarget,
    ) -> SyncResult<PendingAdminDelta> {
        let Some(text) = self.get(participant, target.field())? else {
            return Ok(PendingAdminDelta::default());
        };
        let tree = parse_tree(&text, target.field(), participant);
        Ok(PendingAdminDelta::new(self.normalizer.normalize(&tree)))
    }

    pub fn has_pending_admin_delta(&self, participant: ParticipantId) -> SyncResult<bool> {
        Ok(self.get(participant, ADMIN_SETTINGS_FIELD)?.is_some()
            || self.get(participant, BROADCAST_SETTINGS_FIELD)?.is_some())
    }

    pub fn stage_admin_delta(
        &self,
        participant: ParticipantId,
        target: AdminTarget,
        delta: &PendingAdminDelta,
    ) -> SyncResult<()> {
        if delta.is_empty() {
            return self.clear(participant, target.field());
        }
        let text = serde_json::to_string(delta)?;
        self.set(participant, target.field(), &text)
    }

    /// Clears both staged records.
    pub fn clear_admin_delta(&self, participant: ParticipantId) -> SyncResult<()> {
        self.clear(participant, ADMIN_SETTINGS_FIELD)?;
        self.clear(participant, BROADCAST_SETTINGS_FIELD)
    }

    /// Replaces both staged records with a single participant-specific one.
    pub fn replace_admin_delta(
        &self,
        participant: ParticipantId,
        remaining: &PendingAdminDelta,
    ) -> SyncResult<()> {
        self.clear(participant, BROADCAST_SETTINGS_FIELD)?;
        self.stage_admin_delta(participant, AdminTarget::Participant, remaining)
    }
}

fn parse_tree(text: &str, field: &str, participant: ParticipantId) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(tree @ Value::Object(_)) => tree,
        Ok(_) => {
            warn!("{field} for {participant} is not an object; treating as empty");
            Value::Object(Default::default())
        }
        Err(e) => {
            warn!("{field} for {participant} is malformed ({e}); treating as empty");
            Value::Object(Default::default())
        }
    }
}
