//! Administrator staging of proposed changes for other participants.
//!
//! Staged values are written to the target's attached records and offered
//! to the target on their next reconciliation pass.

use concord_model::{ConfigRegistry, SettingScope, value_at_path, values_equal};
use concord_storage::{IdentityStore, Participant};
use concord_types::{ParticipantId, SettingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::ReconciliationEngine;
use crate::error::{SyncError, SyncResult};
use crate::flat::FlatSettingMap;
use crate::normalizer::SettingNormalizer;
use crate::snapshot::{AdminTarget, PendingAdminDelta, SnapshotStore};

/// Per-target outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    /// Targets that received a delta, with the number of staged keys.
    pub staged: Vec<(ParticipantId, usize)>,
    /// Targets whose staging failed, with the reason.
    pub failed: Vec<(ParticipantId, String)>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One setting as an administrator sees it for a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub key: SettingKey,
    pub label: String,
    /// The target's value according to their snapshot, or the default.
    pub original: Value,
    /// The value currently staged for the target, if any.
    pub proposed: Option<Value>,
}

/// A target's effective settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetView {
    pub participant: ParticipantId,
    /// `false` when the target never saved a snapshot; the view then shows
    /// defaults only.
    pub has_saved: bool,
    pub entries: Vec<ViewEntry>,
}

impl TargetView {
    pub fn entry(&self, key: &SettingKey) -> Option<&ViewEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }
}

/// Stages administrator changes.
pub struct AdminStaging {
    registry: Arc<dyn ConfigRegistry>,
    normalizer: SettingNormalizer,
    snapshots: SnapshotStore,
}

impl AdminStaging {
    /// Shares the engine's registry, normalizer and stores.
    pub fn new(engine: &ReconciliationEngine) -> Self {
        Self {
            registry: Arc::clone(engine.normalizer().registry()),
            normalizer: engine.normalizer().clone(),
            snapshots: engine.snapshots().clone(),
        }
    }

    fn identity(&self) -> &Arc<dyn IdentityStore> {
        self.snapshots.identity()
    }

    fn require_administrator(&self, admin: ParticipantId) -> SyncResult<Participant> {
        let participant = self.identity().require_participant(admin)?;
        if !participant.is_administrator() {
            return Err(SyncError::NotAdministrator(admin));
        }
        Ok(participant)
    }

    /// Stages `proposed` (a `namespace -> key -> value` tree) for one target.
    ///
    /// Only values that differ from the target's current view are kept. The
    /// result is merged into anything already staged; proposing the target's
    /// current value withdraws an earlier proposal for that key.
    pub fn stage(
        &self,
        admin: ParticipantId,
        target: ParticipantId,
        proposed: &Value,
    ) -> SyncResult<PendingAdminDelta> {
        self.require_administrator(admin)?;
        let delta = self.stage_for(target, proposed, AdminTarget::Participant)?;
        info!("staged {} setting changes for {target}", delta.settings().len());
        Ok(delta)
    }

    /// Stages `proposed` for every target as a broadcast.
    ///
    /// A failure for one target is reported and does not stop the others.
    pub fn stage_broadcast(
        &self,
        admin: ParticipantId,
        targets: &[ParticipantId],
        proposed: &Value,
    ) -> SyncResult<BroadcastReport> {
        self.require_administrator(admin)?;
        let mut report = BroadcastReport::default();
        for &target in targets {
            match self.stage_for(target, proposed, AdminTarget::Broadcast) {
                Ok(delta) => report.staged.push((target, delta.settings().len())),
                Err(e) => {
                    warn!("failed to stage settings for {target}: {e}");
                    report.failed.push((target, e.to_string()));
                }
            }
        }
        info!(
            "broadcast staged for {} participants, {} failed",
            report.staged.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn stage_for(
        &self,
        target: ParticipantId,
        proposed: &Value,
        kind: AdminTarget,
    ) -> SyncResult<PendingAdminDelta> {
        let participant = self.identity().require_participant(target)?;
        let may_restrict = participant.role.can_modify_settings();
        let view = self.baseline_view(target)?;

        let mut delta = self.snapshots.read_staged(target, kind)?.into_settings();
        for (key, value) in self.normalizer.normalize(proposed).iter() {
            let Some(definition) = self.registry.definition(key.namespace(), key.key()) else {
                continue;
            };
            if definition.scope != SettingScope::Local || (definition.restricted && !may_restrict) {
                continue;
            }
            let current = view
                .get(key)
                .or_else(|| value_at_path(&definition.default, &key.path()[1..]));
            if current.is_some_and(|c| values_equal(c, value)) {
                delta.remove(key);
            } else {
                delta.insert(key.clone(), value.clone());
            }
        }

        let delta = PendingAdminDelta::new(delta);
        self.snapshots.stage_admin_delta(target, kind, &delta)?;
        Ok(delta)
    }

    /// The target's snapshot with defaults filled in.
    fn baseline_view(&self, target: ParticipantId) -> SyncResult<FlatSettingMap> {
        let snapshot = self
            .snapshots
            .load(target)?
            .map(|s| s.settings)
            .unwrap_or_default();
        Ok(self.normalizer.merge_defaults(&snapshot))
    }

    /// The target's effective settings with any staged proposals.
    pub fn view(&self, target: ParticipantId) -> SyncResult<TargetView> {
        self.identity().require_participant(target)?;
        let has_saved = self.snapshots.has_saved(target)?;
        if !has_saved {
            warn!("{target} has never saved settings; showing defaults");
        }
        let original = self.baseline_view(target)?;
        let staged = self.snapshots.read_admin_delta(target)?.into_settings();

        let mut keys: Vec<&SettingKey> = original.keys().chain(staged.keys()).collect();
        keys.sort();
        keys.dedup();

        let entries = keys
            .into_iter()
            .filter_map(|key| {
                let definition = self.registry.definition(key.namespace(), key.key())?;
                let value = original
                    .get(key)
                    .or_else(|| value_at_path(&definition.default, &key.path()[1..]))
                    .cloned()
                    .unwrap_or(Value::Null);
                Some(ViewEntry {
                    key: key.clone(),
                    label: definition.label().to_string(),
                    original: value,
                    proposed: staged.get(key).cloned(),
                })
            })
            .collect();

        Ok(TargetView {
            participant: target,
            has_saved,
            entries,
        })
    }
}
