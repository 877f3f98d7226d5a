//! Reconciliation engine: the per-participant state machine without I/O
//! towards the participant.
//!
//! A pass runs `Idle -> Checking`, then either returns to `Idle` or stops in
//! `AwaitingArbitration` holding the computed differences. The caller asks
//! the participant and feeds the decision back through
//! [`ReconciliationEngine::resolve`], which applies it (`Applying`, or
//! `ApplyingAdmin` when a staged delta is involved) and returns to `Idle`.
//!
//! Prompting is gated on three conditions: sync is enabled, the snapshot is
//! newer than the ignore marker, and the difference set is non-empty. Staged
//! administrator changes bypass the first two: they are always offered.

use concord_model::{
    ConfigRegistry, RegistryError, insert_at_path, remove_at_path, value_at_path,
};
use concord_storage::IdentityStore;
use concord_types::{ParticipantId, SaveId, SettingKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::arbitration::{ArbitrationDecision, Resolution};
use crate::config::SyncConfig;
use crate::diff::{ChangeOrigin, DifferenceEngine, DifferenceSet, SettingChange};
use crate::error::{SyncError, SyncResult};
use crate::flat::FlatSettingMap;
use crate::normalizer::SettingNormalizer;
use crate::snapshot::{PendingAdminDelta, SnapshotStore};

/// Where a participant's reconciliation currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    #[default]
    Idle,
    Checking,
    AwaitingArbitration,
    Applying,
    ApplyingAdmin,
}

/// Result of starting a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Sync is switched off and nothing was staged.
    Disabled,
    /// First sight of this participant: a snapshot was written, no prompt.
    InitialSave(SaveId),
    /// The ignore marker covers the current snapshot.
    Suppressed {
        save_id: SaveId,
        ignore_id: SaveId,
    },
    NoDifferences,
    /// Differences need arbitration. The pass now awaits
    /// [`ReconciliationEngine::resolve`].
    Prompt(DifferenceSet),
    /// An administrator push arrived while a pass awaits arbitration; it
    /// runs once that pass is resolved.
    Queued,
}

/// What applying a decision did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Keys written to local storage.
    pub applied: Vec<SettingKey>,
    /// Keys whose local value was kept in the baseline.
    pub retained: Vec<SettingKey>,
    /// Keys left for the next pass.
    pub skipped: Vec<SettingKey>,
    /// Administrator changes written to local storage.
    pub admin_applied: usize,
    /// An applied change requires a reload.
    pub requires_reload: bool,
    /// Counter of the snapshot written after applying, if any.
    pub snapshot: Option<SaveId>,
    /// The staged delta is fully consumed.
    pub admin_delta_cleared: bool,
    /// The ignore marker was set to this counter.
    pub ignored: Option<SaveId>,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.retained.is_empty() && self.snapshot.is_none()
    }
}

#[derive(Debug)]
struct PendingPass {
    baseline: FlatSettingMap,
    save_id: SaveId,
    admin: Option<PendingAdminDelta>,
    differences: DifferenceSet,
}

#[derive(Debug, Default)]
struct ParticipantState {
    state: ReconcileState,
    pending: Option<PendingPass>,
    queued_admin_push: bool,
    reload_pending: bool,
}

/// Everything a pass computes before deciding whether to prompt.
struct Computed {
    baseline: FlatSettingMap,
    save_id: SaveId,
    ignore_id: Option<SaveId>,
    initial_save: bool,
    admin: Option<PendingAdminDelta>,
    differences: DifferenceSet,
}

/// Stateful reconciliation for every participant on this client.
pub struct ReconciliationEngine {
    registry: Arc<dyn ConfigRegistry>,
    config: Arc<SyncConfig>,
    normalizer: SettingNormalizer,
    differ: DifferenceEngine,
    snapshots: SnapshotStore,
    states: Mutex<HashMap<ParticipantId, ParticipantState>>,
}

impl ReconciliationEngine {
    pub fn new(
        registry: Arc<dyn ConfigRegistry>,
        identity: Arc<dyn IdentityStore>,
        config: Arc<SyncConfig>,
    ) -> Self {
        let normalizer = SettingNormalizer::new(Arc::clone(&registry), Arc::clone(&config));
        Self {
            differ: DifferenceEngine::new(Arc::clone(&registry), Arc::clone(&config)),
            snapshots: SnapshotStore::new(identity, normalizer.clone()),
            normalizer,
            registry,
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &SettingNormalizer {
        &self.normalizer
    }

    pub fn differ(&self) -> &DifferenceEngine {
        &self.differ
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn sync_enabled(&self) -> bool {
        self.config.sync_enabled(self.registry.as_ref())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ParticipantId, ParticipantState>> {
        // The state map holds no invariants a panicking holder could break.
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self, participant: ParticipantId) -> ReconcileState {
        self.lock()
            .get(&participant)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    fn set_state(&self, participant: ParticipantId, state: ReconcileState) {
        self.lock().entry(participant).or_default().state = state;
    }

    fn require_participant(&self, participant: ParticipantId) -> SyncResult<()> {
        self.snapshots.identity().require_participant(participant)?;
        Ok(())
    }

    // ── Passes ───────────────────────────────────────────────────

    /// Starts a reconciliation pass (session ready).
    ///
    /// Fails with [`SyncError::ArbitrationPending`] while an earlier pass
    /// awaits arbitration.
    pub fn check(&self, participant: ParticipantId) -> SyncResult<CheckOutcome> {
        self.require_participant(participant)?;
        {
            let mut states = self.lock();
            let entry = states.entry(participant).or_default();
            if entry.state == ReconcileState::AwaitingArbitration {
                return Err(SyncError::ArbitrationPending(participant));
            }
            entry.state = ReconcileState::Checking;
        }

        let result = self.run_check(participant);
        match &result {
            Ok(CheckOutcome::Prompt(_)) => {}
            _ => self.set_state(participant, ReconcileState::Idle),
        }
        result
    }

    /// Handles an administrator push notification.
    ///
    /// Queued while a pass awaits arbitration; otherwise runs a pass when a
    /// staged delta exists.
    pub fn begin_admin_push(&self, participant: ParticipantId) -> SyncResult<CheckOutcome> {
        {
            let mut states = self.lock();
            let entry = states.entry(participant).or_default();
            if entry.state == ReconcileState::AwaitingArbitration {
                entry.queued_admin_push = true;
                debug!("queued administrator push for {participant}");
                return Ok(CheckOutcome::Queued);
            }
        }
        self.require_participant(participant)?;
        if !self.snapshots.has_pending_admin_delta(participant)? {
            return Ok(CheckOutcome::NoDifferences);
        }
        self.check(participant)
    }

    /// Returns and clears the queued administrator push flag.
    pub fn take_queued_admin_push(&self, participant: ParticipantId) -> bool {
        self.lock()
            .get_mut(&participant)
            .map(|s| std::mem::take(&mut s.queued_admin_push))
            .unwrap_or(false)
    }

    /// Returns and clears the pending-reload flag.
    pub fn take_reload_pending(&self, participant: ParticipantId) -> bool {
        self.lock()
            .get_mut(&participant)
            .map(|s| std::mem::take(&mut s.reload_pending))
            .unwrap_or(false)
    }

    fn run_check(&self, participant: ParticipantId) -> SyncResult<CheckOutcome> {
        let enabled = self.sync_enabled();
        let has_admin = self.snapshots.has_pending_admin_delta(participant)?;
        if !enabled && !has_admin {
            debug!("sync disabled for {participant}");
            return Ok(CheckOutcome::Disabled);
        }

        let computed = self.compute(participant, enabled)?;
        let own_drift_allowed = enabled
            && !computed.initial_save
            && computed.ignore_id.is_none_or(|ignore| computed.save_id > ignore);

        let mut differences = computed.differences;
        if !own_drift_allowed {
            differences.retain(|c| c.origin == ChangeOrigin::Administrator);
        }

        if differences.is_empty() {
            let mut save_id = computed.save_id;
            if let Some(admin) = &computed.admin {
                // Every staged value already matches the local state.
                debug!(
                    "staged administrator changes for {participant} already applied ({} keys)",
                    admin.settings().len()
                );
                self.snapshots.clear_admin_delta(participant)?;
                if !computed.initial_save {
                    // The snapshot must carry the accepted values, otherwise
                    // the next pass offers to restore the old ones.
                    let mut baseline = computed.baseline.clone();
                    baseline.overlay(admin.settings());
                    save_id = self
                        .snapshots
                        .write_snapshot(participant, &self.normalizer.clean_map(&baseline))?;
                    info!("snapshot {save_id} for {participant} takes in applied administrator changes");
                }
            }
            if computed.initial_save {
                return Ok(CheckOutcome::InitialSave(save_id));
            }
            if let Some(ignore_id) = computed.ignore_id.filter(|_| !own_drift_allowed && enabled) {
                return Ok(CheckOutcome::Suppressed { save_id, ignore_id });
            }
            return Ok(CheckOutcome::NoDifferences);
        }

        info!(
            "{} setting differences for {participant}, awaiting arbitration",
            differences.len()
        );
        let mut states = self.lock();
        let entry = states.entry(participant).or_default();
        entry.state = ReconcileState::AwaitingArbitration;
        entry.pending = Some(PendingPass {
            baseline: computed.baseline,
            save_id: computed.save_id,
            admin: computed.admin,
            differences: differences.clone(),
        });
        Ok(CheckOutcome::Prompt(differences))
    }

    /// Loads the baseline, overlays any staged delta and diffs it against
    /// the live configuration.
    fn compute(&self, participant: ParticipantId, enabled: bool) -> SyncResult<Computed> {
        let (baseline, save_id, initial_save) = match self.snapshots.load(participant)? {
            Some(snapshot) => (snapshot.settings, snapshot.save_id, false),
            None if enabled => {
                let save_id = self.snapshots.save(participant)?;
                info!("initial settings snapshot {save_id} saved for {participant}");
                let baseline = self
                    .snapshots
                    .load(participant)?
                    .map(|s| s.settings)
                    .unwrap_or_default();
                (baseline, save_id, true)
            }
            None => (FlatSettingMap::new(), SaveId::ZERO, false),
        };
        let ignore_id = self.snapshots.ignore_id(participant)?;
        let admin = self.snapshots.read_admin_delta(participant)?;
        let admin = (!admin.is_empty()).then_some(admin);

        let live = self.registry.live_config_tree();
        let current = self.normalizer.merge_defaults(&self.normalizer.clean_live(&live));
        let mut incoming = self.normalizer.merge_defaults(&baseline);
        if let Some(admin) = &admin {
            incoming.overlay(admin.settings());
        }

        let mut differences = self.differ.diff(&current, &incoming);
        if let Some(admin) = &admin {
            let staged = admin.settings();
            differences.mark_origin(ChangeOrigin::Administrator, |key| staged_covers(staged, key));
        }

        Ok(Computed {
            baseline,
            save_id,
            ignore_id,
            initial_save,
            admin,
            differences,
        })
    }

    /// The full difference set for a participant, ignoring the prompt gate.
    /// Does not change any state.
    pub fn get_differences(&self, participant: ParticipantId) -> SyncResult<DifferenceSet> {
        self.require_participant(participant)?;
        let saved = self.snapshots.has_saved(participant)?;
        let mut differences = self.compute(participant, false)?.differences;
        if !saved {
            differences.retain(|c| c.origin == ChangeOrigin::Administrator);
        }
        Ok(differences)
    }

    // ── Applying ─────────────────────────────────────────────────

    /// Applies the participant's decision for the pass awaiting arbitration.
    ///
    /// Write failures propagate; the pass is abandoned and the state returns
    /// to `Idle`, so the next pass derives the same differences again.
    pub fn resolve(
        &self,
        participant: ParticipantId,
        decision: ArbitrationDecision,
    ) -> SyncResult<ApplyReport> {
        let pending = {
            let mut states = self.lock();
            let entry = states.entry(participant).or_default();
            if entry.state != ReconcileState::AwaitingArbitration {
                return Err(SyncError::NoPendingArbitration(participant));
            }
            let Some(pending) = entry.pending.take() else {
                entry.state = ReconcileState::Idle;
                return Err(SyncError::NoPendingArbitration(participant));
            };
            entry.state = if pending.admin.is_some() {
                ReconcileState::ApplyingAdmin
            } else {
                ReconcileState::Applying
            };
            pending
        };

        let result = match decision {
            ArbitrationDecision::Confirm(resolved) => self.apply(participant, pending, &resolved),
            ArbitrationDecision::Dismiss => {
                debug!("arbitration dismissed by {participant}");
                Ok(ApplyReport::default())
            }
            ArbitrationDecision::Ignore => self
                .snapshots
                .set_ignore_id(participant, pending.save_id)
                .map(|()| {
                    info!("ignoring setting differences for {participant} up to {}", pending.save_id);
                    ApplyReport {
                        ignored: Some(pending.save_id),
                        ..ApplyReport::default()
                    }
                }),
        };

        let mut states = self.lock();
        let entry = states.entry(participant).or_default();
        entry.state = ReconcileState::Idle;
        if let Ok(report) = &result {
            entry.reload_pending |= report.requires_reload;
        }
        result
    }

    fn apply(
        &self,
        participant: ParticipantId,
        pending: PendingPass,
        resolved: &DifferenceSet,
    ) -> SyncResult<ApplyReport> {
        let PendingPass {
            mut baseline,
            admin,
            differences,
            ..
        } = pending;
        let mut report = ApplyReport::default();
        let mut amended = false;
        let mut remaining = FlatSettingMap::new();

        // Only records of the pending pass count; resolutions come from the
        // participant's copy.
        for change in differences.records() {
            let resolution = resolved
                .record(&change.key)
                .map_or(Resolution::None, |c| c.resolution);
            match resolution {
                Resolution::UseNew => {
                    self.write_local(change)?;
                    info!(
                        "setting sync: {}: \"{}\" -> \"{}\"",
                        change.key, change.old_display, change.new_display
                    );
                    match &change.new_value {
                        Some(value) => baseline.insert(change.key.clone(), value.clone()),
                        None => baseline.remove(&change.key),
                    };
                    if change.origin == ChangeOrigin::Administrator {
                        report.admin_applied += 1;
                    }
                    report.requires_reload |= change.requires_reload;
                    report.applied.push(change.key.clone());
                }
                Resolution::UseOld => {
                    match &change.old_value {
                        Some(value) => baseline.insert(change.key.clone(), value.clone()),
                        None => baseline.remove(&change.key),
                    };
                    amended = true;
                    debug!("keeping local value for {}", change.key);
                    report.retained.push(change.key.clone());
                }
                Resolution::None => {
                    if change.origin == ChangeOrigin::Administrator {
                        if let Some(value) = &change.new_value {
                            remaining.insert(change.key.clone(), value.clone());
                        }
                    }
                    report.skipped.push(change.key.clone());
                }
            }
        }

        if admin.is_some() {
            let remaining = PendingAdminDelta::new(remaining);
            self.snapshots.replace_admin_delta(participant, &remaining)?;
            report.admin_delta_cleared = remaining.is_empty();
        }

        if amended || admin.is_some() {
            let cleaned = self.normalizer.clean_map(&baseline);
            report.snapshot = Some(self.snapshots.write_snapshot(participant, &cleaned)?);
        }

        Ok(report)
    }

    /// Writes a change's new value to local storage. Fields of a structured
    /// setting are written by rewriting the whole setting. An absent new
    /// value restores the default.
    fn write_local(&self, change: &SettingChange) -> SyncResult<()> {
        let key = &change.key;
        let definition = self
            .registry
            .definition(key.namespace(), key.key())
            .ok_or_else(|| RegistryError::UnknownSetting(key.setting().to_string()))?;

        if !key.is_nested() {
            let value = change.new_value.as_ref().unwrap_or(&definition.default);
            self.registry
                .set_live_value(key.namespace(), key.key(), value)?;
            return Ok(());
        }

        let fields = &key.path()[1..];
        let mut whole = match self.registry.live_value(key.namespace(), key.key()) {
            Some(Value::Object(map)) => map,
            _ => match &definition.default {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            },
        };
        let segments: Vec<&str> = fields.iter().map(String::as_str).collect();
        match change
            .new_value
            .as_ref()
            .or_else(|| value_at_path(&definition.default, fields))
        {
            Some(value) => insert_at_path(&mut whole, &segments, value.clone()),
            None => {
                remove_at_path(&mut whole, fields);
            }
        }
        self.registry
            .set_live_value(key.namespace(), key.key(), &Value::Object(whole))?;
        Ok(())
    }

    // ── Other operations ─────────────────────────────────────────

    /// Snapshots the live configuration now.
    pub fn save_settings(&self, participant: ParticipantId) -> SyncResult<SaveId> {
        self.require_participant(participant)?;
        let save_id = self.snapshots.save(participant)?;
        info!("settings snapshot {save_id} saved for {participant}");
        Ok(save_id)
    }

    /// Re-snapshots after the participant edited their settings, when sync
    /// is enabled.
    pub fn settings_edited(&self, participant: ParticipantId) -> SyncResult<Option<SaveId>> {
        if !self.sync_enabled() {
            return Ok(None);
        }
        self.save_settings(participant).map(Some)
    }

    /// Removes the ignore marker so the next pass prompts again.
    pub fn reset_ignore_marker(&self, participant: ParticipantId) -> SyncResult<()> {
        self.require_participant(participant)?;
        self.snapshots.clear_ignore_id(participant)?;
        info!("ignore marker reset for {participant}");
        Ok(())
    }
}

/// Whether a staged entry addresses `key` or one of its ancestors.
fn staged_covers(staged: &FlatSettingMap, key: &SettingKey) -> bool {
    staged.keys().any(|k| {
        k.namespace() == key.namespace()
            && (key.path().starts_with(k.path()) || k.path().starts_with(key.path()))
    })
}
