//! Settings reconciliation for Concord.
//!
//! Each participant keeps a local copy of their client settings. This crate
//! snapshots that copy into the participant's identity record, detects when
//! the live settings drift from the snapshot, and lets the participant decide
//! per setting which side wins. Administrators can stage changes for others;
//! those are offered in the same pass.
//!
//! ## Components
//!
//! - **Normalizer**: flattens, types and cleans configuration trees
//! - **Snapshot store**: persisted snapshot, counters and staged deltas
//! - **Difference engine**: grouped, displayable per-key differences
//! - **Arbitration**: per-field `use old` / `use new` / `none` choices
//! - **Engine**: the per-participant reconciliation state machine
//! - **Orchestrator**: async entry points and an ordered command task
//! - **Staging**: administrator-side proposals for other participants
//!
//! ## Pass
//!
//! 1. Clean the live configuration and load the last snapshot
//! 2. Overlay any staged administrator delta on the snapshot
//! 3. Diff, and stop unless sync is enabled, the snapshot is newer than the
//!    ignore marker and something differs
//! 4. Ask the participant, write `use new` values, keep `use old` values in
//!    the snapshot
//! 5. Persist the amended snapshot and request a reload if needed
//!
//! # Example
//!
//! ```
//! use concord_model::{MemoryRegistry, NamespaceInfo, SettingDefinition};
//! use concord_storage::{MemoryIdentityStore, Participant};
//! use concord_sync::{CheckOutcome, ReconciliationEngine, SyncConfig};
//! use std::sync::Arc;
//!
//! let registry = MemoryRegistry::new()
//!     .with_namespace(NamespaceInfo::module("mod-a", "Module A"))
//!     .with_setting(SettingDefinition::number("mod-a", "volume", 50));
//! let player = Participant::member("player");
//! let identity = MemoryIdentityStore::with_participants([player.clone()]);
//!
//! let engine = ReconciliationEngine::new(
//!     Arc::new(registry),
//!     Arc::new(identity),
//!     Arc::new(SyncConfig::default()),
//! );
//! let outcome = engine.check(player.id).unwrap();
//! assert!(matches!(outcome, CheckOutcome::InitialSave(_)));
//! ```

mod arbitration;
pub mod config;
mod diff;
mod engine;
mod error;
mod flat;
mod normalizer;
mod orchestrator;
pub mod snapshot;
mod staging;
pub mod telemetry;

pub use arbitration::{ArbitrationDecision, ArbitrationFlow, Resolution};
pub use config::{LogConfig, SyncConfig, Verbosity};
pub use diff::{ChangeGroup, ChangeOrigin, DifferenceEngine, DifferenceSet, SettingChange};
pub use engine::{ApplyReport, CheckOutcome, ReconcileState, ReconciliationEngine};
pub use error::{SyncError, SyncResult};
pub use flat::FlatSettingMap;
pub use normalizer::SettingNormalizer;
pub use orchestrator::{
    Arbiter, Notice, PassSummary, SettingsSync, SyncCommand, SyncEvent, SyncHandle,
};
pub use snapshot::{AdminTarget, PendingAdminDelta, Snapshot, SnapshotStore};
pub use staging::{AdminStaging, BroadcastReport, TargetView, ViewEntry};
pub use telemetry::init_tracing;
