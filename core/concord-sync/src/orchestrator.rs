//! Async orchestration: asks the participant and runs passes in order.
//!
//! The engine is synchronous and never waits on anyone. The orchestrator
//! hands a pass awaiting arbitration to an [`Arbiter`] (the host's dialog),
//! feeds the decision back, drains administrator pushes that queued up
//! meanwhile, and requests a reload when an applied change needs one.

use async_trait::async_trait;
use concord_types::{ParticipantId, SaveId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::arbitration::ArbitrationDecision;
use crate::diff::DifferenceSet;
use crate::engine::{ApplyReport, CheckOutcome, ReconciliationEngine};
use crate::error::{SyncError, SyncResult};

/// Capacity of the command and event channels.
const CHANNEL_CAPACITY: usize = 32;

/// Something the participant should be told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Changes staged by an administrator were written to local storage.
    AdminChangesApplied { count: usize },
    /// Differences are ignored until the next save.
    DifferencesIgnored { save_id: SaveId },
}

/// The participant-facing side of reconciliation.
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// Presents the differences and waits for the participant's decision.
    /// There is no timeout.
    async fn arbitrate(
        &self,
        participant: ParticipantId,
        differences: DifferenceSet,
    ) -> ArbitrationDecision;

    /// Asks the participant to reload the host.
    async fn request_reload(&self, participant: ParticipantId);

    async fn notify(&self, participant: ParticipantId, notice: Notice);
}

/// What a pass did, including any queued administrator passes it drained.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    pub outcome: CheckOutcome,
    pub reports: Vec<ApplyReport>,
    pub requires_reload: bool,
}

/// Public entry points of the reconciliation layer.
pub struct SettingsSync {
    engine: Arc<ReconciliationEngine>,
    arbiter: Arc<dyn Arbiter>,
}

impl SettingsSync {
    pub fn new(engine: Arc<ReconciliationEngine>, arbiter: Arc<dyn Arbiter>) -> Self {
        Self { engine, arbiter }
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Runs a full pass at session start.
    pub async fn check_settings(&self, participant: ParticipantId) -> SyncResult<PassSummary> {
        let outcome = self.engine.check(participant)?;
        self.run_pass(participant, outcome).await
    }

    /// Offers staged administrator changes. Returns whether a reload is
    /// required.
    pub async fn refresh_settings(&self, participant: ParticipantId) -> SyncResult<bool> {
        let outcome = self.engine.begin_admin_push(participant)?;
        Ok(self.run_pass(participant, outcome).await?.requires_reload)
    }

    pub fn save_settings(&self, participant: ParticipantId) -> SyncResult<SaveId> {
        self.engine.save_settings(participant)
    }

    pub fn get_differences(&self, participant: ParticipantId) -> SyncResult<DifferenceSet> {
        self.engine.get_differences(participant)
    }

    /// Called after the participant edited their settings.
    pub fn settings_edited(&self, participant: ParticipantId) -> SyncResult<Option<SaveId>> {
        self.engine.settings_edited(participant)
    }

    /// Removes the ignore marker and asks for a reload.
    pub async fn reset_ignore_marker(&self, participant: ParticipantId) -> SyncResult<()> {
        self.engine.reset_ignore_marker(participant)?;
        self.arbiter.request_reload(participant).await;
        Ok(())
    }

    async fn run_pass(
        &self,
        participant: ParticipantId,
        outcome: CheckOutcome,
    ) -> SyncResult<PassSummary> {
        // The pass that queued this push drains it.
        if matches!(outcome, CheckOutcome::Queued) {
            return Ok(PassSummary {
                outcome,
                reports: Vec::new(),
                requires_reload: false,
            });
        }

        let first = outcome.clone();
        let mut outcome = outcome;
        let mut reports = Vec::new();
        loop {
            if let CheckOutcome::Prompt(differences) = outcome {
                let decision = self.arbiter.arbitrate(participant, differences).await;
                let report = self.engine.resolve(participant, decision)?;
                if report.admin_applied > 0 {
                    self.arbiter
                        .notify(
                            participant,
                            Notice::AdminChangesApplied {
                                count: report.admin_applied,
                            },
                        )
                        .await;
                }
                if let Some(save_id) = report.ignored {
                    self.arbiter
                        .notify(participant, Notice::DifferencesIgnored { save_id })
                        .await;
                }
                reports.push(report);
            }
            if !self.engine.take_queued_admin_push(participant) {
                break;
            }
            debug!("running queued administrator push for {participant}");
            outcome = self.engine.begin_admin_push(participant)?;
        }

        let requires_reload = self.engine.take_reload_pending(participant);
        if requires_reload {
            info!("reload required for {participant}");
            self.arbiter.request_reload(participant).await;
        }
        Ok(PassSummary {
            outcome: first,
            reports,
            requires_reload,
        })
    }

    /// Moves this instance into a background task that processes commands
    /// strictly in order.
    pub fn spawn(self) -> SyncHandle {
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            self.run_command_loop(command_rx, event_tx).await;
        });
        SyncHandle {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }

    async fn run_command_loop(
        self,
        mut commands: mpsc::Receiver<SyncCommand>,
        events: mpsc::Sender<SyncEvent>,
    ) {
        while let Some(command) = commands.recv().await {
            let event = match command {
                SyncCommand::SessionReady(participant) => {
                    match self.check_settings(participant).await {
                        Ok(summary) => SyncEvent::PassCompleted {
                            participant,
                            summary,
                        },
                        Err(e) => failed(participant, e),
                    }
                }
                SyncCommand::AdminPush(participant) => {
                    match self.engine.begin_admin_push(participant) {
                        Ok(outcome) => match self.run_pass(participant, outcome).await {
                            Ok(summary) => SyncEvent::PassCompleted {
                                participant,
                                summary,
                            },
                            Err(e) => failed(participant, e),
                        },
                        Err(e) => failed(participant, e),
                    }
                }
                SyncCommand::SettingsEdited(participant) => {
                    match self.settings_edited(participant) {
                        Ok(save_id) => SyncEvent::Saved {
                            participant,
                            save_id,
                        },
                        Err(e) => failed(participant, e),
                    }
                }
                SyncCommand::ResetIgnore(participant) => {
                    match self.reset_ignore_marker(participant).await {
                        Ok(()) => SyncEvent::IgnoreReset { participant },
                        Err(e) => failed(participant, e),
                    }
                }
                SyncCommand::Shutdown => break,
            };
            if events.send(event).await.is_err() {
                debug!("event receiver dropped");
            }
        }
        let _ = events.send(SyncEvent::Stopped).await;
        debug!("settings sync task stopped");
    }
}

fn failed(participant: ParticipantId, error: SyncError) -> SyncEvent {
    warn!("settings sync failed for {participant}: {error}");
    SyncEvent::Failed {
        participant,
        error: error.to_string(),
    }
}

/// Lifecycle triggers processed by the background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    SessionReady(ParticipantId),
    /// An administrator staged changes for the participant.
    AdminPush(ParticipantId),
    SettingsEdited(ParticipantId),
    ResetIgnore(ParticipantId),
    Shutdown,
}

/// Results reported by the background task, one per command.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PassCompleted {
        participant: ParticipantId,
        summary: PassSummary,
    },
    Saved {
        participant: ParticipantId,
        /// `None` when sync is disabled.
        save_id: Option<SaveId>,
    },
    IgnoreReset {
        participant: ParticipantId,
    },
    Failed {
        participant: ParticipantId,
        error: String,
    },
    Stopped,
}

/// Handle to a spawned [`SettingsSync`].
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    events: mpsc::Receiver<SyncEvent>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub async fn send(&self, command: SyncCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    pub async fn session_ready(&self, participant: ParticipantId) -> SyncResult<()> {
        self.send(SyncCommand::SessionReady(participant)).await
    }

    pub async fn admin_push(&self, participant: ParticipantId) -> SyncResult<()> {
        self.send(SyncCommand::AdminPush(participant)).await
    }

    pub async fn settings_edited(&self, participant: ParticipantId) -> SyncResult<()> {
        self.send(SyncCommand::SettingsEdited(participant)).await
    }

    pub async fn reset_ignore(&self, participant: ParticipantId) -> SyncResult<()> {
        self.send(SyncCommand::ResetIgnore(participant)).await
    }

    /// Waits for the next event. `None` once the task is gone and all
    /// events were received.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// Stops the task after the commands already sent, and waits for it.
    pub async fn shutdown(self) -> SyncResult<()> {
        let SyncHandle {
            commands,
            events,
            task,
        } = self;
        drop(events);
        commands
            .send(SyncCommand::Shutdown)
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        task.await.map_err(|_| SyncError::ChannelClosed)
    }
}
