//! Top-level mission sequencing.
//!
//! [`Orchestrator::run_mission`] runs once per process:
//!
//! 1. pre-flight fix-ups (best-effort)
//! 2. gate sequence
//! 3. candidate evaluation, only if every gate passed
//! 4. apply the winner
//! 5. arm the mission scheduler
//!
//! Failing gates put the mission in [`MissionPhase::Degraded`] but the
//! scheduler is still armed, so healing keeps running. The only errors
//! that escape are startup errors of the orchestrator itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info};
use vigil_types::{EventCategory, MissionOutcome, MissionPhase};

use crate::candidate::{CandidateEvaluator, EvaluationRound};
use crate::collaborator::{
    CandidateStrategy, IssueFixer, Publisher, VerificationGate, WinnerSink, guarded,
};
use crate::config::{ConfigError, EngineConfig};
use crate::gate::GateSequencer;
use crate::healing::{HealingController, HealingReport, run_fix_steps};
use crate::hub::TelemetryHub;
use crate::mission::MissionContext;
use crate::scheduler::{MissionScheduler, SchedulerError};

/// Errors that abort a mission before the scheduler starts.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The configuration is unusable.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// The scheduler could not be armed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },

    /// [`Orchestrator::run_mission`] was called a second time.
    #[error("mission already started")]
    AlreadyStarted,
}

/// The external work functions a mission drives.
#[derive(Default)]
pub struct Workflow {
    /// Fix-ups run once before the gates.
    pub preflight: Vec<Arc<dyn IssueFixer>>,
    /// Verification gates, in order.
    pub gates: Vec<Arc<dyn VerificationGate>>,
    /// Competing candidate strategies, in declared order.
    pub candidates: Vec<Arc<dyn CandidateStrategy>>,
    /// Steps of every healing cycle.
    pub healing_steps: Vec<Arc<dyn IssueFixer>>,
    /// Hook that materializes the winner.
    pub winner_sink: Option<Arc<dyn WinnerSink>>,
    /// Hook that publishes pending work.
    pub publisher: Option<Arc<dyn Publisher>>,
}

/// What [`Orchestrator::run_mission`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionReport {
    /// Pre-flight step outcomes.
    pub preflight: HealingReport,
    /// Gate results.
    pub outcome: MissionOutcome,
    /// The evaluation round, when gates passed.
    pub round: Option<EvaluationRound>,
    /// Whether the winner was applied.
    pub winner_applied: bool,
}

impl MissionReport {
    /// Whether the mission continues in degraded mode.
    pub const fn degraded(&self) -> bool {
        !self.outcome.all_passed
    }
}

/// Wires the hub, the mission state and every component together.
pub struct Orchestrator {
    hub: Arc<TelemetryHub>,
    mission: Arc<MissionContext>,
    healing: Arc<HealingController>,
    gates: GateSequencer,
    evaluator: CandidateEvaluator,
    scheduler: MissionScheduler,
    preflight: Vec<Arc<dyn IssueFixer>>,
    gate_list: Vec<Arc<dyn VerificationGate>>,
    candidates: Vec<Arc<dyn CandidateStrategy>>,
    winner_sink: Option<Arc<dyn WinnerSink>>,
    timeout: Option<Duration>,
    started: AtomicBool,
}

impl Orchestrator {
    /// Build an orchestrator from validated configuration.
    pub fn new(config: &EngineConfig, workflow: Workflow) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let timeout = config.collaborators.timeout();
        let hub = Arc::new(TelemetryHub::new(
            config.telemetry.log_capacity,
            config.telemetry.observer_buffer,
        ));
        let mission = Arc::new(MissionContext::new(config.mission.name.clone()));
        let healing = Arc::new(HealingController::new(
            Arc::clone(&hub),
            workflow.healing_steps,
            timeout,
        ));

        let mut scheduler = MissionScheduler::new(
            Arc::clone(&hub),
            Arc::clone(&mission),
            Arc::clone(&healing),
            config.schedule.clone(),
        )
        .with_timeout(timeout);
        if let Some(publisher) = workflow.publisher {
            scheduler = scheduler.with_publisher(publisher);
        }
        if let Some(path) = &config.audit.snapshot_path {
            scheduler = scheduler.with_audit_path(path);
        }

        Ok(Self {
            gates: GateSequencer::new(Arc::clone(&hub), timeout),
            evaluator: CandidateEvaluator::new(Arc::clone(&hub), config.scoring.clone(), timeout),
            hub,
            mission,
            healing,
            scheduler,
            preflight: workflow.preflight,
            gate_list: workflow.gates,
            candidates: workflow.candidates,
            winner_sink: workflow.winner_sink,
            timeout,
            started: AtomicBool::new(false),
        })
    }

    /// The telemetry hub.
    pub const fn hub(&self) -> &Arc<TelemetryHub> {
        &self.hub
    }

    /// The shared mission context.
    pub const fn mission(&self) -> &Arc<MissionContext> {
        &self.mission
    }

    /// The healing controller.
    pub const fn healing(&self) -> &Arc<HealingController> {
        &self.healing
    }

    /// Log an observer message and return the acknowledgement.
    pub fn handle_user_message(&self, text: &str) -> String {
        self.hub.acknowledge_user_message(text)
    }

    /// Run the mission sequence once and arm the scheduler.
    pub async fn run_mission(&self) -> Result<MissionReport, OrchestratorError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(OrchestratorError::AlreadyStarted);
        }

        let name = self.mission.snapshot().name;
        info!(mission = name, "mission starting");
        self.hub
            .append(EventCategory::System, format!("Mission '{name}' starting"));

        self.mission.set_phase(MissionPhase::Preflight);
        let preflight =
            run_fix_steps(&self.hub, &self.preflight, self.timeout, "Pre-flight").await;

        self.mission.set_phase(MissionPhase::Gating);
        let outcome = self.gates.run_gates(&self.gate_list).await;

        let mut round = None;
        let mut winner_applied = false;
        if outcome.all_passed {
            self.mission.set_phase(MissionPhase::Evaluating);
            let evaluated = self.evaluator.evaluate(&self.candidates).await;
            winner_applied = self.apply_winner(&evaluated).await;
            round = Some(evaluated);
            self.mission.set_phase(MissionPhase::Running);
        } else {
            self.mission.set_phase(MissionPhase::Degraded);
            self.hub.append(
                EventCategory::Error,
                "Gates failed; continuing in degraded mode with healing enabled",
            );
        }

        if let Err(e) = self.scheduler.start() {
            error!(error = %e, "failed to start scheduler");
            self.hub
                .append(EventCategory::Error, format!("Scheduler failed to start: {e}"));
            return Err(e.into());
        }
        self.hub.append(EventCategory::System, "Scheduler started");
        self.hub.broadcast_status(&self.mission.snapshot());

        Ok(MissionReport {
            preflight,
            outcome,
            round,
            winner_applied,
        })
    }

    async fn apply_winner(&self, round: &EvaluationRound) -> bool {
        let Some(winner) = round.winner() else {
            return false;
        };
        let Some(sink) = &self.winner_sink else {
            self.mission.set_winner(winner.name.clone());
            self.hub.append(
                EventCategory::System,
                format!("Winner '{}' selected; no apply hook configured", winner.name),
            );
            return false;
        };

        match guarded(self.timeout, || sink.apply_winner(winner)).await {
            Ok(()) => {
                self.mission.set_winner(winner.name.clone());
                self.hub.append(
                    EventCategory::SelfModify,
                    format!("Applied winning candidate '{}'", winner.name),
                );
                true
            }
            Err(e) => {
                self.hub.append(
                    EventCategory::Error,
                    format!("Applying winner '{}' failed: {e}", winner.name),
                );
                false
            }
        }
    }

    /// Stop the scheduler and mark the mission stopped.
    ///
    /// Waits for an in-flight healing cycle to finish. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.mission.set_running(false);
        if self.mission.phase() != MissionPhase::Stopped {
            self.mission.set_phase(MissionPhase::Stopped);
            self.hub.append(EventCategory::System, "Mission stopped");
            info!(
                elapsed_seconds = self.mission.elapsed_seconds(),
                "mission stopped"
            );
        }
    }
}
