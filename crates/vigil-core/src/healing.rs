//! Healing loop controller.
//!
//! A healing cycle runs an ordered list of detect-and-fix steps. Steps
//! are independent: a failing step is logged and the next one runs
//! anyway. The controller is a two-state machine:
//!
//! ```text
//! Idle --tick--> Healing --cycle done--> Idle
//!   ^              |
//!   |   tick while Healing: skipped, nothing queued
//! ```
//!
//! The `Idle -> Healing` transition is a compare-and-set under a mutex,
//! so two ticks can never both enter a cycle. The way back to `Idle` is
//! owned by a drop guard and therefore happens even if the cycle future
//! is cancelled midway.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;
use vigil_types::EventCategory;

use crate::collaborator::{IssueFixer, guarded};
use crate::hub::TelemetryHub;

/// State of the healing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealingState {
    /// No cycle in progress.
    Idle,
    /// A cycle is running.
    Healing,
}

/// Result of one detect-and-fix step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Issue kind handled by the step.
    pub kind: String,
    /// Whether the issue is absent or was fixed.
    pub fixed: bool,
    /// Diagnostic text or error message.
    pub detail: Option<String>,
}

/// Results of one healing cycle, in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealingReport {
    /// One outcome per step.
    pub steps: Vec<StepOutcome>,
}

impl HealingReport {
    /// Whether every step ended with its issue fixed.
    pub fn all_fixed(&self) -> bool {
        self.steps.iter().all(|s| s.fixed)
    }

    /// Number of steps that fixed their issue.
    pub fn fixed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.fixed).count()
    }
}

/// What a call to [`HealingController::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A cycle was already running; this tick did nothing.
    Skipped,
    /// A full cycle ran.
    Completed(HealingReport),
}

/// Run `steps` in order, logging each outcome to the hub.
///
/// Shared by the healing loop and the mission's pre-flight fix-ups.
/// Success lines use [`EventCategory::Progress`]; failures use
/// [`EventCategory::Healing`].
pub(crate) async fn run_fix_steps(
    hub: &TelemetryHub,
    steps: &[Arc<dyn IssueFixer>],
    timeout: Option<Duration>,
    label: &str,
) -> HealingReport {
    let mut report = HealingReport {
        steps: Vec::with_capacity(steps.len()),
    };

    for step in steps {
        let kind = step.kind().to_owned();
        let outcome = match guarded(timeout, || step.detect_and_fix()).await {
            Ok(fix) => StepOutcome {
                kind,
                fixed: fix.fixed,
                detail: fix.detail,
            },
            Err(e) => StepOutcome {
                kind,
                fixed: false,
                detail: Some(e.to_string()),
            },
        };

        if outcome.fixed {
            hub.append(
                EventCategory::Progress,
                format!("{label}: '{}' ok", outcome.kind),
            );
        } else {
            let detail = outcome.detail.as_deref().unwrap_or("not fixed");
            hub.append(
                EventCategory::Healing,
                format!("{label}: '{}' failed: {detail}", outcome.kind),
            );
        }
        report.steps.push(outcome);
    }
    report
}

/// Re-entrancy guarded healing loop.
pub struct HealingController {
    hub: Arc<TelemetryHub>,
    steps: Vec<Arc<dyn IssueFixer>>,
    timeout: Option<Duration>,
    state: Mutex<HealingState>,
    transitions: AtomicU64,
}

/// Returns the controller to `Idle` when dropped.
struct CycleGuard<'a> {
    controller: &'a HealingController,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.controller.set_state(HealingState::Idle);
    }
}

impl HealingController {
    /// Create an idle controller running `steps` on every cycle.
    pub fn new(
        hub: Arc<TelemetryHub>,
        steps: Vec<Arc<dyn IssueFixer>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            hub,
            steps,
            timeout,
            state: Mutex::new(HealingState::Idle),
            transitions: AtomicU64::new(0),
        }
    }

    /// Current state.
    pub fn state(&self) -> HealingState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total number of state transitions so far.
    pub fn transition_count(&self) -> u64 {
        self.transitions.load(Ordering::Acquire)
    }

    /// Number of configured steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    fn try_enter(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == HealingState::Healing {
            return false;
        }
        *state = HealingState::Healing;
        self.transitions.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn set_state(&self, next: HealingState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            *state = next;
            self.transitions.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Run one healing cycle unless one is already in progress.
    ///
    /// A tick that finds the controller `Healing` returns
    /// [`TickOutcome::Skipped`] without touching state or invoking any
    /// step. It is not queued.
    pub async fn tick(&self) -> TickOutcome {
        if !self.try_enter() {
            debug!("healing cycle already running, tick skipped");
            return TickOutcome::Skipped;
        }
        let _guard = CycleGuard { controller: self };

        self.hub.append(
            EventCategory::Healing,
            format!("Healing cycle started ({} steps)", self.steps.len()),
        );
        let report = run_fix_steps(&self.hub, &self.steps, self.timeout, "Healing").await;

        let category = if report.all_fixed() {
            EventCategory::Success
        } else {
            EventCategory::Healing
        };
        self.hub.append(
            category,
            format!(
                "Healing cycle finished: {}/{} steps healthy",
                report.fixed_count(),
                report.steps.len()
            ),
        );
        TickOutcome::Completed(report)
    }
}
