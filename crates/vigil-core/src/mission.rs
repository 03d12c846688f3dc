//! Shared mission context.
//!
//! [`MissionContext`] holds the process-wide [`MissionState`] plus the
//! control signals operators and timers use to talk to the orchestrator:
//! a stop request and an out-of-band healing request.
//!
//! # Architecture
//!
//! The state record sits behind one [`std::sync::Mutex`] that is never
//! held across an `.await`. The stop flag is an [`AtomicBool`] so it can
//! be polled without locking; waiters park on a [`Notify`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::Notify;
use vigil_types::{MissionPhase, MissionState};

/// Shared mission state and control signals.
#[derive(Debug)]
pub struct MissionContext {
    state: Mutex<MissionState>,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    heal_notify: Notify,
}

impl MissionContext {
    /// Create the context for a new mission called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MissionState::new(name)),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            heal_notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> MissionState {
        self.lock().clone()
    }

    // -----------------------------------------------------------------------
    // State updates
    // -----------------------------------------------------------------------

    /// Current phase.
    pub fn phase(&self) -> MissionPhase {
        self.lock().phase
    }

    /// Move to `phase`. Once [`MissionPhase::Stopped`] is reached the
    /// phase no longer changes.
    pub fn set_phase(&self, phase: MissionPhase) {
        let mut state = self.lock();
        if state.phase != MissionPhase::Stopped {
            state.phase = phase;
        }
    }

    /// Record whether the scheduler is armed.
    pub fn set_running(&self, running: bool) {
        self.lock().is_running = running;
    }

    /// Record a completed healing cycle.
    pub fn record_heal(&self, all_fixed: bool) {
        let mut state = self.lock();
        state.last_heal_at = Some(Utc::now());
        state.heal_count = state.heal_count.saturating_add(1);
        if !all_fixed {
            state.failed_heal_cycles = state.failed_heal_cycles.saturating_add(1);
        }
    }

    /// Record a successful publish.
    pub fn record_push(&self) {
        self.lock().last_push_at = Some(Utc::now());
    }

    /// Record the applied winning candidate.
    pub fn set_winner(&self, name: impl Into<String>) {
        self.lock().winner = Some(name.into());
    }

    /// Return elapsed seconds since mission start.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.lock().started_at)
            .num_seconds();
        // `num_seconds` can be negative if clocks are weird; treat as 0.
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean shutdown and wake anyone waiting for it.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Wait until a stop is requested. Returns immediately if it already was.
    pub async fn wait_for_stop(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Manual healing
    // -----------------------------------------------------------------------

    /// Ask the healing timer to run a cycle now.
    ///
    /// At most one request is remembered while none is being waited on.
    pub fn request_heal(&self) {
        self.heal_notify.notify_one();
    }

    /// Wait for the next [`request_heal`](Self::request_heal).
    pub async fn heal_requested(&self) {
        self.heal_notify.notified().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn initial_state() {
        let mission = MissionContext::new("nightly");
        let state = mission.snapshot();
        assert_eq!(state.name, "nightly");
        assert_eq!(state.phase, MissionPhase::Starting);
        assert!(!state.is_running);
        assert!(!mission.is_stop_requested());
    }

    #[test]
    fn heal_records_count_failures() {
        let mission = MissionContext::new("m");
        mission.record_heal(true);
        mission.record_heal(false);
        mission.record_heal(false);
        let state = mission.snapshot();
        assert_eq!(state.heal_count, 3);
        assert_eq!(state.failed_heal_cycles, 2);
        assert!(state.last_heal_at.is_some());
    }

    #[test]
    fn stopped_phase_is_final() {
        let mission = MissionContext::new("m");
        mission.set_phase(MissionPhase::Running);
        mission.set_phase(MissionPhase::Stopped);
        mission.set_phase(MissionPhase::Degraded);
        assert_eq!(mission.phase(), MissionPhase::Stopped);
    }

    #[test]
    fn winner_and_push_are_recorded() {
        let mission = MissionContext::new("m");
        mission.set_winner("incremental");
        mission.record_push();
        let state = mission.snapshot();
        assert_eq!(state.winner.as_deref(), Some("incremental"));
        assert!(state.last_push_at.is_some());
    }

    #[tokio::test]
    async fn wait_for_stop_returns_after_request() {
        let mission = Arc::new(MissionContext::new("m"));
        let waiter = tokio::spawn({
            let mission = Arc::clone(&mission);
            async move { mission.wait_for_stop().await }
        });
        tokio::task::yield_now().await;
        mission.request_stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(mission.is_stop_requested());
    }

    #[tokio::test]
    async fn wait_for_stop_is_immediate_when_already_requested() {
        let mission = MissionContext::new("m");
        mission.request_stop();
        tokio::time::timeout(Duration::from_millis(50), mission.wait_for_stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn heal_request_is_remembered() {
        let mission = MissionContext::new("m");
        mission.request_heal();
        tokio::time::timeout(Duration::from_millis(50), mission.heal_requested())
            .await
            .unwrap();
    }
}
