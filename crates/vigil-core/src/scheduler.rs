//! Mission scheduler: owns the periodic timers and their lifecycle.
//!
//! Three timers run as independent tokio tasks:
//!
//! - **healing**: runs a [`HealingController`] cycle; also wakes on
//!   [`MissionContext::request_heal`]
//! - **publish**: calls the [`Publisher`] hook
//! - **status**: pushes a [`MissionState`](vigil_types::MissionState)
//!   snapshot to observers and optionally rewrites the audit file
//!
//! An interval of 0 disables that timer. The first tick fires one full
//! period after [`start`](MissionScheduler::start).
//!
//! # Cancellation
//!
//! [`stop`](MissionScheduler::stop) flips a watch channel every timer
//! task selects on, then awaits the tasks. A timer that is waiting for
//! its next tick exits at once. A timer that is mid-action finishes that
//! action first, so an in-flight healing cycle drains instead of being
//! aborted. No timer fires after `stop` returns.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use vigil_types::EventCategory;

use crate::collaborator::{Publisher, guarded};
use crate::config::ScheduleConfig;
use crate::healing::{HealingController, TickOutcome};
use crate::hub::TelemetryHub;
use crate::mission::MissionContext;

/// Errors returned by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// [`MissionScheduler::start`] was called while the timers are armed.
    #[error("scheduler is already running")]
    AlreadyRunning,
}

/// The periodic timers the scheduler owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Healing cycles.
    Healing,
    /// Publishing pending work.
    Publish,
    /// Status snapshots to observers.
    Status,
}

impl TimerKind {
    /// Lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healing => "healing",
            Self::Publish => "publish",
            Self::Status => "status",
        }
    }
}

/// Everything a timer task needs, shared by all three.
struct TimerContext {
    hub: Arc<TelemetryHub>,
    mission: Arc<MissionContext>,
    healing: Arc<HealingController>,
    publisher: Option<Arc<dyn Publisher>>,
    timeout: Option<Duration>,
    audit_path: Option<PathBuf>,
}

impl TimerContext {
    async fn fire(&self, kind: TimerKind) {
        match kind {
            TimerKind::Healing => self.heal().await,
            TimerKind::Publish => self.publish().await,
            TimerKind::Status => self.status().await,
        }
    }

    async fn heal(&self) {
        match self.healing.tick().await {
            TickOutcome::Completed(report) => self.mission.record_heal(report.all_fixed()),
            TickOutcome::Skipped => debug!("healing tick skipped"),
        }
    }

    async fn publish(&self) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        match guarded(self.timeout, || publisher.publish_pending()).await {
            Ok(report) if report.pushed => {
                self.mission.record_push();
                self.hub.append(EventCategory::Success, "Published pending work");
            }
            Ok(_) => debug!("nothing to publish"),
            Err(e) => {
                self.hub.append(EventCategory::Error, format!("Publish failed: {e}"));
            }
        }
    }

    async fn status(&self) {
        let snapshot = self.mission.snapshot();
        let receivers = self.hub.broadcast_status(&snapshot);
        debug!(receivers, "status broadcast");

        let Some(path) = &self.audit_path else {
            return;
        };
        let written = match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => tokio::fs::write(path, bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = written {
            warn!(path = %path.display(), error = e, "audit snapshot write failed");
            self.hub.append(
                EventCategory::Error,
                format!("Audit snapshot write to {} failed: {e}", path.display()),
            );
        }
    }
}

/// Handles of the running timer tasks.
struct ArmedTimers {
    cancel: watch::Sender<bool>,
    tasks: Vec<(TimerKind, JoinHandle<()>)>,
}

/// Owns the healing, publish and status timers.
pub struct MissionScheduler {
    hub: Arc<TelemetryHub>,
    mission: Arc<MissionContext>,
    healing: Arc<HealingController>,
    publisher: Option<Arc<dyn Publisher>>,
    schedule: ScheduleConfig,
    timeout: Option<Duration>,
    audit_path: Option<PathBuf>,
    armed: Mutex<Option<ArmedTimers>>,
}

impl MissionScheduler {
    /// Create a stopped scheduler.
    pub const fn new(
        hub: Arc<TelemetryHub>,
        mission: Arc<MissionContext>,
        healing: Arc<HealingController>,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            hub,
            mission,
            healing,
            publisher: None,
            schedule,
            timeout: None,
            audit_path: None,
            armed: Mutex::new(None),
        }
    }

    /// Set the hook the publish timer calls.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Limit each publish call to `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rewrite `path` with the mission state on every status tick.
    #[must_use]
    pub fn with_audit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_path = Some(path.into());
        self
    }

    /// Whether the timers are armed.
    pub fn is_running(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Arm every enabled timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if armed.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let context = Arc::new(TimerContext {
            hub: Arc::clone(&self.hub),
            mission: Arc::clone(&self.mission),
            healing: Arc::clone(&self.healing),
            publisher: self.publisher.clone(),
            timeout: self.timeout,
            audit_path: self.audit_path.clone(),
        });
        let (cancel, cancelled) = watch::channel(false);

        let timers = [
            (TimerKind::Healing, self.schedule.healing_interval_ms),
            (TimerKind::Publish, self.schedule.publish_interval_ms),
            (TimerKind::Status, self.schedule.status_broadcast_interval_ms),
        ];
        let mut tasks = Vec::with_capacity(timers.len());
        for (kind, interval_ms) in timers {
            let period = (interval_ms > 0).then(|| Duration::from_millis(interval_ms));
            // The healing task also serves manual requests, so it runs
            // even without a period.
            if period.is_none() && kind != TimerKind::Healing {
                debug!(timer = kind.as_str(), "timer disabled");
                continue;
            }
            if kind == TimerKind::Publish && self.publisher.is_none() {
                debug!(timer = kind.as_str(), "no publisher configured");
                continue;
            }
            let handle = tokio::spawn(run_timer(
                Arc::clone(&context),
                kind,
                period,
                cancelled.clone(),
            ));
            tasks.push((kind, handle));
        }

        info!(
            healing_ms = self.schedule.healing_interval_ms,
            publish_ms = self.schedule.publish_interval_ms,
            status_ms = self.schedule.status_broadcast_interval_ms,
            timers = tasks.len(),
            "scheduler started"
        );
        *armed = Some(ArmedTimers { cancel, tasks });
        drop(armed);
        self.mission.set_running(true);
        Ok(())
    }

    /// Cancel every timer and wait for in-flight actions to finish.
    ///
    /// Calling this when the scheduler is not running is a no-op.
    pub async fn stop(&self) {
        let taken = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(armed) = taken else {
            return;
        };

        // Receivers may already be gone if every task exited; that is fine.
        let _ = armed.cancel.send(true);
        for (kind, handle) in armed.tasks {
            if let Err(e) = handle.await {
                warn!(timer = kind.as_str(), error = %e, "timer task ended abnormally");
            }
        }
        self.mission.set_running(false);
        info!("scheduler stopped");
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_timer(
    context: Arc<TimerContext>,
    kind: TimerKind,
    period: Option<Duration>,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut ticker = period.map(|p| {
        let mut interval = tokio::time::interval(p);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick one period from now, not immediately.
        interval.reset();
        interval
    });
    let manual_heal = kind == TimerKind::Healing;

    loop {
        tokio::select! {
            biased;
            _ = cancelled.changed() => break,
            () = next_tick(ticker.as_mut()) => {}
            () = context.mission.heal_requested(), if manual_heal => {
                debug!("manual healing request");
            }
        }
        if *cancelled.borrow() {
            break;
        }
        context.fire(kind).await;
    }
    debug!(timer = kind.as_str(), "timer exited");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vigil_types::ServerMessage;

    use super::*;
    use crate::collaborator::{CollaboratorError, FixReport, FnFixer, IssueFixer, PublishReport};

    struct Fixture {
        hub: Arc<TelemetryHub>,
        mission: Arc<MissionContext>,
        cycles: Arc<AtomicUsize>,
        healing: Arc<HealingController>,
    }

    fn fixture() -> Fixture {
        let hub = Arc::new(TelemetryHub::new(1_000, 1_000));
        let mission = Arc::new(MissionContext::new("test"));
        let cycles = Arc::new(AtomicUsize::new(0));
        let step: Arc<dyn IssueFixer> = {
            let cycles = Arc::clone(&cycles);
            Arc::new(FnFixer::new("count", move || {
                cycles.fetch_add(1, Ordering::SeqCst);
                async {
                    Ok::<_, CollaboratorError>(FixReport {
                        fixed: true,
                        detail: None,
                    })
                }
            }))
        };
        let healing = Arc::new(HealingController::new(
            Arc::clone(&hub),
            vec![step],
            None,
        ));
        Fixture {
            hub,
            mission,
            cycles,
            healing,
        }
    }

    fn schedule(healing_ms: u64, publish_ms: u64, status_ms: u64) -> ScheduleConfig {
        ScheduleConfig {
            healing_interval_ms: healing_ms,
            publish_interval_ms: publish_ms,
            status_broadcast_interval_ms: status_ms,
        }
    }

    fn scheduler(f: &Fixture, schedule: ScheduleConfig) -> MissionScheduler {
        MissionScheduler::new(
            Arc::clone(&f.hub),
            Arc::clone(&f.mission),
            Arc::clone(&f.healing),
            schedule,
        )
    }

    struct CountingPublisher {
        calls: AtomicUsize,
    }

    impl Publisher for CountingPublisher {
        fn publish_pending(
            &self,
        ) -> futures::future::BoxFuture<'_, Result<PublishReport, CollaboratorError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(PublishReport { pushed: true }) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_immediately_after_start_runs_at_most_one_cycle() {
        let f = fixture();
        let scheduler = scheduler(&f, schedule(1, 0, 0));

        scheduler.start().unwrap();
        scheduler.stop().await;
        let after_stop = f.cycles.load(Ordering::SeqCst);
        assert!(after_stop <= 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.cycles.load(Ordering::SeqCst), after_stop);
        assert!(!f.mission.snapshot().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn healing_timer_fires_periodically() {
        let f = fixture();
        let scheduler = scheduler(&f, schedule(10, 0, 0));

        scheduler.start().unwrap();
        assert!(f.mission.snapshot().is_running);
        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.stop().await;

        let cycles = f.cycles.load(Ordering::SeqCst);
        assert!(cycles >= 2, "expected at least two cycles, got {cycles}");
        assert_eq!(f.mission.snapshot().heal_count, u64::try_from(cycles).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn healing_timer_survives_a_panicking_step() {
        type Fix = std::future::Ready<Result<FixReport, CollaboratorError>>;
        let hub = Arc::new(TelemetryHub::new(1_000, 1_000));
        let mission = Arc::new(MissionContext::new("test"));
        let attempts = Arc::new(AtomicUsize::new(0));
        let step: Arc<dyn IssueFixer> = {
            let attempts = Arc::clone(&attempts);
            Arc::new(FnFixer::new("repo-integrity", move || -> Fix {
                attempts.fetch_add(1, Ordering::SeqCst);
                panic!("git not found")
            }))
        };
        let healing = Arc::new(HealingController::new(Arc::clone(&hub), vec![step], None));
        let scheduler = MissionScheduler::new(
            Arc::clone(&hub),
            Arc::clone(&mission),
            healing,
            schedule(10, 0, 0),
        );

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.stop().await;

        let attempts = attempts.load(Ordering::SeqCst);
        assert!(attempts >= 4, "expected a retry on every tick, got {attempts}");
        let state = mission.snapshot();
        assert_eq!(state.heal_count, u64::try_from(attempts).unwrap());
        assert_eq!(state.failed_heal_cycles, state.heal_count);
        let logged = hub.snapshot().iter().any(|e| {
            e.category == EventCategory::Healing && e.message.contains("git not found")
        });
        assert!(logged);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let f = fixture();
        let scheduler = scheduler(&f, schedule(60_000, 0, 0));
        scheduler.stop().await;

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let f = fixture();
        let scheduler = scheduler(&f, schedule(60_000, 0, 0));
        scheduler.start().unwrap();
        assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyRunning));
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_heal_runs_with_timer_disabled() {
        let f = fixture();
        let scheduler = scheduler(&f, schedule(0, 0, 0));
        scheduler.start().unwrap();

        f.mission.request_heal();
        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.stop().await;

        assert_eq!(f.cycles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_and_publish_timers() {
        let f = fixture();
        let mut observer = f.hub.subscribe();
        let publisher = Arc::new(CountingPublisher {
            calls: AtomicUsize::new(0),
        });
        let scheduler = scheduler(&f, schedule(0, 20, 10))
            .with_publisher(Arc::clone(&publisher) as Arc<dyn Publisher>);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        scheduler.stop().await;

        assert!(publisher.calls.load(Ordering::SeqCst) >= 1);
        assert!(f.mission.snapshot().last_push_at.is_some());

        let mut statuses = 0;
        while let Ok(message) = observer.receiver.try_recv() {
            if matches!(message, ServerMessage::Status { .. }) {
                statuses += 1;
            }
        }
        assert!(statuses >= 2, "expected status broadcasts, got {statuses}");
    }

    #[tokio::test]
    async fn status_timer_writes_audit_snapshot() {
        let f = fixture();
        let path = std::env::temp_dir().join(format!(
            "vigil-audit-{}.json",
            f.mission.snapshot().mission_id
        ));
        let scheduler = scheduler(&f, schedule(0, 0, 10)).with_audit_path(&path);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let state: vigil_types::MissionState = serde_json::from_str(&written).unwrap();
        assert_eq!(state.name, "test");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
