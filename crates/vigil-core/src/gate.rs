//! Gate sequencer: ordered, mandatory verification steps.
//!
//! Gates run strictly one after another in declared order because later
//! gates may rely on side effects of earlier ones ("build" before "run
//! tests"). A failing gate does not stop the sequence: every gate runs so
//! the outcome carries the full diagnostic picture.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use vigil_types::{EventCategory, GateResult, MissionOutcome};

use crate::collaborator::{VerificationGate, guarded};
use crate::hub::TelemetryHub;

/// Runs verification gates and reports their results to the hub.
pub struct GateSequencer {
    hub: Arc<TelemetryHub>,
    timeout: Option<Duration>,
}

impl GateSequencer {
    /// Create a sequencer that logs to `hub` and limits each gate to `timeout`.
    pub const fn new(hub: Arc<TelemetryHub>, timeout: Option<Duration>) -> Self {
        Self { hub, timeout }
    }

    /// Run every gate in order and aggregate the results.
    ///
    /// Emits one [`EventCategory::Progress`] event per gate and one summary
    /// event: [`EventCategory::Success`] when all passed,
    /// [`EventCategory::Error`] otherwise. Never fails: a gate that errors,
    /// panics or times out is recorded as not passed with the error as its
    /// only detail.
    pub async fn run_gates(&self, gates: &[Arc<dyn VerificationGate>]) -> MissionOutcome {
        let mut results = Vec::with_capacity(gates.len());

        for gate in gates {
            let name = gate.name().to_owned();
            debug!(gate = name, "running gate");

            let result = match guarded(self.timeout, || gate.verify()).await {
                Ok(report) => GateResult {
                    gate_name: name,
                    passed: report.passed,
                    details: report.details,
                },
                Err(e) => GateResult {
                    gate_name: name,
                    passed: false,
                    details: vec![e.to_string()],
                },
            };

            let verdict = if result.passed { "passed" } else { "failed" };
            let message = match result.details.first() {
                Some(first) if !result.passed => {
                    format!("Gate '{}' {verdict}: {first}", result.gate_name)
                }
                _ => format!("Gate '{}' {verdict}", result.gate_name),
            };
            self.hub.append(EventCategory::Progress, message);
            results.push(result);
        }

        let outcome = MissionOutcome::from_results(results);
        if outcome.all_passed {
            self.hub.append(
                EventCategory::Success,
                format!("All {} gates passed", outcome.results.len()),
            );
        } else {
            let failed = outcome.failed_gates();
            self.hub.append(
                EventCategory::Error,
                format!(
                    "{} of {} gates failed: {}",
                    failed.len(),
                    outcome.results.len(),
                    failed.join(", ")
                ),
            );
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::collaborator::{CollaboratorError, FnGate, GateReport};

    fn passing(name: &str) -> Arc<dyn VerificationGate> {
        Arc::new(FnGate::new(name, || async {
            Ok::<_, CollaboratorError>(GateReport {
                passed: true,
                details: Vec::new(),
            })
        }))
    }

    fn failing(name: &str) -> Arc<dyn VerificationGate> {
        Arc::new(FnGate::new(name, || async {
            Ok::<_, CollaboratorError>(GateReport {
                passed: false,
                details: vec![String::from("3 warnings treated as errors")],
            })
        }))
    }

    fn sequencer() -> (Arc<TelemetryHub>, GateSequencer) {
        let hub = Arc::new(TelemetryHub::new(100, 16));
        (Arc::clone(&hub), GateSequencer::new(hub, None))
    }

    #[tokio::test]
    async fn all_gates_run_even_after_a_failure() {
        let (hub, sequencer) = sequencer();
        let gates = vec![passing("A"), failing("B"), passing("C")];

        let outcome = sequencer.run_gates(&gates).await;

        assert!(!outcome.all_passed);
        assert_eq!(outcome.results.len(), 3);
        let c = outcome.results.iter().find(|r| r.gate_name == "C").unwrap();
        assert!(c.passed);
        assert_eq!(outcome.failed_gates(), vec!["B"]);

        let events = hub.snapshot();
        let progress = events
            .iter()
            .filter(|e| e.category == EventCategory::Progress)
            .count();
        assert_eq!(progress, 3);
        assert_eq!(events.last().unwrap().category, EventCategory::Error);
    }

    #[tokio::test]
    async fn gates_run_in_declared_order() {
        let (_hub, sequencer) = sequencer();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut gates: Vec<Arc<dyn VerificationGate>> = Vec::new();
        for expected in 0..4_usize {
            let counter = Arc::clone(&counter);
            gates.push(Arc::new(FnGate::new(format!("g{expected}"), move || {
                let position = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok::<_, CollaboratorError>(GateReport {
                        passed: position == expected,
                        details: Vec::new(),
                    })
                }
            })));
        }

        let outcome = sequencer.run_gates(&gates).await;
        assert!(outcome.all_passed);
    }

    #[tokio::test]
    async fn erroring_gate_is_recorded_not_propagated() {
        let (hub, sequencer) = sequencer();
        let broken: Arc<dyn VerificationGate> = Arc::new(FnGate::new("lint", || async {
            Err::<GateReport, _>(CollaboratorError::failed("linter not installed"))
        }));

        let outcome = sequencer.run_gates(&[broken, passing("test")]).await;

        assert!(!outcome.all_passed);
        let lint = outcome.results.first().unwrap();
        assert!(!lint.passed);
        assert_eq!(lint.details, vec![String::from("linter not installed")]);
        assert!(
            hub.snapshot()
                .iter()
                .any(|e| e.message.contains("linter not installed"))
        );
    }

    #[tokio::test]
    async fn gate_panicking_before_it_starts_is_recorded() {
        type Verdict = std::future::Ready<Result<GateReport, CollaboratorError>>;
        let (hub, sequencer) = sequencer();
        let broken: Arc<dyn VerificationGate> = Arc::new(FnGate::new("lint", || -> Verdict {
            panic!("linter binary missing")
        }));

        let outcome = sequencer.run_gates(&[broken, passing("test")]).await;

        assert!(!outcome.all_passed);
        assert_eq!(outcome.results.len(), 2);
        let lint = outcome.results.first().unwrap();
        assert!(!lint.passed);
        assert!(lint.details.first().unwrap().contains("linter binary missing"));
        assert!(outcome.results.get(1).unwrap().passed);
        assert_eq!(hub.snapshot().last().unwrap().category, EventCategory::Error);
    }

    #[tokio::test]
    async fn all_passing_emits_success_summary() {
        let (hub, sequencer) = sequencer();
        let outcome = sequencer
            .run_gates(&[passing("build"), passing("test")])
            .await;
        assert!(outcome.all_passed);
        let last = hub.snapshot().pop().unwrap();
        assert_eq!(last.category, EventCategory::Success);
        assert_eq!(last.message, "All 2 gates passed");
    }
}
