//! Candidate evaluation: run competing strategies, score them, pick one.
//!
//! Candidates run sequentially in declared order. Each one is scored by
//! a [`ScoringRubric`] that is fixed before the round starts, and the
//! strictly highest score wins. On a tie the candidate declared first
//! wins. Failed candidates score 0 and are never selected.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;
use vigil_types::{CandidateRecord, CandidateStatus, EventCategory, RoundId};

use crate::collaborator::{CandidateStrategy, StrategyReport, guarded};
use crate::hub::TelemetryHub;

// ---------------------------------------------------------------------------
// Rubric
// ---------------------------------------------------------------------------

/// Deterministic scoring rubric.
///
/// `score = base + success_bonus? + fast_bonus? + sum(bonus_fields)`,
/// capped at `max_score`. A bonus field counts when the report carries a
/// metric of that name that is `true` or a number greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScoringRubric {
    /// Points for finishing without error.
    #[serde(default = "default_base")]
    pub base: u32,

    /// Points when the strategy reports its own run as a success.
    #[serde(default = "default_success_bonus")]
    pub success_bonus: u32,

    /// Points when the run finishes in under `fast_threshold_ms`.
    #[serde(default = "default_fast_bonus")]
    pub fast_bonus: u32,

    /// Elapsed-time threshold for `fast_bonus`, in milliseconds.
    #[serde(default = "default_fast_threshold_ms")]
    pub fast_threshold_ms: u64,

    /// Upper bound of any score.
    #[serde(default = "default_max_score")]
    pub max_score: u32,

    /// Extra points keyed by metric name.
    #[serde(default)]
    pub bonus_fields: BTreeMap<String, u32>,
}

impl Default for ScoringRubric {
    fn default() -> Self {
        Self {
            base: default_base(),
            success_bonus: default_success_bonus(),
            fast_bonus: default_fast_bonus(),
            fast_threshold_ms: default_fast_threshold_ms(),
            max_score: default_max_score(),
            bonus_fields: BTreeMap::new(),
        }
    }
}

impl ScoringRubric {
    /// Score a completed run.
    pub fn score(&self, report: &StrategyReport, elapsed_ms: u64) -> u32 {
        let mut total = self.base;
        if report.success {
            total = total.saturating_add(self.success_bonus);
        }
        if elapsed_ms < self.fast_threshold_ms {
            total = total.saturating_add(self.fast_bonus);
        }
        for (field, points) in &self.bonus_fields {
            if report.metrics.get(field).is_some_and(is_truthy) {
                total = total.saturating_add(*points);
            }
        }
        total.min(self.max_score)
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f > 0.0),
        _ => false,
    }
}

const fn default_base() -> u32 {
    50
}

const fn default_success_bonus() -> u32 {
    30
}

const fn default_fast_bonus() -> u32 {
    10
}

const fn default_fast_threshold_ms() -> u64 {
    5_000
}

const fn default_max_score() -> u32 {
    100
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Index of the winning record: the strictly highest score among
/// completed candidates, earliest index on ties.
pub fn select_winner(records: &[CandidateRecord]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, record) in records.iter().enumerate() {
        if record.status != CandidateStatus::Completed {
            continue;
        }
        match best {
            Some((_, score)) if record.score <= score => {}
            _ => best = Some((index, record.score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Result of one evaluation round. Rounds are independent; records are
/// never merged across rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRound {
    /// Identifier of the round.
    pub round_id: RoundId,
    /// One record per candidate, in declared order.
    pub candidates: Vec<CandidateRecord>,
    /// Index of the winner in `candidates`.
    pub winner: Option<usize>,
}

impl EvaluationRound {
    /// The winning record, if any candidate completed.
    pub fn winner(&self) -> Option<&CandidateRecord> {
        self.winner.and_then(|i| self.candidates.get(i))
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Runs candidate strategies and scores them.
pub struct CandidateEvaluator {
    hub: Arc<TelemetryHub>,
    rubric: ScoringRubric,
    timeout: Option<Duration>,
}

impl CandidateEvaluator {
    /// Create an evaluator scoring with `rubric`.
    pub const fn new(
        hub: Arc<TelemetryHub>,
        rubric: ScoringRubric,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            hub,
            rubric,
            timeout,
        }
    }

    /// The rubric in use.
    pub const fn rubric(&self) -> &ScoringRubric {
        &self.rubric
    }

    /// Run one evaluation round over `strategies`.
    ///
    /// Observers receive the candidate table when the round starts and
    /// whenever a candidate starts or finishes.
    pub async fn evaluate(&self, strategies: &[Arc<dyn CandidateStrategy>]) -> EvaluationRound {
        let round_id = RoundId::new();
        let mut records: Vec<CandidateRecord> = strategies
            .iter()
            .map(|s| CandidateRecord::pending(s.name(), s.description()))
            .collect();

        self.hub.append(
            EventCategory::Progress,
            format!("Evaluating {} candidates", records.len()),
        );
        self.hub.broadcast_candidates(&records);

        for (index, strategy) in strategies.iter().enumerate() {
            self.run_one(strategy.as_ref(), &mut records, index).await;
            self.hub.broadcast_candidates(&records);
        }

        let winner = select_winner(&records);
        match winner.and_then(|i| records.get(i)) {
            Some(best) => {
                self.hub.append(
                    EventCategory::Success,
                    format!("Winner: {} (score {})", best.name, best.score),
                );
            }
            None => {
                self.hub.append(
                    EventCategory::Error,
                    "No candidate completed; no winner selected",
                );
            }
        }

        debug!(round = %round_id, winner = ?winner, "evaluation round finished");
        EvaluationRound {
            round_id,
            candidates: records,
            winner,
        }
    }

    async fn run_one(
        &self,
        strategy: &dyn CandidateStrategy,
        records: &mut [CandidateRecord],
        index: usize,
    ) {
        if let Some(record) = records.get_mut(index) {
            record.status = CandidateStatus::Running;
        }
        self.hub.broadcast_candidates(records);

        let started = Instant::now();
        let outcome = guarded(self.timeout, || strategy.run()).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let Some(record) = records.get_mut(index) else {
            return;
        };
        record.duration_ms = elapsed_ms;
        match outcome {
            Ok(report) => {
                record.score = self.rubric.score(&report, elapsed_ms);
                record.status = CandidateStatus::Completed;
                self.hub.append(
                    EventCategory::Progress,
                    format!(
                        "Candidate '{}' scored {} in {elapsed_ms}ms",
                        record.name, record.score
                    ),
                );
            }
            Err(e) => {
                record.score = 0;
                record.status = CandidateStatus::Failed;
                record.error = Some(e.to_string());
                self.hub.append(
                    EventCategory::Error,
                    format!("Candidate '{}' failed: {e}", record.name),
                );
            }
        }
    }
}
