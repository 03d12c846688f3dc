//! Core data structs: events, candidates, gate results and mission state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{CandidateStatus, EventCategory, MissionPhase};
use crate::ids::{MissionId, SequenceId};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single entry of the event log.
///
/// Immutable once appended. Events are ordered by `sequence_id`, which the
/// telemetry hub assigns at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Position in the log. Strictly increasing, never reused.
    pub sequence_id: SequenceId,
    /// Wall-clock time of the append.
    pub timestamp: DateTime<Utc>,
    /// Event category.
    pub category: EventCategory,
    /// Human-readable message.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Outcome of one candidate in an evaluation round.
///
/// Starts as [`CandidateStatus::Pending`] with a zero score and is
/// updated exactly once when the candidate finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CandidateRecord {
    /// Candidate name, unique within a round.
    pub name: String,
    /// Short description of the strategy.
    pub description: String,
    /// Rubric score in `0..=100`.
    pub score: u32,
    /// Current status.
    pub status: CandidateStatus,
    /// Wall-clock run time in milliseconds.
    pub duration_ms: u64,
    /// Failure message when `status` is [`CandidateStatus::Failed`].
    pub error: Option<String>,
}

impl CandidateRecord {
    /// Create a pending record for a declared candidate.
    pub fn pending(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            score: 0,
            status: CandidateStatus::Pending,
            duration_ms: 0,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Result of one verification gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct GateResult {
    /// Name of the gate (e.g. `build`, `lint`, `unit-tests`).
    pub gate_name: String,
    /// Whether the gate passed.
    pub passed: bool,
    /// Diagnostic lines reported by the gate, or the error message.
    pub details: Vec<String>,
}

/// Aggregated result of one gate sequence run.
///
/// `all_passed` is computed once at construction and is true iff every
/// result passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MissionOutcome {
    /// Whether every gate passed.
    pub all_passed: bool,
    /// One result per gate, in declaration order.
    pub results: Vec<GateResult>,
}

impl MissionOutcome {
    /// Build an outcome from the ordered gate results.
    pub fn from_results(results: Vec<GateResult>) -> Self {
        let all_passed = results.iter().all(|r| r.passed);
        Self {
            all_passed,
            results,
        }
    }

    /// Names of the gates that failed, in order.
    pub fn failed_gates(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.gate_name.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Mission state
// ---------------------------------------------------------------------------

/// Process-wide mission context, as served by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MissionState {
    /// Identifier of this mission.
    pub mission_id: MissionId,
    /// Configured mission name.
    pub name: String,
    /// When the process created the mission.
    pub started_at: DateTime<Utc>,
    /// Whether the scheduler is armed.
    pub is_running: bool,
    /// Current phase.
    pub phase: MissionPhase,
    /// Completion time of the last healing cycle.
    pub last_heal_at: Option<DateTime<Utc>>,
    /// Time of the last successful publish.
    pub last_push_at: Option<DateTime<Utc>>,
    /// Number of completed healing cycles.
    pub heal_count: u64,
    /// Number of healing cycles in which at least one step did not fix its issue.
    pub failed_heal_cycles: u64,
    /// Name of the applied winning candidate, if any.
    pub winner: Option<String>,
}

impl MissionState {
    /// Create the initial state for a new mission.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            mission_id: MissionId::new(),
            name: name.into(),
            started_at: Utc::now(),
            is_running: false,
            phase: MissionPhase::Starting,
            last_heal_at: None,
            last_push_at: None,
            heal_count: 0,
            failed_heal_cycles: 0,
            winner: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(name: &str, passed: bool) -> GateResult {
        GateResult {
            gate_name: name.to_owned(),
            passed,
            details: Vec::new(),
        }
    }

    #[test]
    fn outcome_all_passed_requires_every_gate() {
        let ok = MissionOutcome::from_results(vec![gate("build", true), gate("lint", true)]);
        assert!(ok.all_passed);

        let bad = MissionOutcome::from_results(vec![
            gate("build", true),
            gate("lint", false),
            gate("test", true),
        ]);
        assert!(!bad.all_passed);
        assert_eq!(bad.failed_gates(), vec!["lint"]);
    }

    #[test]
    fn event_uses_camel_case_fields() {
        let event = Event {
            sequence_id: SequenceId(7),
            timestamp: Utc::now(),
            category: EventCategory::Progress,
            message: String::from("gate build passed"),
        };
        let json = serde_json::to_value(&event).ok();
        let json = json.unwrap_or_default();
        assert_eq!(json["sequenceId"], 7);
        assert_eq!(json["category"], "Progress");
    }

    #[test]
    fn new_mission_is_idle() {
        let state = MissionState::new("nightly");
        assert!(!state.is_running);
        assert_eq!(state.phase, MissionPhase::Starting);
        assert_eq!(state.heal_count, 0);
        assert!(state.winner.is_none());
    }
}
