//! Enumeration types for the Vigil engine.
//!
//! All enums are closed sets: wire consumers match on them exhaustively
//! and no free-form string categories exist anywhere in the engine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Event categories
// ---------------------------------------------------------------------------

/// Category of an entry in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventCategory {
    /// Lifecycle and bookkeeping messages from the engine itself.
    System,
    /// A step of some longer operation has completed.
    Progress,
    /// An operation finished successfully.
    Success,
    /// An operation or collaborator failed.
    Error,
    /// Output of the healing loop, including failed healing steps.
    Healing,
    /// The engine changed the managed system (e.g. applied a winning candidate).
    SelfModify,
    /// A message submitted by a connected observer.
    UserMessage,
}

impl EventCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::System,
        Self::Progress,
        Self::Success,
        Self::Error,
        Self::Healing,
        Self::SelfModify,
        Self::UserMessage,
    ];

    /// Stable name used on the wire and in query strings.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Progress => "Progress",
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Healing => "Healing",
            Self::SelfModify => "SelfModify",
            Self::UserMessage => "UserMessage",
        }
    }

    /// Parse a category name case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(name))
    }
}

impl core::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Candidate status
// ---------------------------------------------------------------------------

/// Lifecycle of a candidate within one evaluation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum CandidateStatus {
    /// Declared but not yet started.
    Pending,
    /// The candidate strategy is executing.
    Running,
    /// The strategy returned a report and was scored.
    Completed,
    /// The strategy errored, panicked or timed out. Score is 0.
    Failed,
}

impl CandidateStatus {
    /// Whether the candidate has finished (successfully or not).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Mission phase
// ---------------------------------------------------------------------------

/// Coarse phase of the mission, as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum MissionPhase {
    /// Process started, orchestrator not yet running.
    Starting,
    /// Running best-effort pre-flight fix-ups.
    Preflight,
    /// Running the verification gates.
    Gating,
    /// Evaluating candidate strategies.
    Evaluating,
    /// All gates passed; periodic timers are armed.
    Running,
    /// At least one gate failed; timers are armed and healing continues.
    Degraded,
    /// The mission was shut down.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_round_trip() {
        for category in EventCategory::ALL {
            assert_eq!(EventCategory::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn category_parse_ignores_case() {
        assert_eq!(EventCategory::parse("healing"), Some(EventCategory::Healing));
        assert_eq!(EventCategory::parse("bogus"), None);
    }

    #[test]
    fn category_serializes_as_variant_name() {
        let json = serde_json::to_string(&EventCategory::SelfModify).ok();
        assert_eq!(json.as_deref(), Some("\"SelfModify\""));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CandidateStatus::Pending.is_terminal());
        assert!(!CandidateStatus::Running.is_terminal());
        assert!(CandidateStatus::Completed.is_terminal());
        assert!(CandidateStatus::Failed.is_terminal());
    }
}
