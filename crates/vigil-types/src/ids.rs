//! Type-safe identifier wrappers.
//!
//! Entity identifiers ([`MissionId`], [`RoundId`]) wrap a UUID v7 so they
//! sort by creation time. [`SequenceId`] is the numeric position of an
//! event in the event log and is assigned by the telemetry hub, never by
//! callers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Unique identifier for one mission (a single orchestrator run).
    MissionId
}

define_id! {
    /// Unique identifier for one candidate evaluation round.
    RoundId
}

/// Position of an event in the event log.
///
/// Starts at 1 and increases by exactly one per append for the lifetime
/// of the log. Ids of evicted events are never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct SequenceId(pub u64);

impl SequenceId {
    /// The id assigned to the very first event of a log.
    pub const FIRST: Self = Self(1);

    /// Return the id that follows this one.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Return the raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let mission = MissionId::new();
        let round = RoundId::new();
        assert_ne!(mission.into_inner(), Uuid::nil());
        assert_ne!(round.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = MissionId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn sequence_ids_advance_by_one() {
        assert_eq!(SequenceId::FIRST.next(), SequenceId(2));
        assert!(SequenceId(3) > SequenceId(2));
    }

    #[test]
    fn sequence_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&SequenceId(42)).ok();
        assert_eq!(json.as_deref(), Some("42"));
    }
}
