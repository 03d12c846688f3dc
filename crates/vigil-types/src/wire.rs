//! Telemetry wire protocol.
//!
//! Messages are JSON objects tagged by a `type` field:
//!
//! | Direction | `type` | Payload |
//! |-----------|--------|---------|
//! | server -> client | `init` | `events`: full log snapshot, sent once on connect |
//! | server -> client | `progress` | the fields of one [`Event`] |
//! | server -> client | `candidates` | `candidates`: records of the last round |
//! | server -> client | `status` | `mission`: current [`MissionState`] |
//! | server -> client | `response` | `message`: reply to a user message |
//! | client -> server | `userMessage` | `message` |

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::structs::{CandidateRecord, Event, MissionState};

/// A message pushed from the engine to an observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// Full event log snapshot, sent once when an observer connects.
    Init {
        /// Retained events in sequence order.
        events: Vec<Event>,
    },
    /// A newly appended event.
    Progress(Event),
    /// Results of an evaluation round.
    Candidates {
        /// Candidate records in declaration order.
        candidates: Vec<CandidateRecord>,
    },
    /// Periodic mission status snapshot.
    Status {
        /// Current mission state.
        mission: MissionState,
    },
    /// Acknowledgement of a client user message.
    Response {
        /// Acknowledgement text.
        message: String,
    },
}

/// A message sent from an observer to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// Free-form text from the observer, recorded in the event log.
    UserMessage {
        /// The message text.
        message: String,
    },
}
