//! Shared type definitions for the Vigil orchestration engine.
//!
//! This crate is the single source of truth for the data that crosses
//! crate boundaries and the telemetry wire. Types flow downstream to
//! `TypeScript` via `ts-rs` for dashboard clients.
//!
//! # Modules
//!
//! - [`ids`] -- Mission/round identifiers and event sequence ids
//! - [`enums`] -- Event categories, candidate status, mission phase
//! - [`structs`] -- Events, candidate records, gate results, mission state
//! - [`wire`] -- Server and client telemetry messages

pub mod enums;
pub mod ids;
pub mod structs;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use enums::{CandidateStatus, EventCategory, MissionPhase};
pub use ids::{MissionId, RoundId, SequenceId};
pub use structs::{CandidateRecord, Event, GateResult, MissionOutcome, MissionState};
pub use wire::{ClientMessage, ServerMessage};
