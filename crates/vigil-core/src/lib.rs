//! Event log, telemetry hub, and mission orchestration for Vigil.
//!
//! This crate owns the engine's sequencing: pre-flight fix-ups, the gate
//! sequence, candidate evaluation, and the periodic healing, publish and
//! status timers. Everything it does is reported as [`Event`]s through
//! the [`TelemetryHub`].
//!
//! # Modules
//!
//! - [`event_log`] -- Bounded, ordered in-memory event log.
//! - [`hub`] -- Event log plus fan-out to connected observers.
//! - [`collaborator`] -- Traits for external work functions and the
//!   guarded call wrapper.
//! - [`gate`] -- Ordered verification gates.
//! - [`candidate`] -- Scoring rubric and candidate evaluator.
//! - [`healing`] -- Re-entrancy guarded healing loop.
//! - [`mission`] -- Shared mission state and control signals.
//! - [`scheduler`] -- Periodic timers and their lifecycle.
//! - [`orchestrator`] -- Mission sequencing from pre-flight to scheduler.
//! - [`config`] -- Configuration loading from `vigil-config.yaml` into
//!   strongly-typed structs.
//!
//! [`Event`]: vigil_types::Event
//! [`TelemetryHub`]: hub::TelemetryHub

pub mod candidate;
pub mod collaborator;
pub mod config;
pub mod event_log;
pub mod gate;
pub mod healing;
pub mod hub;
pub mod mission;
pub mod orchestrator;
pub mod scheduler;
