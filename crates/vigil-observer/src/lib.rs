//! Observer API server for the Vigil engine.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) streaming the telemetry wire
//!   protocol: the event log backlog on connect, then every new event,
//!   candidate table and status snapshot as it happens
//! - **REST endpoints** for querying mission state, the event log and
//!   the last evaluation round
//! - **Operator REST endpoints** for requesting a healing cycle or a
//!   graceful stop
//!
//! # Architecture
//!
//! Handlers read straight from the shared
//! [`TelemetryHub`](vigil_core::hub::TelemetryHub) and
//! [`MissionContext`](vigil_core::mission::MissionContext). Each
//! `WebSocket` client is one hub observer with its own bounded queue, so
//! a slow client is disconnected instead of slowing the engine down.

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::spawn_observer;
pub use state::AppState;
