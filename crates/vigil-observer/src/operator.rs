//! Operator REST API handlers for runtime mission control.
//!
//! These endpoints are one-way commands from the operator to the engine.
//! They only raise signals on the shared
//! [`MissionContext`](vigil_core::mission::MissionContext); the scheduler
//! and the engine binary act on them.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/operator/heal` | Request an immediate healing cycle |
//! | `POST` | `/api/operator/stop` | Request a graceful shutdown |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;
use vigil_types::EventCategory;

use crate::state::AppState;

/// Generic operator response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the request was accepted.
    ok: bool,
    /// Human-readable message.
    message: String,
}

// ---------------------------------------------------------------------------
// POST /api/operator/heal
// ---------------------------------------------------------------------------

/// Ask the healing timer to run a cycle now.
///
/// Returns `202 Accepted`: the cycle runs asynchronously and is skipped
/// if one is already in progress.
pub async fn heal(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("operator requested healing cycle");
    state
        .hub
        .append(EventCategory::System, "Operator requested a healing cycle");
    state.mission.request_heal();

    (
        StatusCode::ACCEPTED,
        Json(OperatorResponse {
            ok: true,
            message: "Healing cycle requested".to_owned(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /api/operator/stop
// ---------------------------------------------------------------------------

/// Request a graceful shutdown.
///
/// The engine stops its timers, lets an in-flight healing cycle finish
/// and exits with status 0.
pub async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("operator requested stop");
    state
        .hub
        .append(EventCategory::System, "Operator requested shutdown");
    state.mission.request_stop();

    Json(OperatorResponse {
        ok: true,
        message: "Shutdown requested".to_owned(),
    })
}
