//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /health` -- liveness probe
/// - `GET /ws` -- `WebSocket` telemetry stream
/// - `GET /api/status` -- current mission state
/// - `GET /api/events` -- event log snapshot
/// - `GET /api/candidates` -- last evaluation round
/// - `POST /api/operator/heal` -- request a healing cycle
/// - `POST /api/operator/stop` -- request graceful shutdown
///
/// Unknown routes get a JSON 404. CORS allows any origin.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // WebSocket
        .route("/ws", get(ws::ws_telemetry))
        // REST API
        .route("/api/status", get(handlers::get_status))
        .route("/api/events", get(handlers::list_events))
        .route("/api/candidates", get(handlers::list_candidates))
        // Operator
        .route("/api/operator/heal", post(operator::heal))
        .route("/api/operator/stop", post(operator::stop))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
