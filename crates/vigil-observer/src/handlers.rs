//! REST API endpoint handlers for the Observer server.
//!
//! All handlers read from the shared [`AppState`]. Nothing here blocks
//! the engine: every read is a short copy under the hub or mission lock.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness probe |
//! | `GET` | `/api/status` | Current mission state |
//! | `GET` | `/api/events` | Event log snapshot (`limit`, `category`) |
//! | `GET` | `/api/candidates` | Records of the last evaluation round |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::Uri;
use axum::response::IntoResponse;
use vigil_types::EventCategory;

use crate::error::ObserverError;
use crate::state::AppState;

/// Query parameters for the `GET /api/events` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct EventsQuery {
    /// Return only the most recent `limit` matching events.
    pub limit: Option<usize>,
    /// Return only events of this category (case-insensitive).
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "observers": state.hub.observer_count(),
        "uptimeSeconds": state.mission.elapsed_seconds(),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Current mission state.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.mission.snapshot())
}

// ---------------------------------------------------------------------------
// GET /api/events
// ---------------------------------------------------------------------------

/// Snapshot of the event log, oldest first.
///
/// `category` filters before `limit` is applied, so `?category=Error&limit=5`
/// returns the five most recent errors.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let category = match query.category.as_deref() {
        Some(name) => Some(EventCategory::parse(name).ok_or_else(|| {
            ObserverError::InvalidQuery(format!("unknown event category '{name}'"))
        })?),
        None => None,
    };

    let mut events = state.hub.snapshot();
    if let Some(category) = category {
        events.retain(|e| e.category == category);
    }
    if let Some(limit) = query.limit {
        let skip = events.len().saturating_sub(limit);
        events.drain(..skip);
    }
    Ok(Json(events))
}

// ---------------------------------------------------------------------------
// GET /api/candidates
// ---------------------------------------------------------------------------

/// Candidate records of the last evaluation round.
pub async fn list_candidates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.hub.last_round())
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Respond to unknown routes with a JSON 404.
pub async fn not_found(uri: Uri) -> ObserverError {
    ObserverError::NotFound(format!("no route for {}", uri.path()))
}
