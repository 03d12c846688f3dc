//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds the engine's telemetry hub and mission context.
//! Both are owned by the orchestrator; the observer only reads from them
//! and forwards operator requests.

use std::sync::Arc;

use vigil_core::hub::TelemetryHub;
use vigil_core::mission::MissionContext;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Event log and observer fan-out.
    pub hub: Arc<TelemetryHub>,
    /// Mission state and control signals.
    pub mission: Arc<MissionContext>,
}

impl AppState {
    /// Create application state over the engine's hub and mission.
    pub const fn new(hub: Arc<TelemetryHub>, mission: Arc<MissionContext>) -> Self {
        Self { hub, mission }
    }
}
