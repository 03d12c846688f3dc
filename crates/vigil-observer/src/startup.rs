//! Observer server startup helper for embedding in the engine binary.
//!
//! Provides [`spawn_observer`] which launches the Observer HTTP +
//! `WebSocket` server on a background Tokio task, so the API runs
//! concurrently with the mission.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vigil_observer::server::ServerConfig;
//! use vigil_observer::startup::spawn_observer;
//! use vigil_observer::state::AppState;
//! use std::sync::Arc;
//!
//! let state = Arc::new(AppState::new(hub, mission));
//! let (addr, handle) = spawn_observer(&ServerConfig::default(), state).await?;
//! // The server is now running. Abort the handle on shutdown.
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the Observer HTTP server on a background Tokio task.
///
/// The listener is bound before the task is spawned, so an unusable
/// address is reported to the caller instead of being logged from the
/// background. Returns the bound address and the task handle.
///
/// The server runs until the Tokio runtime is shut down or the task is
/// aborted.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the server cannot bind to the
/// requested address.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<(SocketAddr, JoinHandle<()>), StartupError> {
    let listener = crate::server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::serve(listener, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%addr, "Observer server spawned on background task");

    Ok((addr, handle))
}
