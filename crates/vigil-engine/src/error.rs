//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! that can abort startup. Anything after the scheduler starts is
//! reported through the event log instead.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: vigil_core::config::ConfigError,
    },

    /// The orchestrator could not be built or the mission could not start.
    #[error("orchestrator error: {source}")]
    Orchestrator {
        /// The underlying orchestrator error.
        #[from]
        source: vigil_core::orchestrator::OrchestratorError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: vigil_observer::startup::StartupError,
    },
}
