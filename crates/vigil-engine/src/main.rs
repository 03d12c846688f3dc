//! Vigil engine binary.
//!
//! Wires the command-backed workflow from `vigil-config.yaml` into the
//! orchestrator, serves the observer API and keeps the mission alive
//! until Ctrl-C or an operator stop request.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `vigil-config.yaml` (defaults when absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the workflow and the orchestrator
//! 4. Start the Observer API server
//! 5. Run the mission: pre-flight, gates, candidates, then the timers
//! 6. Wait for a stop signal and shut down gracefully

mod commands;
mod error;

use std::future::Future;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vigil_core::config::EngineConfig;
use vigil_core::mission::MissionContext;
use vigil_core::orchestrator::{MissionReport, Orchestrator};
use vigil_observer::server::ServerConfig;
use vigil_observer::startup::spawn_observer;
use vigil_observer::state::AppState;

use crate::error::EngineError;

const CONFIG_FILE: &str = "vigil-config.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    let config = load_config();
    let level = config
        .as_ref()
        .map_or("info", |c| c.logging.level.as_str())
        .to_owned();
    init_tracing(&level);

    info!("vigil-engine starting");
    match run(config).await {
        Ok(()) => {
            info!("vigil-engine stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "vigil-engine failed to start");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the configured level; an unparsable level
/// falls back to `info`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Load `vigil-config.yaml` from the working directory, falling back
/// to defaults when the file does not exist.
fn load_config() -> Result<EngineConfig, EngineError> {
    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        Ok(EngineConfig::from_file(config_path)?)
    } else {
        Ok(EngineConfig::parse("")?)
    }
}

async fn run(config: Result<EngineConfig, EngineError>) -> Result<(), EngineError> {
    let config = config?;
    info!(
        mission = config.mission.name,
        gates = config.workflow.gates.len(),
        candidates = config.workflow.candidates.len(),
        healing_steps = config.workflow.healing.len(),
        "Configuration loaded"
    );

    let workflow = commands::build_workflow(&config.workflow);
    let orchestrator = Orchestrator::new(&config, workflow)?;

    let server_config = ServerConfig::from(&config.infrastructure);
    let state = Arc::new(AppState::new(
        Arc::clone(orchestrator.hub()),
        Arc::clone(orchestrator.mission()),
    ));
    let (addr, observer) = spawn_observer(&server_config, state).await?;
    info!(%addr, "Observer API server started");

    let result = supervise(&orchestrator, shutdown_signal(orchestrator.mission())).await;
    observer.abort();
    result
}

/// Run the mission sequence, then keep the mission alive until `stop`
/// resolves.
///
/// `stop` is watched from the start, so a stop during pre-flight, gating
/// or evaluation abandons the sequence. Dropping it kills any running
/// child command.
async fn supervise<S>(orchestrator: &Orchestrator, stop: S) -> Result<(), EngineError>
where
    S: Future<Output = ()>,
{
    tokio::pin!(stop);
    tokio::select! {
        result = orchestrator.run_mission() => {
            log_report(&result?);
            (&mut stop).await;
        }
        () = &mut stop => {
            info!("Stop requested before the mission sequence finished");
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

fn log_report(report: &MissionReport) {
    if report.degraded() {
        warn!(
            failed = report.outcome.failed_gates().len(),
            "Gates failed, running in degraded mode"
        );
    } else {
        info!(
            winner_applied = report.winner_applied,
            "Mission sequence complete"
        );
    }
}

/// Resolve on Ctrl-C or an operator stop request.
async fn shutdown_signal(mission: &MissionContext) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for Ctrl-C, stopping");
            } else {
                info!("Ctrl-C received, stopping");
            }
        }
        () = mission.wait_for_stop() => {
            info!("Operator stop received");
        }
    }
}
