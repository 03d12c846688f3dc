//! Configuration loading and typed config structures for Vigil.
//!
//! The canonical configuration lives in `vigil-config.yaml` next to the
//! engine binary's working directory. This module defines strongly-typed
//! structs that mirror the YAML structure, and provides a loader that
//! reads and validates the file. Every field has a default, so an empty
//! file (or no file at all) yields a runnable configuration.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::candidate::ScoringRubric;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an unusable engine.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong with the configuration.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `vigil-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Mission identity.
    #[serde(default)]
    pub mission: MissionConfig,

    /// Event log and observer fan-out limits.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Periodic timer intervals.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Candidate scoring rubric.
    #[serde(default)]
    pub scoring: ScoringRubric,

    /// Limits applied to every collaborator call.
    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    /// Network settings for the observer server.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Audit snapshot settings.
    #[serde(default)]
    pub audit: AuditConfig,

    /// External work functions, expressed as commands.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `VIGIL_HOST` overrides `infrastructure.host`
    /// - `VIGIL_PORT` overrides `infrastructure.observer_port`
    /// - `VIGIL_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment
    /// overrides and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VIGIL_HOST") {
            self.infrastructure.host = val;
        }
        if let Ok(val) = std::env::var("VIGIL_PORT") {
            match val.parse() {
                Ok(port) => self.infrastructure.observer_port = port,
                Err(e) => tracing::warn!(value = val, error = %e, "ignoring invalid VIGIL_PORT"),
            }
        }
        if let Ok(val) = std::env::var("VIGIL_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero log capacity, a zero
    /// observer buffer, a zero score cap, or duplicate candidate names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.log_capacity == 0 {
            return Err(invalid("telemetry.log_capacity must be at least 1"));
        }
        if self.telemetry.observer_buffer == 0 {
            return Err(invalid("telemetry.observer_buffer must be at least 1"));
        }
        if self.scoring.max_score == 0 {
            return Err(invalid("scoring.max_score must be at least 1"));
        }

        let mut seen = BTreeSet::new();
        for candidate in &self.workflow.candidates {
            if !seen.insert(candidate.name.as_str()) {
                return Err(invalid(&format!(
                    "duplicate candidate name '{}'",
                    candidate.name
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_owned(),
    }
}

/// Mission identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MissionConfig {
    /// Human-readable mission name.
    #[serde(default = "default_mission_name")]
    pub name: String,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            name: default_mission_name(),
        }
    }
}

/// Event log and observer fan-out limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelemetryConfig {
    /// Number of events retained in memory. Oldest entries are evicted first.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Messages buffered per observer before it is considered too slow
    /// and dropped.
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            observer_buffer: default_observer_buffer(),
        }
    }
}

/// Periodic timer intervals. A value of 0 disables the timer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    /// Milliseconds between healing cycles.
    #[serde(default = "default_healing_interval_ms")]
    pub healing_interval_ms: u64,

    /// Milliseconds between "publish pending work" calls.
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Milliseconds between status snapshots pushed to observers.
    #[serde(default = "default_status_broadcast_interval_ms")]
    pub status_broadcast_interval_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            healing_interval_ms: default_healing_interval_ms(),
            publish_interval_ms: default_publish_interval_ms(),
            status_broadcast_interval_ms: default_status_broadcast_interval_ms(),
        }
    }
}

/// Limits applied to every collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollaboratorConfig {
    /// Maximum milliseconds a single collaborator call may take (0 = unlimited).
    #[serde(default = "default_collaborator_timeout_ms")]
    pub timeout_ms: u64,
}

impl CollaboratorConfig {
    /// The timeout as a [`Duration`], or `None` when unlimited.
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_collaborator_timeout_ms(),
        }
    }
}

/// Network settings for the observer server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Observer HTTP + `WebSocket` port.
    #[serde(default = "default_observer_port")]
    pub observer_port: u16,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            observer_port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Audit snapshot settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuditConfig {
    /// File the status timer rewrites with the mission state as JSON.
    /// Disabled when absent.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

/// An external command used as a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandSpec {
    /// Name of the gate, healing step or hook.
    pub name: String,
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory. Defaults to the engine's working directory.
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// A candidate strategy backed by an external command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CandidateSpec {
    /// Candidate name, unique within the workflow.
    pub name: String,
    /// Short description of the strategy.
    #[serde(default)]
    pub description: String,
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory. Defaults to the engine's working directory.
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// External work functions, expressed as commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkflowConfig {
    /// Best-effort fix-ups run once before the gates.
    #[serde(default)]
    pub preflight: Vec<CommandSpec>,
    /// Verification gates, run in declared order.
    #[serde(default)]
    pub gates: Vec<CommandSpec>,
    /// Candidate strategies, evaluated in declared order.
    #[serde(default)]
    pub candidates: Vec<CandidateSpec>,
    /// Steps of every healing cycle, run in declared order.
    #[serde(default)]
    pub healing: Vec<CommandSpec>,
    /// Hook that publishes pending work.
    #[serde(default)]
    pub publish: Option<CommandSpec>,
    /// Hook that materializes the winning candidate.
    #[serde(default)]
    pub apply_winner: Option<CommandSpec>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_mission_name() -> String {
    String::from("vigil")
}

const fn default_log_capacity() -> usize {
    500
}

const fn default_observer_buffer() -> usize {
    256
}

const fn default_healing_interval_ms() -> u64 {
    60_000
}

const fn default_publish_interval_ms() -> u64 {
    300_000
}

const fn default_status_broadcast_interval_ms() -> u64 {
    5_000
}

const fn default_collaborator_timeout_ms() -> u64 {
    600_000
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.telemetry.log_capacity, 500);
        assert_eq!(config.schedule.healing_interval_ms, 60_000);
        assert_eq!(config.scoring.base, 50);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
mission:
  name: "nightly-repair"

telemetry:
  log_capacity: 100
  observer_buffer: 16

schedule:
  healing_interval_ms: 1000
  publish_interval_ms: 0
  status_broadcast_interval_ms: 250

scoring:
  base: 40
  bonus_fields:
    coverage: 5

collaborators:
  timeout_ms: 0

workflow:
  gates:
    - name: build
      program: cargo
      args: ["build"]
    - name: test
      program: cargo
      args: ["test"]
  candidates:
    - name: minimal
      description: "smallest diff"
      program: ./strategies/minimal.sh
  healing:
    - name: repo-integrity
      program: git
      args: ["fsck"]
  publish:
    name: push
    program: git
    args: ["push"]
"#;

        let config = EngineConfig::parse(yaml).unwrap();

        assert_eq!(config.mission.name, "nightly-repair");
        assert_eq!(config.telemetry.log_capacity, 100);
        assert_eq!(config.schedule.publish_interval_ms, 0);
        assert_eq!(config.scoring.base, 40);
        assert_eq!(config.scoring.success_bonus, 30);
        assert_eq!(config.scoring.bonus_fields.get("coverage"), Some(&5));
        assert!(config.collaborators.timeout().is_none());
        assert_eq!(config.workflow.gates.len(), 2);
        assert_eq!(config.workflow.gates[1].args, vec!["test"]);
        assert_eq!(config.workflow.candidates[0].description, "smallest diff");
        assert!(config.workflow.publish.is_some());
        assert!(config.workflow.apply_winner.is_none());
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = EngineConfig::parse("telemetry:\n  log_capacity: 7\n").unwrap();
        assert_eq!(config.telemetry.log_capacity, 7);
        // Everything else uses defaults.
        assert_eq!(config.telemetry.observer_buffer, 256);
        assert_eq!(config.mission.name, "vigil");
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(EngineConfig::parse("").is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = EngineConfig::parse("telemetry:\n  log_capacity: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn duplicate_candidates_are_rejected() {
        let yaml = r"
workflow:
  candidates:
    - name: a
      program: 'true'
    - name: a
      program: 'false'
";
        let result = EngineConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = EngineConfig::parse("telemetry: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("vigil-config.yaml");
        if path.exists() {
            let config = EngineConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
