//! Collaborators backed by external commands.
//!
//! Every gate, candidate, healing step and hook in `vigil-config.yaml`
//! is a program plus arguments. The adapters here spawn it with
//! [`tokio::process::Command`], collect its output and translate the
//! exit status into the report the engine expects:
//!
//! | Role | Success means | Extra |
//! |------|---------------|-------|
//! | gate | `passed` | last output lines become `details` |
//! | candidate | scored run | last stdout line, if a JSON object, becomes `metrics` |
//! | healing / pre-flight step | `fixed` | last output line becomes `detail` |
//! | publish hook | `pushed` | |
//! | apply-winner hook | applied | `VIGIL_WINNER`, `VIGIL_WINNER_SCORE` set |
//!
//! A non-zero exit is a failed gate or an unfixed issue, but an *error*
//! for candidates and hooks. Spawn failures are always errors.
//!
//! Children are spawned with `kill_on_drop`, so the engine's per-call
//! timeout also terminates the process.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use futures::future::BoxFuture;
use tracing::{debug, instrument};
use vigil_core::collaborator::{
    CandidateStrategy, CollaboratorError, FixReport, GateReport, IssueFixer, PublishReport,
    Publisher, StrategyReport, VerificationGate, WinnerSink,
};
use vigil_core::config::{CandidateSpec, CommandSpec, WorkflowConfig};
use vigil_core::orchestrator::Workflow;
use vigil_types::CandidateRecord;

/// Number of trailing output lines kept as gate details.
const DETAIL_LINES: usize = 20;

/// Captured result of one command run.
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// Last `n` non-empty lines of stdout followed by stderr.
    fn tail(&self, n: usize) -> Vec<String> {
        let lines: Vec<&str> = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|l| !l.trim().is_empty())
            .collect();
        let skip = lines.len().saturating_sub(n);
        lines.into_iter().skip(skip).map(str::to_owned).collect()
    }

    fn last_line(&self) -> Option<String> {
        self.tail(1).pop()
    }

    fn failure(&self, program: &str) -> anyhow::Error {
        let reason = self.last_line().unwrap_or_default();
        anyhow!("{program} exited with status {:?}: {reason}", self.code)
    }
}

#[instrument(skip_all, fields(name = name, program = program))]
async fn run_command(
    name: &str,
    program: &str,
    args: &[String],
    working_dir: Option<&str>,
    envs: &[(&str, String)],
) -> Result<CommandOutput> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to run '{name}' ({program})"))?;
    debug!(code = ?output.status.code(), "command finished");

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

async fn run_spec(spec: &CommandSpec, envs: &[(&str, String)]) -> Result<CommandOutput> {
    run_command(
        &spec.name,
        &spec.program,
        &spec.args,
        spec.working_dir.as_deref(),
        envs,
    )
    .await
}

fn to_collaborator(e: &anyhow::Error) -> CollaboratorError {
    CollaboratorError::failed(format!("{e:#}"))
}

/// Parse the last stdout line as a JSON object of metrics.
fn parse_metrics(stdout: &str) -> BTreeMap<String, serde_json::Value> {
    let Some(line) = stdout.lines().rev().find(|l| !l.trim().is_empty()) else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<serde_json::Value>(line.trim()) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// A verification gate that passes when its command exits successfully.
pub struct CommandGate(pub CommandSpec);

impl VerificationGate for CommandGate {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn verify(&self) -> BoxFuture<'_, Result<GateReport, CollaboratorError>> {
        Box::pin(async move {
            let output = run_spec(&self.0, &[]).await.map_err(|e| to_collaborator(&e))?;
            Ok(GateReport {
                passed: output.success,
                details: output.tail(DETAIL_LINES),
            })
        })
    }
}

/// A candidate strategy run as a command.
///
/// The strategy reports success unless its metrics carry
/// `"success": false`.
pub struct CommandStrategy(pub CandidateSpec);

impl CandidateStrategy for CommandStrategy {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn description(&self) -> &str {
        &self.0.description
    }

    fn run(&self) -> BoxFuture<'_, Result<StrategyReport, CollaboratorError>> {
        Box::pin(async move {
            let spec = &self.0;
            let output = run_command(
                &spec.name,
                &spec.program,
                &spec.args,
                spec.working_dir.as_deref(),
                &[],
            )
            .await
            .map_err(|e| to_collaborator(&e))?;
            if !output.success {
                return Err(to_collaborator(&output.failure(&spec.program)));
            }
            let metrics = parse_metrics(&output.stdout);
            let success = metrics
                .get("success")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true);
            Ok(StrategyReport { success, metrics })
        })
    }
}

/// A detect-and-fix step that reports its issue fixed on a zero exit.
pub struct CommandFixer(pub CommandSpec);

impl IssueFixer for CommandFixer {
    fn kind(&self) -> &str {
        &self.0.name
    }

    fn detect_and_fix(&self) -> BoxFuture<'_, Result<FixReport, CollaboratorError>> {
        Box::pin(async move {
            let output = run_spec(&self.0, &[]).await.map_err(|e| to_collaborator(&e))?;
            Ok(FixReport {
                fixed: output.success,
                detail: output.last_line(),
            })
        })
    }
}

/// The publish hook.
pub struct CommandPublisher(pub CommandSpec);

impl Publisher for CommandPublisher {
    fn publish_pending(&self) -> BoxFuture<'_, Result<PublishReport, CollaboratorError>> {
        Box::pin(async move {
            let output = run_spec(&self.0, &[]).await.map_err(|e| to_collaborator(&e))?;
            if !output.success {
                return Err(to_collaborator(&output.failure(&self.0.program)));
            }
            Ok(PublishReport { pushed: true })
        })
    }
}

/// The apply-winner hook. Receives the winner in its environment.
pub struct CommandWinnerSink(pub CommandSpec);

impl WinnerSink for CommandWinnerSink {
    fn apply_winner<'a>(
        &'a self,
        winner: &'a CandidateRecord,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let envs = [
                ("VIGIL_WINNER", winner.name.clone()),
                ("VIGIL_WINNER_SCORE", winner.score.to_string()),
            ];
            let output = run_spec(&self.0, &envs)
                .await
                .map_err(|e| to_collaborator(&e))?;
            if output.success {
                Ok(())
            } else {
                Err(to_collaborator(&output.failure(&self.0.program)))
            }
        })
    }
}

/// Build the orchestrator workflow from the configured commands.
pub fn build_workflow(config: &WorkflowConfig) -> Workflow {
    fn fixers(specs: &[CommandSpec]) -> Vec<Arc<dyn IssueFixer>> {
        specs
            .iter()
            .map(|s| Arc::new(CommandFixer(s.clone())) as Arc<dyn IssueFixer>)
            .collect()
    }

    Workflow {
        preflight: fixers(&config.preflight),
        gates: config
            .gates
            .iter()
            .map(|s| Arc::new(CommandGate(s.clone())) as Arc<dyn VerificationGate>)
            .collect(),
        candidates: config
            .candidates
            .iter()
            .map(|s| Arc::new(CommandStrategy(s.clone())) as Arc<dyn CandidateStrategy>)
            .collect(),
        healing_steps: fixers(&config.healing),
        winner_sink: config
            .apply_winner
            .clone()
            .map(|s| Arc::new(CommandWinnerSink(s)) as Arc<dyn WinnerSink>),
        publisher: config
            .publish
            .clone()
            .map(|s| Arc::new(CommandPublisher(s)) as Arc<dyn Publisher>),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vigil_types::CandidateStatus;

    use super::*;

    fn sh(name: &str, script: &str) -> CommandSpec {
        CommandSpec {
            name: name.to_owned(),
            program: String::from("sh"),
            args: vec![String::from("-c"), script.to_owned()],
            working_dir: None,
        }
    }

    #[test]
    fn metrics_come_from_last_json_line() {
        let metrics = parse_metrics("building...\n{\"coverage\": 0.8, \"success\": true}\n\n");
        assert_eq!(metrics.get("coverage"), Some(&serde_json::json!(0.8)));
        assert_eq!(metrics.get("success"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn non_object_output_has_no_metrics() {
        assert!(parse_metrics("done").is_empty());
        assert!(parse_metrics("[1, 2]").is_empty());
        assert!(parse_metrics("").is_empty());
    }

    #[tokio::test]
    async fn gate_reflects_exit_status() {
        let pass = CommandGate(sh("ok", "echo fine"));
        let report = pass.verify().await.unwrap();
        assert!(report.passed);
        assert_eq!(report.details, vec![String::from("fine")]);

        let fail = CommandGate(sh("lint", "echo 'warning: unused' >&2; exit 1"));
        let report = fail.verify().await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.details, vec![String::from("warning: unused")]);
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let gate = CommandGate(CommandSpec {
            name: String::from("ghost"),
            program: String::from("/definitely/not/a/program"),
            args: Vec::new(),
            working_dir: None,
        });
        assert!(gate.verify().await.is_err());
    }

    #[tokio::test]
    async fn failing_candidate_is_an_error() {
        let strategy = CommandStrategy(CandidateSpec {
            name: String::from("broken"),
            description: String::new(),
            program: String::from("sh"),
            args: vec![String::from("-c"), String::from("exit 3")],
            working_dir: None,
        });
        assert!(strategy.run().await.is_err());
    }

    #[tokio::test]
    async fn winner_sink_sees_winner_in_env() {
        let sink = CommandWinnerSink(sh(
            "apply",
            "test \"$VIGIL_WINNER\" = bold && test \"$VIGIL_WINNER_SCORE\" = 90",
        ));
        let mut winner = CandidateRecord::pending("bold", "");
        winner.score = 90;
        winner.status = CandidateStatus::Completed;
        assert!(sink.apply_winner(&winner).await.is_ok());

        winner.name = String::from("other");
        assert!(sink.apply_winner(&winner).await.is_err());
    }

    #[test]
    fn workflow_maps_every_section() {
        let config = WorkflowConfig {
            preflight: vec![sh("pre", "true")],
            gates: vec![sh("build", "true"), sh("test", "true")],
            candidates: Vec::new(),
            healing: vec![sh("heal", "true")],
            publish: Some(sh("push", "true")),
            apply_winner: None,
        };
        let workflow = build_workflow(&config);
        assert_eq!(workflow.preflight.len(), 1);
        assert_eq!(workflow.gates.len(), 2);
        assert_eq!(workflow.healing_steps.len(), 1);
        assert!(workflow.publisher.is_some());
        assert!(workflow.winner_sink.is_none());
    }
}
