//! Interfaces to the external work functions the engine drives.
//!
//! The engine never knows what a gate, candidate strategy or healing step
//! actually does. It only calls these traits and tolerates any of them
//! failing: every call goes through [`guarded`], which turns an error, a
//! panic or a timeout into a [`CollaboratorError`] value.
//!
//! Methods return boxed futures so the traits stay object-safe and
//! collaborators can be stored as `Arc<dyn Trait>` lists.
//!
//! The `Fn*` adapters wrap closures, which is convenient for tests and for
//! embedding the engine as a library.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt as _;
use futures::future::{self, BoxFuture};
use vigil_types::CandidateRecord;

/// Failure of an external collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator reported an error.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// The collaborator panicked.
    #[error("panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },

    /// The collaborator did not finish within the configured limit.
    #[error("timed out after {after_ms}ms")]
    TimedOut {
        /// The limit that was exceeded.
        after_ms: u64,
    },
}

impl CollaboratorError {
    /// Shorthand for [`CollaboratorError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What a verification gate reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Whether the gate passed.
    pub passed: bool,
    /// Diagnostic lines.
    pub details: Vec<String>,
}

/// What a candidate strategy reports about its own run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyReport {
    /// Whether the strategy considers its own run a success.
    pub success: bool,
    /// Free-form metrics; rubric bonus fields are looked up here.
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// What a detect-and-fix step reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixReport {
    /// Whether the issue is absent or was fixed.
    pub fixed: bool,
    /// Optional diagnostic text.
    pub detail: Option<String>,
}

/// What the publish hook reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Whether anything was published.
    pub pushed: bool,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A named pass/fail verification step (build, lint, tests, ...).
pub trait VerificationGate: Send + Sync {
    /// Gate name used in events and results.
    fn name(&self) -> &str;

    /// Run the check.
    fn verify(&self) -> BoxFuture<'_, Result<GateReport, CollaboratorError>>;
}

/// One of several alternative strategies competing for selection.
pub trait CandidateStrategy: Send + Sync {
    /// Candidate name, unique within a round.
    fn name(&self) -> &str;

    /// Short description of the approach.
    fn description(&self) -> &str;

    /// Execute the strategy.
    fn run(&self) -> BoxFuture<'_, Result<StrategyReport, CollaboratorError>>;
}

/// A detect-and-fix step for one kind of issue.
pub trait IssueFixer: Send + Sync {
    /// The issue kind this step handles (e.g. `repo-integrity`).
    fn kind(&self) -> &str;

    /// Detect the issue and fix it if present.
    fn detect_and_fix(&self) -> BoxFuture<'_, Result<FixReport, CollaboratorError>>;
}

/// Materializes the winning candidate as the production artifact.
pub trait WinnerSink: Send + Sync {
    /// Apply the winner.
    fn apply_winner<'a>(
        &'a self,
        winner: &'a CandidateRecord,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// Publishes pending work (e.g. commits and pushes).
pub trait Publisher: Send + Sync {
    /// Publish whatever is pending.
    fn publish_pending(&self) -> BoxFuture<'_, Result<PublishReport, CollaboratorError>>;
}

// ---------------------------------------------------------------------------
// Guarded invocation
// ---------------------------------------------------------------------------

/// Call a collaborator and await its future, converting panics and
/// timeouts to errors.
///
/// `call` is invoked inside the unwind boundary, so a collaborator that
/// panics before handing back its future is caught like one that panics
/// while being polled. `timeout` of `None` means no limit.
pub async fn guarded<T, C, F>(timeout: Option<Duration>, call: C) -> Result<T, CollaboratorError>
where
    C: FnOnce() -> F,
    F: Future<Output = Result<T, CollaboratorError>>,
{
    let caught = AssertUnwindSafe(future::lazy(|_| call()).flatten()).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, caught).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(CollaboratorError::TimedOut {
                    after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                });
            }
        },
        None => caught.await,
    };

    outcome.unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("non-string panic payload"));
        Err(CollaboratorError::Panicked { message })
    })
}

// ---------------------------------------------------------------------------
// Closure adapters
// ---------------------------------------------------------------------------

/// A [`VerificationGate`] backed by an async closure.
pub struct FnGate<F> {
    name: String,
    check: F,
}

impl<F> FnGate<F> {
    /// Wrap `check` as a gate called `name`.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F, Fut> VerificationGate for FnGate<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<GateReport, CollaboratorError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn verify(&self) -> BoxFuture<'_, Result<GateReport, CollaboratorError>> {
        Box::pin((self.check)())
    }
}

/// A [`CandidateStrategy`] backed by an async closure.
pub struct FnStrategy<F> {
    name: String,
    description: String,
    run: F,
}

impl<F> FnStrategy<F> {
    /// Wrap `run` as a candidate.
    pub fn new(name: impl Into<String>, description: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            run,
        }
    }
}

impl<F, Fut> CandidateStrategy for FnStrategy<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StrategyReport, CollaboratorError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self) -> BoxFuture<'_, Result<StrategyReport, CollaboratorError>> {
        Box::pin((self.run)())
    }
}

/// An [`IssueFixer`] backed by an async closure.
pub struct FnFixer<F> {
    kind: String,
    fix: F,
}

impl<F> FnFixer<F> {
    /// Wrap `fix` as a step for issues of `kind`.
    pub fn new(kind: impl Into<String>, fix: F) -> Self {
        Self {
            kind: kind.into(),
            fix,
        }
    }
}

impl<F, Fut> IssueFixer for FnFixer<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<FixReport, CollaboratorError>> + Send + 'static,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    fn detect_and_fix(&self) -> BoxFuture<'_, Result<FixReport, CollaboratorError>> {
        Box::pin((self.fix)())
    }
}
