//! Prompt execution: the executor collaborator and paired A/B runs.

mod command;
mod dry_run;
mod dual;
mod output;
mod traced;

pub use command::CommandExecutor;
pub use dry_run::DryRunExecutor;
pub use dual::DualExecutor;
pub use output::extract_output;
pub use traced::TracedExecutor;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::Project;
use crate::entity::PromptVersion;
use crate::error::Result;

/// What the execution collaborator returns for one successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub output: Value,
    /// Duration reported by the collaborator, if it measures one
    pub duration_ms: Option<u64>,
    pub trace_url: Option<String>,
}

impl Invocation {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            duration_ms: None,
            trace_url: None,
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn invoke(&self, project: &Project, prompt: &PromptVersion, input: &Value) -> Result<Invocation>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    async fn invoke(&self, project: &Project, prompt: &PromptVersion, input: &Value) -> Result<Invocation> {
        (**self).invoke(project, prompt, input).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Original,
    Candidate,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Original => f.write_str("original"),
            Variant::Candidate => f.write_str("candidate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Timeout,
    Invocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Succeeded {
        output: Value,
        duration_ms: u64,
        trace_url: Option<String>,
    },
    Failed {
        kind: FailureKind,
        message: String,
        duration_ms: u64,
    },
}

/// Result of running one side of an A/B comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub variant: Variant,
    pub slug: String,
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Failed { .. })
    }

    /// Duration of a successful run.
    pub fn duration_ms(&self) -> Option<u64> {
        match self.outcome {
            ExecutionOutcome::Succeeded { duration_ms, .. } => Some(duration_ms),
            ExecutionOutcome::Failed { .. } => None,
        }
    }
}

/// Results of one A/B invocation, always in (original, candidate) order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedResults {
    pub original: ExecutionResult,
    pub candidate: ExecutionResult,
}

impl PairedResults {
    pub fn both_failed(&self) -> bool {
        self.original.is_failure() && self.candidate.is_failure()
    }

    pub fn one_failed(&self) -> bool {
        self.original.is_failure() != self.candidate.is_failure()
    }

    /// Signed `candidate - original` duration when both succeeded.
    pub fn duration_delta_ms(&self) -> Option<i64> {
        let original = self.original.duration_ms()?;
        let candidate = self.candidate.duration_ms()?;
        Some(candidate as i64 - original as i64)
    }
}
