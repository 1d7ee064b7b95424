use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Project, DEFAULT_INVOKE_TIMEOUT_MS};
use crate::entity::PromptVersion;

use super::{ExecutionOutcome, ExecutionResult, Executor, FailureKind, PairedResults, Variant};

/// Runs an original and a candidate prompt against the same input at the
/// same time.
#[derive(Clone)]
pub struct DualExecutor {
    executor: Arc<dyn Executor>,
    timeout: Duration,
}

impl DualExecutor {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            timeout: Duration::from_millis(DEFAULT_INVOKE_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one side. Failures and timeouts become a failed outcome rather
    /// than an error.
    pub async fn run_one(
        &self,
        variant: Variant,
        project: &Project,
        prompt: &PromptVersion,
        input: &Value,
    ) -> ExecutionResult {
        let started = Instant::now();
        let call = self.executor.invoke(project, prompt, input);
        let result = tokio::time::timeout(self.timeout, call).await;
        let elapsed = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(invocation)) => {
                debug!(%variant, slug = %prompt.slug, elapsed, "invocation finished");
                ExecutionOutcome::Succeeded {
                    output: invocation.output,
                    duration_ms: invocation.duration_ms.unwrap_or(elapsed),
                    trace_url: invocation.trace_url,
                }
            }
            Ok(Err(e)) => {
                warn!(%variant, slug = %prompt.slug, error = %e, "invocation failed");
                ExecutionOutcome::Failed {
                    kind: FailureKind::Invocation,
                    message: e.to_string(),
                    duration_ms: elapsed,
                }
            }
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(%variant, slug = %prompt.slug, timeout_ms, "invocation timed out");
                ExecutionOutcome::Failed {
                    kind: FailureKind::Timeout,
                    message: format!("timed out after {timeout_ms}ms"),
                    duration_ms: elapsed,
                }
            }
        };

        ExecutionResult {
            variant,
            slug: prompt.slug.clone(),
            outcome,
        }
    }

    /// Run both prompts concurrently and wait for both to settle.
    pub async fn run_pair(
        &self,
        project: &Project,
        original: &PromptVersion,
        candidate: &PromptVersion,
        input: &Value,
    ) -> PairedResults {
        let (original, candidate) = tokio::join!(
            self.run_one(Variant::Original, project, original, input),
            self.run_one(Variant::Candidate, project, candidate, input),
        );
        PairedResults { original, candidate }
    }
}
