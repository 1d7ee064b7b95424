use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::cache::TraceLog;
use crate::config::Project;
use crate::entity::PromptVersion;
use crate::error::Result;

use super::{Executor, Invocation};

/// Records every invocation of the wrapped executor in a [`TraceLog`] and
/// hands back its trace reference.
pub struct TracedExecutor<E> {
    inner: E,
    log: Arc<TraceLog>,
}

impl<E: Executor> TracedExecutor<E> {
    pub fn new(inner: E, log: Arc<TraceLog>) -> Self {
        Self { inner, log }
    }
}

#[async_trait]
impl<E: Executor> Executor for TracedExecutor<E> {
    async fn invoke(&self, project: &Project, prompt: &PromptVersion, input: &Value) -> Result<Invocation> {
        let started = Instant::now();
        let result = self.inner.invoke(project, prompt, input).await;
        let elapsed = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut invocation) => {
                let duration_ms = invocation.duration_ms.unwrap_or(elapsed);
                match self
                    .log
                    .record(project.as_str(), &prompt.slug, input, Ok(&invocation.output), duration_ms)
                {
                    Ok(record) => {
                        invocation.trace_url.get_or_insert_with(|| record.url());
                    }
                    Err(e) => warn!(slug = %prompt.slug, error = %e, "could not record trace"),
                }
                invocation.duration_ms = Some(duration_ms);
                Ok(invocation)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(log_err) =
                    self.log
                        .record(project.as_str(), &prompt.slug, input, Err(&message), elapsed)
                {
                    warn!(slug = %prompt.slug, error = %log_err, "could not record trace");
                }
                Err(e)
            }
        }
    }
}
