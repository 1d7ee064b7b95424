use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::Project;
use crate::entity::PromptVersion;
use crate::error::{PromptError, Result};
use crate::template::render;

use super::{extract_output, Executor, Invocation};

/// Runs an external command per invocation.
///
/// The command receives a JSON request on stdin:
/// `{"project", "slug", "model", "messages": [{"role", "content"}], "input"}`
/// and must print the model output on stdout. JSON stdout is reduced with
/// [`extract_output`]; anything else is taken as text.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| PromptError::Config("executor.command must not be empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn request(project: &Project, prompt: &PromptVersion, input: &Value) -> Value {
        let mut messages = Vec::new();
        let system = render(&prompt.system_message, input);
        if !system.is_empty() {
            messages.push(json!({"role": "system", "content": system}));
        }
        let user = render(&prompt.user_template, input);
        if !user.is_empty() {
            messages.push(json!({"role": "user", "content": user}));
        }
        json!({
            "project": project.as_str(),
            "slug": prompt.slug,
            "model": prompt.model,
            "messages": messages,
            "input": input,
        })
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn invoke(&self, project: &Project, prompt: &PromptVersion, input: &Value) -> Result<Invocation> {
        let request = serde_json::to_vec(&Self::request(project, prompt, input))?;
        let invocation_error = |message: String| PromptError::Invocation {
            slug: prompt.slug.clone(),
            message,
        };

        debug!(program = %self.program, slug = %prompt.slug, "spawning executor command");
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| invocation_error(format!("cannot start '{}': {e}", self.program)))?;

        // Feed stdin while draining stdout/stderr, or a child that answers
        // before reading everything blocks on a full pipe.
        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&request).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        match written {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(program = %self.program, "executor command closed stdin early");
            }
            other => other?,
        }
        let duration_ms = started.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(invocation_error(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = match serde_json::from_str::<Value>(&stdout) {
            Ok(parsed) => extract_output(parsed),
            Err(_) => Value::String(stdout.trim().to_string()),
        };

        Ok(Invocation {
            output: value,
            duration_ms: Some(duration_ms),
            trace_url: None,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_command_is_config_error() {
        assert!(matches!(CommandExecutor::new(&[]), Err(PromptError::Config(_))));
    }

    #[test]
    fn test_request_renders_messages() {
        let prompt = PromptVersion::new("greet", "m")
            .with_system("Be kind.")
            .with_user("Hello {{name}}");
        let request = CommandExecutor::request(&Project::new("p"), &prompt, &json!({"name": "Ada"}));
        assert_eq!(request["messages"][0]["content"], "Be kind.");
        assert_eq!(request["messages"][1]["content"], "Hello Ada");
        assert_eq!(request["project"], "p");
    }

    #[tokio::test]
    async fn test_stdout_becomes_output() {
        let executor = CommandExecutor::new(&argv(&["sh", "-c", "cat >/dev/null; echo '{\"text\": \" hi \"}'"])).unwrap();
        let prompt = PromptVersion::new("greet", "m").with_user("x");
        let invocation = executor
            .invoke(&Project::new("p"), &prompt, &json!({}))
            .await
            .unwrap();
        assert_eq!(invocation.output, json!("hi"));
        assert!(invocation.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_large_request_does_not_block_on_pipes() {
        let executor = CommandExecutor::new(&argv(&["cat"])).unwrap();
        let system = "x".repeat(300_000);
        let prompt = PromptVersion::new("greet", "m").with_system(system.as_str());

        let invocation = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            executor.invoke(&Project::new("p"), &prompt, &json!({})),
        )
        .await
        .expect("executor command stalled")
        .unwrap();

        let content = invocation.output["messages"][0]["content"].as_str().unwrap();
        assert_eq!(content.len(), 300_000);
        assert_eq!(invocation.output["slug"], "greet");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_invocation_error() {
        let executor = CommandExecutor::new(&argv(&["sh", "-c", "cat >/dev/null; echo boom >&2; exit 3"])).unwrap();
        let prompt = PromptVersion::new("greet", "m");
        let result = executor.invoke(&Project::new("p"), &prompt, &json!({})).await;
        match result {
            Err(PromptError::Invocation { slug, message }) => {
                assert_eq!(slug, "greet");
                assert!(message.contains("boom"));
            }
            other => panic!("Expected invocation error, got {other:?}"),
        }
    }
}
