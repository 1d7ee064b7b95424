use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Project;
use crate::entity::PromptVersion;
use crate::error::Result;
use crate::template::render;

use super::{Executor, Invocation};

/// Renders the prompt with the input instead of calling a model. Used when
/// no executor command is configured.
#[derive(Debug, Default, Clone)]
pub struct DryRunExecutor;

#[async_trait]
impl Executor for DryRunExecutor {
    async fn invoke(&self, _project: &Project, prompt: &PromptVersion, input: &Value) -> Result<Invocation> {
        let output = json!({
            "model": prompt.model,
            "system": render(&prompt.system_message, input),
            "user": render(&prompt.user_template, input),
        });
        Ok(Invocation::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_renders_both_messages() {
        let prompt = PromptVersion::new("greet", "model-a")
            .with_system("You greet {{name}}.")
            .with_user("Say hi to {{name}}");
        let invocation = DryRunExecutor
            .invoke(&Project::new("p"), &prompt, &json!({"name": "Ada"}))
            .await
            .unwrap();

        assert_eq!(invocation.output["system"], "You greet Ada.");
        assert_eq!(invocation.output["user"], "Say hi to Ada");
        assert_eq!(invocation.output["model"], "model-a");
    }
}
