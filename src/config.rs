//! Configuration for promptctl.
//!
//! Values are layered: built-in defaults, then `.promptctl/config.yaml`,
//! then `PROMPTCTL_*` environment variables, then command-line flags (applied
//! by the caller through [`Config::with_project`] and friends).

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PromptError, Result};

pub const CONFIG_FILE: &str = "config.yaml";

pub const DEFAULT_PROJECT: &str = "default";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 60_000;

/// Project every store call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Project(String);

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How prompts are executed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Command (argv) that runs one prompt. It receives a JSON request on
    /// stdin and writes the model output to stdout. When absent, prompts are
    /// rendered locally without calling a model.
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub project: Project,
    /// Model used by `create` when none is given
    pub default_model: String,
    /// Per-invocation timeout for A/B runs
    pub invoke_timeout_ms: u64,
    pub executor: ExecutorConfig,
    /// Record invocations in the trace log
    pub traces: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: Project::new(DEFAULT_PROJECT),
            default_model: DEFAULT_MODEL.to_string(),
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT_MS,
            executor: ExecutorConfig::default(),
            traces: true,
        }
    }
}

impl Config {
    /// Load the config file from `dir` (if any) and apply environment
    /// overrides.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let text = fs::read_to_string(&path)?;
            Self::from_yaml(&text)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = lookup("PROMPTCTL_PROJECT").filter(|p| !p.is_empty()) {
            self.project = Project::new(project);
        }
        if let Some(model) = lookup("PROMPTCTL_MODEL").filter(|m| !m.is_empty()) {
            self.default_model = model;
        }
        if let Some(timeout) = lookup("PROMPTCTL_TIMEOUT_MS") {
            self.invoke_timeout_ms = timeout.parse().map_err(|_| {
                PromptError::Config(format!("PROMPTCTL_TIMEOUT_MS must be an integer, got '{timeout}'"))
            })?;
        }
        Ok(())
    }

    pub fn with_project(mut self, project: Option<String>) -> Self {
        if let Some(project) = project {
            self.project = Project::new(project);
        }
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        if let Some(timeout_ms) = timeout_ms {
            self.invoke_timeout_ms = timeout_ms;
        }
        self
    }

    pub fn invoke_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.invoke_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.as_str(), "default");
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.invoke_timeout_ms, 60_000);
        assert!(config.executor.command.is_none());
        assert!(config.traces);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("project: support-bot\nexecutor:\n  command: [llm, run]\n").unwrap();
        assert_eq!(config.project, Project::new("support-bot"));
        assert_eq!(
            config.executor.command,
            Some(vec!["llm".to_string(), "run".to_string()])
        );
        assert_eq!(config.invoke_timeout_ms, DEFAULT_INVOKE_TIMEOUT_MS);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("PROMPTCTL_PROJECT", "evals"), ("PROMPTCTL_TIMEOUT_MS", "250")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.project.as_str(), "evals");
        assert_eq!(config.invoke_timeout_ms, 250);
    }

    #[test]
    fn test_bad_timeout_env_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "PROMPTCTL_TIMEOUT_MS").then(|| "soon".to_string()));
        assert!(matches!(result, Err(PromptError::Config(_))));
    }

    #[test]
    fn test_flags_override_last() {
        let config = Config::default()
            .with_project(Some("cli".to_string()))
            .with_timeout_ms(Some(10));
        assert_eq!(config.project.as_str(), "cli");
        assert_eq!(config.invoke_timeout(), std::time::Duration::from_millis(10));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default().with_project(Some("x".to_string()));
        let parsed = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
