use thiserror::Error;

/// Workflow step an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stage,
    Execute,
    Decide,
    Promote,
    Cleanup,
    Sweep,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::Stage => "stage",
            Step::Execute => "execute",
            Step::Decide => "decide",
            Step::Promote => "promote",
            Step::Cleanup => "cleanup",
            Step::Sweep => "sweep",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Not in a promptctl project. Run 'promptctl init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .promptctl/ to reinitialize.")]
    AlreadyInitialized,

    #[error("Prompt not found: {slug}")]
    NotFound { slug: String },

    #[error("Slug '{slug}' is already taken by an unrelated prompt")]
    SlugCollision { slug: String },

    #[error("Invalid slug '{slug}': use lowercase letters, digits, '-' or '_'")]
    InvalidSlug { slug: String },

    #[error("Invocation of '{slug}' failed: {message}")]
    Invocation { slug: String, message: String },

    #[error("Both invocations failed ('{original}' and '{candidate}')")]
    ExecutionFailure { original: String, candidate: String },

    #[error("Promotion onto '{slug}' failed, candidate kept for retry: {source}")]
    PromotionFailure {
        slug: String,
        #[source]
        source: Box<PromptError>,
    },

    #[error("Invalid workflow transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Trace log error: {0}")]
    TraceLog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Loro error: {0}")]
    Loro(#[from] loro::LoroError),

    #[error("Loro encode error: {0}")]
    LoroEncode(#[from] loro::LoroEncodeError),

    #[error("{step} failed: {source}")]
    AtStep {
        step: Step,
        #[source]
        source: Box<PromptError>,
    },
}

impl PromptError {
    /// Attach the workflow step to this error. Already-tagged errors keep
    /// their original step.
    pub fn at(self, step: Step) -> Self {
        match self {
            PromptError::AtStep { .. } => self,
            other => PromptError::AtStep {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The underlying cause with any step annotation removed.
    pub fn root(&self) -> &PromptError {
        match self {
            PromptError::AtStep { source, .. } => source.root(),
            other => other,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            PromptError::NotFound { .. } => 2,
            PromptError::SlugCollision { .. } => 3,
            PromptError::ExecutionFailure { .. } => 4,
            PromptError::PromotionFailure { .. } => 5,
            _ => 1,
        }
    }
}

impl From<rusqlite::Error> for PromptError {
    fn from(e: rusqlite::Error) -> Self {
        PromptError::TraceLog(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PromptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_keeps_first_step() {
        let err = PromptError::NotFound {
            slug: "greeting".to_string(),
        }
        .at(Step::Stage)
        .at(Step::Promote);

        match &err {
            PromptError::AtStep { step, .. } => assert_eq!(*step, Step::Stage),
            other => panic!("Expected AtStep, got {other:?}"),
        }
        assert!(err.to_string().contains("stage failed"));
        assert!(err.to_string().contains("greeting"));
    }

    #[test]
    fn test_exit_codes_use_root_cause() {
        let collision = PromptError::SlugCollision {
            slug: "a-v2".to_string(),
        }
        .at(Step::Stage);
        assert_eq!(collision.exit_code(), 3);

        let failure = PromptError::PromotionFailure {
            slug: "a".to_string(),
            source: Box::new(PromptError::Storage("disk full".to_string())),
        };
        assert_eq!(failure.exit_code(), 5);
        assert_eq!(PromptError::Validation("x".to_string()).exit_code(), 1);
    }
}
