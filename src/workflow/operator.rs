use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{PromptError, Result};

/// The person (or policy) deciding whether a candidate gets promoted.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Present a report.
    fn show(&self, text: &str);

    /// Ask a yes/no question. May suspend indefinitely.
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Asks on the terminal. Refuses to guess when stdin is not a TTY.
#[derive(Debug, Default)]
pub struct InteractiveOperator {
    report_to_stderr: bool,
}

impl InteractiveOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show reports on stderr, keeping stdout for machine-readable output.
    pub fn report_to_stderr(mut self) -> Self {
        self.report_to_stderr = true;
        self
    }
}

#[async_trait]
impl Operator for InteractiveOperator {
    fn show(&self, text: &str) {
        if self.report_to_stderr {
            eprint!("{text}");
        } else {
            print!("{text}");
        }
    }

    async fn confirm(&self, question: &str) -> Result<bool> {
        eprintln!("{question} [y/N] ");

        if !atty::is(atty::Stream::Stdin) {
            return Err(PromptError::Validation(
                "Use --force to confirm in non-interactive mode".to_string(),
            ));
        }

        let mut input = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut input).await?;
        Ok(input.trim().eq_ignore_ascii_case("y"))
    }
}

/// Answers every question with a fixed decision.
#[derive(Debug)]
pub struct ForcedOperator {
    decision: bool,
    echo: bool,
}

impl ForcedOperator {
    pub fn new(decision: bool) -> Self {
        Self { decision, echo: true }
    }

    /// Don't print reports (used when output is JSON).
    pub fn silent(mut self) -> Self {
        self.echo = false;
        self
    }
}

#[async_trait]
impl Operator for ForcedOperator {
    fn show(&self, text: &str) {
        if self.echo {
            print!("{text}");
        }
    }

    async fn confirm(&self, _question: &str) -> Result<bool> {
        Ok(self.decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forced_operator_never_asks() {
        assert!(ForcedOperator::new(true).silent().confirm("promote?").await.unwrap());
        assert!(!ForcedOperator::new(false).silent().confirm("promote?").await.unwrap());
    }

    #[test]
    fn test_interactive_operator_reports_to_stdout_by_default() {
        assert!(!InteractiveOperator::new().report_to_stderr);
        assert!(InteractiveOperator::new().report_to_stderr().report_to_stderr);
    }
}
