pub mod cache;
pub mod cli;
pub mod config;
pub mod diff;
pub mod entity;
pub mod error;
pub mod exec;
pub mod report;
pub mod storage;
pub mod template;
pub mod workflow;

pub use config::{Config, Project};
pub use error::{PromptError, Result};
pub use workflow::{AbRequest, Coordinator, WorkflowOutcome, WorkflowState};
