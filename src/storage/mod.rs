//! Prompt-store collaborator.
//!
//! Every call names its [`Project`] explicitly; stores hold no notion of a
//! "current" project.

mod loro_store;
mod memory;

pub use loro_store::{LocalStore, LoroStore, STATE_DIR};
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::config::Project;
use crate::entity::{PromptPatch, PromptSummary, PromptVersion};
use crate::error::{PromptError, Result};

#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Fetch a prompt, or `NotFound`.
    async fn get(&self, project: &Project, slug: &str) -> Result<PromptVersion>;

    /// Create a prompt, or `SlugCollision` if the slug is taken.
    async fn create(&self, project: &Project, prompt: &PromptVersion) -> Result<PromptVersion>;

    /// Apply every field of `patch` or none of them, or `NotFound`.
    async fn update(&self, project: &Project, slug: &str, patch: &PromptPatch) -> Result<PromptVersion>;

    /// Remove a prompt, or `NotFound`.
    async fn delete(&self, project: &Project, slug: &str) -> Result<()>;

    async fn list(&self, project: &Project) -> Result<Vec<PromptSummary>>;

    /// Like [`PromptStore::get`] but absence is `None`.
    async fn find(&self, project: &Project, slug: &str) -> Result<Option<PromptVersion>> {
        match self.get(project, slug).await {
            Ok(prompt) => Ok(Some(prompt)),
            Err(PromptError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
