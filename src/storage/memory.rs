use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::Project;
use crate::entity::{PromptPatch, PromptSummary, PromptVersion};
use crate::error::{PromptError, Result};

use super::PromptStore;

/// Process-local store, keyed by project then slug.
#[derive(Default)]
pub struct MemoryStore {
    prompts: Mutex<BTreeMap<Project, BTreeMap<String, PromptVersion>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Project, BTreeMap<String, PromptVersion>>>> {
        self.prompts
            .lock()
            .map_err(|_| PromptError::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl PromptStore for MemoryStore {
    async fn get(&self, project: &Project, slug: &str) -> Result<PromptVersion> {
        self.lock()?
            .get(project)
            .and_then(|prompts| prompts.get(slug))
            .cloned()
            .ok_or_else(|| PromptError::NotFound {
                slug: slug.to_string(),
            })
    }

    async fn create(&self, project: &Project, prompt: &PromptVersion) -> Result<PromptVersion> {
        let mut projects = self.lock()?;
        let prompts = projects.entry(project.clone()).or_default();
        if prompts.contains_key(&prompt.slug) {
            return Err(PromptError::SlugCollision {
                slug: prompt.slug.clone(),
            });
        }
        prompts.insert(prompt.slug.clone(), prompt.clone());
        Ok(prompt.clone())
    }

    async fn update(&self, project: &Project, slug: &str, patch: &PromptPatch) -> Result<PromptVersion> {
        let mut projects = self.lock()?;
        let prompt = projects
            .get_mut(project)
            .and_then(|prompts| prompts.get_mut(slug))
            .ok_or_else(|| PromptError::NotFound {
                slug: slug.to_string(),
            })?;
        prompt.apply(patch);
        Ok(prompt.clone())
    }

    async fn delete(&self, project: &Project, slug: &str) -> Result<()> {
        self.lock()?
            .get_mut(project)
            .and_then(|prompts| prompts.remove(slug))
            .map(|_| ())
            .ok_or_else(|| PromptError::NotFound {
                slug: slug.to_string(),
            })
    }

    async fn list(&self, project: &Project) -> Result<Vec<PromptSummary>> {
        Ok(self
            .lock()?
            .get(project)
            .map(|prompts| prompts.values().map(PromptVersion::summary).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_projects_are_isolated() {
        let store = MemoryStore::new();
        let alpha = Project::new("alpha");
        let beta = Project::new("beta");

        store
            .create(&alpha, &PromptVersion::new("greet", "m"))
            .await
            .unwrap();

        assert!(store.get(&alpha, "greet").await.is_ok());
        assert!(matches!(
            store.get(&beta, "greet").await,
            Err(PromptError::NotFound { .. })
        ));
        assert!(store.list(&beta).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_twice_collides() {
        let store = MemoryStore::new();
        let project = Project::new("p");
        let prompt = PromptVersion::new("greet", "m");

        store.create(&project, &prompt).await.unwrap();
        let result = store.create(&project, &prompt).await;
        assert!(matches!(result, Err(PromptError::SlugCollision { .. })));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let project = Project::new("p");
        store
            .create(&project, &PromptVersion::new("greet", "m"))
            .await
            .unwrap();

        let patch = PromptPatch {
            system_message: Some("Be brief.".to_string()),
            ..Default::default()
        };
        let updated = store.update(&project, "greet", &patch).await.unwrap();
        assert_eq!(updated.system_message, "Be brief.");

        store.delete(&project, "greet").await.unwrap();
        assert!(store.find(&project, "greet").await.unwrap().is_none());
        assert!(matches!(
            store.delete(&project, "greet").await,
            Err(PromptError::NotFound { .. })
        ));
    }
}
