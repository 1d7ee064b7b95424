use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use loro::{LoroDoc, LoroMap, LoroValue, ValueOrContainer};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Project;
use crate::entity::{validate_slug, CandidateOrigin, PromptPatch, PromptSummary, PromptVersion};
use crate::error::{PromptError, Result};

use super::PromptStore;

pub const STATE_DIR: &str = ".promptctl";
const LORO_DB: &str = "loro.db";
const PROJECTS: &str = "projects";

/// File-backed prompt store: one Loro document holding a map per project and
/// a map per prompt slug.
pub struct LoroStore {
    doc: LoroDoc,
    dir: PathBuf,
}

impl LoroStore {
    /// Initialize a new promptctl project
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(STATE_DIR);

        if dir.join(LORO_DB).exists() {
            return Err(PromptError::AlreadyInitialized);
        }

        fs::create_dir_all(&dir)?;

        let store = Self {
            doc: LoroDoc::new(),
            dir,
        };
        store.save()?;

        Ok(store)
    }

    /// Open an existing promptctl project
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(STATE_DIR);
        let path = dir.join(LORO_DB);

        if !path.exists() {
            return Err(PromptError::NotInitialized);
        }

        let bytes = fs::read(&path)?;
        let doc = LoroDoc::new();
        doc.import(&bytes)?;

        Ok(Self { doc, dir })
    }

    /// Save the document to disk
    pub fn save(&self) -> Result<()> {
        let bytes = self.doc.export(loro::ExportMode::Snapshot)?;
        fs::write(self.dir.join(LORO_DB), bytes)?;
        Ok(())
    }

    /// The `.promptctl` directory
    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    fn project_map(&self, project: &Project) -> Result<LoroMap> {
        let projects = self.doc.get_map(PROJECTS);
        Ok(projects.get_or_create_container(project.as_str(), LoroMap::new())?)
    }

    /// Snapshot of every prompt map in a project, without creating it
    fn project_value(&self, project: &Project) -> Option<loro::LoroMapValue> {
        let projects = self.doc.get_map(PROJECTS);
        match projects.get_deep_value() {
            LoroValue::Map(map) => match map.get(project.as_str()) {
                Some(LoroValue::Map(prompts)) => Some(prompts.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_prompt(&self, project: &Project, slug: &str) -> Result<Option<PromptVersion>> {
        let Some(prompts) = self.project_value(project) else {
            return Ok(None);
        };
        match prompts.get(slug) {
            Some(LoroValue::Map(entity_map)) => Ok(parse_prompt_from_map(entity_map)),
            _ => Ok(None),
        }
    }

    pub fn list_prompts(&self, project: &Project) -> Result<Vec<PromptVersion>> {
        let mut prompts = Vec::new();

        if let Some(map) = self.project_value(project) {
            for (_, entity_value) in map.iter() {
                if let LoroValue::Map(entity_map) = entity_value {
                    if let Some(prompt) = parse_prompt_from_map(entity_map) {
                        prompts.push(prompt);
                    }
                }
            }
        }

        prompts.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(prompts)
    }

    /// Add a prompt; the slug must be free
    pub fn add_prompt(&self, project: &Project, prompt: &PromptVersion) -> Result<()> {
        validate_slug(&prompt.slug)?;
        if self.get_prompt(project, &prompt.slug)?.is_some() {
            return Err(PromptError::SlugCollision {
                slug: prompt.slug.clone(),
            });
        }

        let prompts = self.project_map(project)?;
        let entity_map = prompts.get_or_create_container(&prompt.slug, LoroMap::new())?;

        entity_map.insert("id", prompt.id.to_string())?;
        entity_map.insert("slug", prompt.slug.clone())?;
        entity_map.insert("name", prompt.name.clone())?;
        entity_map.insert("description", prompt.description.clone())?;
        entity_map.insert("system_message", prompt.system_message.clone())?;
        entity_map.insert("user_template", prompt.user_template.clone())?;
        entity_map.insert("model", prompt.model.clone())?;
        entity_map.insert("created_at", prompt.created_at.to_rfc3339())?;
        entity_map.insert("updated_at", prompt.updated_at.to_rfc3339())?;

        if let Some(ref origin) = prompt.origin {
            entity_map.insert("candidate_of", origin.source_slug.clone())?;
            entity_map.insert("workflow_id", origin.workflow_id.to_string())?;
            entity_map.insert("staged_at", origin.staged_at.to_rfc3339())?;
        }

        self.doc.commit();
        Ok(())
    }

    /// Apply a patch to an existing prompt in one commit
    pub fn update_prompt(&self, project: &Project, slug: &str, patch: &PromptPatch) -> Result<PromptVersion> {
        let Some(mut prompt) = self.get_prompt(project, slug)? else {
            return Err(PromptError::NotFound {
                slug: slug.to_string(),
            });
        };
        prompt.apply(patch);

        let prompts = self.project_map(project)?;
        let entity_map = match prompts.get(slug) {
            Some(ValueOrContainer::Container(loro::Container::Map(map))) => map,
            _ => {
                return Err(PromptError::NotFound {
                    slug: slug.to_string(),
                })
            }
        };

        if let Some(ref name) = patch.name {
            entity_map.insert("name", name.clone())?;
        }
        if let Some(ref description) = patch.description {
            entity_map.insert("description", description.clone())?;
        }
        if let Some(ref system_message) = patch.system_message {
            entity_map.insert("system_message", system_message.clone())?;
        }
        if let Some(ref user_template) = patch.user_template {
            entity_map.insert("user_template", user_template.clone())?;
        }
        if let Some(ref model) = patch.model {
            entity_map.insert("model", model.clone())?;
        }
        entity_map.insert("updated_at", prompt.updated_at.to_rfc3339())?;

        self.doc.commit();
        Ok(prompt)
    }

    /// Delete a prompt by slug
    pub fn delete_prompt(&self, project: &Project, slug: &str) -> Result<()> {
        if self.get_prompt(project, slug)?.is_none() {
            return Err(PromptError::NotFound {
                slug: slug.to_string(),
            });
        }

        self.project_map(project)?.delete(slug)?;
        self.doc.commit();
        Ok(())
    }
}

fn string_field(map: &loro::LoroMapValue, key: &str) -> Option<String> {
    match map.get(key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn time_field(map: &loro::LoroMapValue, key: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = string_field(map, key)?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|t| t.with_timezone(&chrono::Utc))
}

fn parse_prompt_from_map(map: &loro::LoroMapValue) -> Option<PromptVersion> {
    let id = string_field(map, "id")?.parse().ok()?;
    let slug = string_field(map, "slug")?;
    let created_at = time_field(map, "created_at")?;
    let updated_at = time_field(map, "updated_at")?;

    let origin = match (
        string_field(map, "candidate_of"),
        string_field(map, "workflow_id").and_then(|id| id.parse().ok()),
        time_field(map, "staged_at"),
    ) {
        (Some(source_slug), Some(workflow_id), Some(staged_at)) => Some(CandidateOrigin {
            source_slug,
            workflow_id,
            staged_at,
        }),
        _ => None,
    };

    Some(PromptVersion {
        id,
        name: string_field(map, "name").unwrap_or_else(|| slug.clone()),
        slug,
        description: string_field(map, "description").unwrap_or_default(),
        system_message: string_field(map, "system_message").unwrap_or_default(),
        user_template: string_field(map, "user_template").unwrap_or_default(),
        model: string_field(map, "model").unwrap_or_default(),
        origin,
        created_at,
        updated_at,
    })
}

/// Async [`PromptStore`] over a [`LoroStore`]; every mutation is saved to
/// disk before returning.
#[derive(Clone)]
pub struct LocalStore {
    store: Arc<Mutex<LoroStore>>,
}

impl LocalStore {
    pub fn new(store: LoroStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self::new(LoroStore::open(root)?))
    }
}

#[async_trait]
impl PromptStore for LocalStore {
    async fn get(&self, project: &Project, slug: &str) -> Result<PromptVersion> {
        debug!(project = %project, slug, "store get");
        self.store
            .lock()
            .await
            .get_prompt(project, slug)?
            .ok_or_else(|| PromptError::NotFound {
                slug: slug.to_string(),
            })
    }

    async fn create(&self, project: &Project, prompt: &PromptVersion) -> Result<PromptVersion> {
        debug!(project = %project, slug = %prompt.slug, "store create");
        let store = self.store.lock().await;
        store.add_prompt(project, prompt)?;
        store.save()?;
        Ok(prompt.clone())
    }

    async fn update(&self, project: &Project, slug: &str, patch: &PromptPatch) -> Result<PromptVersion> {
        debug!(project = %project, slug, "store update");
        let store = self.store.lock().await;
        let updated = store.update_prompt(project, slug, patch)?;
        store.save()?;
        Ok(updated)
    }

    async fn delete(&self, project: &Project, slug: &str) -> Result<()> {
        debug!(project = %project, slug, "store delete");
        let store = self.store.lock().await;
        store.delete_prompt(project, slug)?;
        store.save()
    }

    async fn list(&self, project: &Project) -> Result<Vec<PromptSummary>> {
        let store = self.store.lock().await;
        Ok(store
            .list_prompts(project)?
            .iter()
            .map(PromptVersion::summary)
            .collect())
    }
}
