// src/entity/prompt.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PromptError, Result};
use crate::template::{extract_variables, VariableSchema};

/// Suffix appended to an original slug to name its staged candidate
pub const CANDIDATE_SUFFIX: &str = "-v2";

/// Marks a prompt as a staged candidate of another prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOrigin {
    pub source_slug: String,
    pub workflow_id: Uuid,
    pub staged_at: DateTime<Utc>,
}

/// A snapshot of one prompt as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub system_message: String,
    /// User message template (may include {{variable}} placeholders)
    pub user_template: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<CandidateOrigin>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptVersion {
    pub fn new(slug: impl Into<String>, model: impl Into<String>) -> Self {
        let slug = slug.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: slug.clone(),
            slug,
            description: String::new(),
            system_message: String::new(),
            user_template: String::new(),
            model: model.into(),
            origin: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_system(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn with_user(mut self, user_template: impl Into<String>) -> Self {
        self.user_template = user_template.into();
        self
    }

    /// Variables of the system message followed by those of the user
    /// template.
    pub fn variables(&self) -> VariableSchema {
        let mut schema = extract_variables(&self.system_message);
        schema.merge(&extract_variables(&self.user_template));
        schema
    }

    /// Slug under which this prompt's candidate is staged.
    pub fn candidate_slug(&self) -> String {
        format!("{}{}", self.slug, CANDIDATE_SUFFIX)
    }

    /// Whether this prompt is a staged candidate of `source_slug`.
    pub fn is_candidate_of(&self, source_slug: &str) -> bool {
        self.origin
            .as_ref()
            .is_some_and(|origin| origin.source_slug == source_slug)
    }

    pub fn summary(&self) -> PromptSummary {
        PromptSummary {
            slug: self.slug.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            model: self.model.clone(),
            candidate_of: self.origin.as_ref().map(|o| o.source_slug.clone()),
        }
    }

    /// Apply `patch` in place, bumping `updated_at`.
    pub fn apply(&mut self, patch: &PromptPatch) {
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
        if let Some(ref system_message) = patch.system_message {
            self.system_message = system_message.clone();
        }
        if let Some(ref user_template) = patch.user_template {
            self.user_template = user_template.clone();
        }
        if let Some(ref model) = patch.model {
            self.model = model.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Listing entry returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSummary {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_of: Option<String>,
}

/// Proposed replacements for the revisable fields of a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOverrides {
    pub system_message: Option<String>,
    pub user_template: Option<String>,
    pub model: Option<String>,
}

impl FieldOverrides {
    pub fn is_empty(&self) -> bool {
        self.system_message.is_none() && self.user_template.is_none() && self.model.is_none()
    }

    /// Merge onto `original`; fields not overridden are copied verbatim.
    pub fn merge_onto(&self, original: &PromptVersion) -> PromptPatch {
        PromptPatch {
            name: None,
            description: None,
            system_message: Some(
                self.system_message
                    .clone()
                    .unwrap_or_else(|| original.system_message.clone()),
            ),
            user_template: Some(
                self.user_template
                    .clone()
                    .unwrap_or_else(|| original.user_template.clone()),
            ),
            model: Some(self.model.clone().unwrap_or_else(|| original.model.clone())),
        }
    }
}

/// Update payload for a prompt. The store applies all present fields or
/// none of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_message: Option<String>,
    pub user_template: Option<String>,
    pub model: Option<String>,
}

impl PromptPatch {
    /// The fields a promotion copies from a candidate.
    pub fn promotion_of(candidate: &PromptVersion) -> Self {
        Self {
            name: None,
            description: None,
            system_message: Some(candidate.system_message.clone()),
            user_template: Some(candidate.user_template.clone()),
            model: Some(candidate.model.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.system_message.is_none()
            && self.user_template.is_none()
            && self.model.is_none()
    }
}

/// Slugs are URL-safe: lowercase ASCII letters, digits, `-` and `_`,
/// starting with a letter or digit.
pub fn validate_slug(slug: &str) -> Result<()> {
    let valid = slug
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PromptError::InvalidSlug {
            slug: slug.to_string(),
        })
    }
}
