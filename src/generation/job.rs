//! Job files: the section plan plus the entries to generate.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One structurally required section of every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub id: String,
    pub title: String,
    /// Prompt template; see [`crate::generation::prompt::TemplatePrompts`].
    pub prompt: String,
    #[serde(default)]
    pub min_words: Option<u32>,
    #[serde(default)]
    pub max_words: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySpec {
    pub id: String,
    pub topic: String,
}

impl EntrySpec {
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Entry heading template; `{topic}` and `{entry}` are filled in.
    #[serde(default)]
    pub title_template: Option<String>,
    /// When set, an outline is generated first and offered to every section prompt.
    #[serde(default)]
    pub blueprint_prompt: Option<String>,
    pub sections: Vec<SectionSpec>,
    #[serde(default)]
    pub entries: Vec<EntrySpec>,
}

impl JobSpec {
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        let job: JobSpec = toml::from_str(raw)
            .map_err(|e| PipelineError::InvalidJob(format!("Failed to parse job: {}", e)))?;
        job.validate()?;
        Ok(job)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidJob(format!("Failed to read job file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sections.is_empty() {
            return Err(PipelineError::InvalidJob(
                "Job must declare at least one section".to_string(),
            ));
        }

        let mut section_ids = HashSet::new();
        for section in &self.sections {
            if section.id.trim().is_empty() {
                return Err(PipelineError::InvalidJob(
                    "Section id cannot be empty".to_string(),
                ));
            }
            if !section_ids.insert(section.id.as_str()) {
                return Err(PipelineError::InvalidJob(format!(
                    "Duplicate section id '{}'",
                    section.id
                )));
            }
            if let (Some(min), Some(max)) = (section.min_words, section.max_words) {
                if min > max {
                    return Err(PipelineError::InvalidJob(format!(
                        "Section '{}': min_words {} exceeds max_words {}",
                        section.id, min, max
                    )));
                }
            }
        }

        let mut entry_ids = HashSet::new();
        for entry in &self.entries {
            if entry.id.trim().is_empty() {
                return Err(PipelineError::InvalidJob("Entry id cannot be empty".to_string()));
            }
            if !entry_ids.insert(entry.id.as_str()) {
                return Err(PipelineError::InvalidJob(format!(
                    "Duplicate entry id '{}'",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    pub fn section_ids(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.id.as_str())
    }

    pub fn entry(&self, entry_id: &str) -> Option<&EntrySpec> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub fn entry_title(&self, entry: &EntrySpec) -> String {
        match &self.title_template {
            Some(template) => crate::generation::prompt::fill_template(
                template,
                &[("topic", entry.topic.as_str()), ("entry", entry.id.as_str())],
            ),
            None => entry.topic.clone(),
        }
    }
}
