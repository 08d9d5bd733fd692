//! Shared test utilities for integration tests
//!
//! Builds orchestrators over isolated temp directories with a chosen backend
//! and rubrics, so each test wires only what it cares about.

use quire::backend::{Backend, BackendCaller, RetryPolicy};
use quire::cache::{ArtifactCache, CacheConfig};
use quire::checkpoint::CheckpointStore;
use quire::generation::entry::OrchestratorParts;
use quire::generation::{
    EntryOrchestrator, EntrySpec, GenerationSettings, JobSpec, OutputStore, SectionSpec,
    TemplatePrompts,
};
use quire::validation::{Criterion, Measure, Rubric, TierBand, ValidationEngine};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn bands() -> Vec<TierBand> {
    vec![
        TierBand::new("A", 95.0, 100.0),
        TierBand::new("B", 80.0, 94.0),
        TierBand::new("C", 0.0, 79.0),
    ]
}

/// Single length criterion: passes once the text reaches `min_words`.
pub fn length_rubric(min_words: u32) -> Rubric {
    Rubric {
        pass_threshold: 80.0,
        criteria: vec![Criterion {
            name: "length".to_string(),
            weight: 1.0,
            floor: 0.0,
            warn_margin: 0.0,
            measure: Measure::Length,
        }],
        tiers: bands(),
        min_words: Some(min_words),
        max_words: None,
    }
}

pub fn words(word: &str, n: usize) -> String {
    vec![word; n].join(" ")
}

pub fn section(id: &str, title: &str, prompt: &str) -> SectionSpec {
    SectionSpec {
        id: id.to_string(),
        title: title.to_string(),
        prompt: prompt.to_string(),
        min_words: None,
        max_words: None,
    }
}

/// Three sections, each prompt naming its section and chaining the previous one.
pub fn three_section_job() -> JobSpec {
    JobSpec {
        title_template: Some("{topic}".to_string()),
        blueprint_prompt: None,
        sections: vec![
            section("origins", "Origins", "origins of {topic}"),
            section("growth", "Growth", "growth of {topic} following: {previous}"),
            section("legacy", "Legacy", "legacy of {topic} following: {previous}"),
        ],
        entries: vec![EntrySpec::new("basil", "Basil")],
    }
}

pub struct Wiring {
    pub job: JobSpec,
    pub section_rubric: Rubric,
    pub entry_rubric: Rubric,
    pub settings: GenerationSettings,
}

impl Wiring {
    pub fn new(job: JobSpec) -> Self {
        Self {
            job,
            section_rubric: length_rubric(10),
            entry_rubric: length_rubric(10),
            settings: GenerationSettings {
                retry: RetryPolicy::none(),
                ..GenerationSettings::default()
            },
        }
    }

    pub fn build(&self, root: &Path, backend: Arc<dyn Backend>) -> EntryOrchestrator {
        EntryOrchestrator::new(OrchestratorParts {
            job: Arc::new(self.job.clone()),
            cache: Arc::new(
                ArtifactCache::open(root.join("cache"), &CacheConfig::default()).unwrap(),
            ),
            caller: BackendCaller::new(
                backend,
                Duration::from_secs(60),
                self.settings.retry.clone(),
            ),
            section_engine: Arc::new(ValidationEngine::new(self.section_rubric.clone()).unwrap()),
            entry_engine: Arc::new(ValidationEngine::new(self.entry_rubric.clone()).unwrap()),
            prompts: Arc::new(TemplatePrompts::default()),
            checkpoints: CheckpointStore::new(root.join("checkpoints")).unwrap(),
            outputs: OutputStore::new(root.join("output")).unwrap(),
            settings: self.settings.clone(),
        })
    }
}
