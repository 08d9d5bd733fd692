//! Entry orchestration
//!
//! Drives every section of one entry in declared order, checkpointing after
//! each transition, then assembles the document and validates it as a whole.
//! Completed sections are reused verbatim on resume and never regenerated.

use crate::backend::{Backend, BackendCaller};
use crate::cache::{ArtifactCache, CachedArtifact};
use crate::checkpoint::{CheckpointStore, EntryCheckpoint, EntryPhase, SectionStatus};
use crate::config::QuireConfig;
use crate::error::{BackendError, PipelineError};
use crate::generation::job::{EntrySpec, JobSpec};
use crate::generation::output::OutputStore;
use crate::generation::prompt::{PromptBuilder, SectionPromptContext, TemplatePrompts};
use crate::generation::section::{rejection_reason, SectionRunner};
use crate::generation::GenerationSettings;
use crate::request::GenerationRequest;
use crate::validation::{SectionContext, ValidationEngine, ValidationReport};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Section id under which blueprint requests are fingerprinted.
pub const BLUEPRINT_SECTION_ID: &str = "_blueprint";

/// A validated, written entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedEntry {
    pub entry_id: String,
    pub title: String,
    pub document: String,
    pub report: ValidationReport,
    pub output_path: PathBuf,
    /// Generation calls charged across all sections.
    pub attempts: u32,
}

/// Everything an orchestrator needs, assembled by the caller.
pub struct OrchestratorParts {
    pub job: Arc<JobSpec>,
    pub cache: Arc<ArtifactCache>,
    pub caller: BackendCaller,
    pub section_engine: Arc<ValidationEngine>,
    pub entry_engine: Arc<ValidationEngine>,
    pub prompts: Arc<dyn PromptBuilder>,
    pub checkpoints: CheckpointStore,
    pub outputs: OutputStore,
    pub settings: GenerationSettings,
}

pub struct EntryOrchestrator {
    job: Arc<JobSpec>,
    cache: Arc<ArtifactCache>,
    caller: BackendCaller,
    section_engine: Arc<ValidationEngine>,
    entry_engine: Arc<ValidationEngine>,
    prompts: Arc<dyn PromptBuilder>,
    checkpoints: CheckpointStore,
    outputs: OutputStore,
    settings: GenerationSettings,
}

impl EntryOrchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            job: parts.job,
            cache: parts.cache,
            caller: parts.caller,
            section_engine: parts.section_engine,
            entry_engine: parts.entry_engine,
            prompts: parts.prompts,
            checkpoints: parts.checkpoints,
            outputs: parts.outputs,
            settings: parts.settings,
        }
    }

    /// Wire an orchestrator from configuration, with state under `workspace_root`.
    pub fn from_config(
        config: &QuireConfig,
        workspace_root: &Path,
        job: JobSpec,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, PipelineError> {
        job.validate()?;
        let paths = config.storage.resolve(workspace_root);
        let (section_engine, entry_engine) = config.rubrics.engines()?;
        let caller = BackendCaller::new(
            backend,
            config.generation.call_timeout(),
            config.generation.retry.clone(),
        );
        Ok(Self::new(OrchestratorParts {
            job: Arc::new(job),
            cache: Arc::new(ArtifactCache::open(&paths.cache, &config.cache)?),
            caller,
            section_engine: Arc::new(section_engine),
            entry_engine: Arc::new(entry_engine),
            prompts: Arc::new(TemplatePrompts::new(
                config.generation.correction_template.clone(),
            )),
            checkpoints: CheckpointStore::new(&paths.checkpoints)?,
            outputs: OutputStore::new(&paths.output)?,
            settings: config.generation.clone(),
        }))
    }

    pub fn job(&self) -> &JobSpec {
        &self.job
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    /// Generate, validate and write one entry, resuming from its checkpoint.
    #[instrument(skip(self, entry), fields(entry_id = %entry.id))]
    pub async fn run(&self, entry: &EntrySpec) -> Result<FinishedEntry, PipelineError> {
        let mut checkpoint = self.load_or_start(entry);
        self.save(&mut checkpoint)?;

        if checkpoint.phase == EntryPhase::Failed {
            return Err(self.failure_of(&checkpoint));
        }
        if checkpoint.phase == EntryPhase::Blueprint {
            self.run_blueprint(entry, &mut checkpoint).await?;
        }
        if checkpoint.phase == EntryPhase::Sections {
            self.run_sections(entry, &mut checkpoint).await?;
        }
        self.assemble(entry, &mut checkpoint)
    }

    fn load_or_start(&self, entry: &EntrySpec) -> EntryCheckpoint {
        let needs_blueprint = self.job.blueprint_prompt.is_some();
        match self.checkpoints.load(&entry.id) {
            Some(checkpoint) if checkpoint.matches_plan(self.job.section_ids()) => {
                info!(
                    phase = ?checkpoint.phase,
                    done = checkpoint.done_count(),
                    total = checkpoint.sections.len(),
                    "Resuming entry from checkpoint"
                );
                checkpoint
            }
            Some(stale) => {
                warn!(
                    found = ?stale.section_ids().collect::<Vec<_>>(),
                    "Checkpoint does not match the section plan, starting fresh"
                );
                EntryCheckpoint::new(&entry.id, self.job.section_ids(), needs_blueprint)
            }
            None => EntryCheckpoint::new(&entry.id, self.job.section_ids(), needs_blueprint),
        }
    }

    fn save(&self, checkpoint: &mut EntryCheckpoint) -> Result<(), PipelineError> {
        checkpoint.saved_at = Utc::now();
        self.checkpoints.save(checkpoint)?;
        Ok(())
    }

    fn base_request(&self, entry: &EntrySpec, section_id: &str, prompt: String) -> GenerationRequest {
        GenerationRequest {
            entry_id: entry.id.clone(),
            section_id: section_id.to_string(),
            model: self.caller.model_id().to_string(),
            prompt,
            sampling: self.settings.sampling.clone(),
            min_words: 0,
            max_words: None,
        }
    }

    async fn run_blueprint(
        &self,
        entry: &EntrySpec,
        checkpoint: &mut EntryCheckpoint,
    ) -> Result<(), PipelineError> {
        let template = match (&self.job.blueprint_prompt, &checkpoint.blueprint) {
            (Some(template), None) => Some(template.as_str()),
            _ => None,
        };
        if let Some(template) = template {
            let request = self.base_request(
                entry,
                BLUEPRINT_SECTION_ID,
                self.prompts.blueprint_prompt(template, entry),
            );
            let fingerprint = request.fingerprint();
            let max_attempts = self.settings.max_attempts.max(1);
            let mut last_error = String::new();

            for attempt in 1..=max_attempts {
                let result = self
                    .cache
                    .get_or_compute(fingerprint, || async {
                        let text = self.caller.call(&request).await?;
                        Ok::<_, BackendError>(CachedArtifact::new(fingerprint, text, None))
                    })
                    .await;
                match result {
                    Ok(resolved) => {
                        debug!(origin = ?resolved.origin, attempt, "Blueprint obtained");
                        checkpoint.blueprint = Some(resolved.artifact.text.clone());
                        break;
                    }
                    Err(err) => {
                        warn!(attempt, max_attempts, error = %err, "Blueprint generation failed");
                        last_error = err.to_string();
                    }
                }
            }

            if checkpoint.blueprint.is_none() {
                return Err(PipelineError::BlueprintFailed {
                    attempts: max_attempts,
                    reason: last_error,
                });
            }
        }

        checkpoint.phase = EntryPhase::Sections;
        self.save(checkpoint)
    }

    async fn run_sections(
        &self,
        entry: &EntrySpec,
        checkpoint: &mut EntryCheckpoint,
    ) -> Result<(), PipelineError> {
        let runner = SectionRunner::new(
            &self.cache,
            &self.caller,
            &self.section_engine,
            self.prompts.as_ref(),
            self.settings.max_attempts,
        );
        let mut previous: Option<String> = None;

        for (index, section) in self.job.sections.iter().enumerate() {
            let mut record = checkpoint.sections[index].clone();
            match record.status {
                SectionStatus::Done => {
                    debug!(section_id = %section.id, "Reusing completed section");
                    previous = record.content.clone();
                    continue;
                }
                SectionStatus::Failed => {
                    checkpoint.phase = EntryPhase::Failed;
                    self.save(checkpoint)?;
                    return Err(self.failure_of(checkpoint));
                }
                _ => {}
            }

            let prompt = self.prompts.section_prompt(&SectionPromptContext {
                entry,
                section,
                blueprint: checkpoint.blueprint.as_deref(),
                previous: previous.as_deref(),
            });
            let request = GenerationRequest {
                min_words: section.min_words.unwrap_or(0),
                max_words: section.max_words,
                ..self.base_request(entry, &section.id, prompt)
            };

            runner
                .run(&mut record, &request, |updated, outcome| {
                    debug!(
                        section_id = %updated.section_id,
                        status = updated.status.as_str(),
                        outcome = ?outcome,
                        "Section step"
                    );
                    checkpoint.sections[index] = updated.clone();
                    self.save(&mut *checkpoint)
                })
                .await?;

            if record.status == SectionStatus::Failed {
                checkpoint.phase = EntryPhase::Failed;
                self.save(checkpoint)?;
                return Err(self.failure_of(checkpoint));
            }
            previous = record.content.clone();
        }

        checkpoint.phase = EntryPhase::Assembly;
        self.save(checkpoint)
    }

    fn assemble(
        &self,
        entry: &EntrySpec,
        checkpoint: &mut EntryCheckpoint,
    ) -> Result<FinishedEntry, PipelineError> {
        let max = self.settings.max_assembly_attempts.max(1);
        if checkpoint.assembly_attempts >= max {
            checkpoint.phase = EntryPhase::Failed;
            self.save(checkpoint)?;
            return Err(PipelineError::AssemblyExhausted(checkpoint.assembly_attempts));
        }

        let title = self.job.entry_title(entry);
        let document = assemble_document(
            &title,
            self.job
                .sections
                .iter()
                .zip(&checkpoint.sections)
                .map(|(spec, record)| (spec.title.as_str(), record.content.as_deref().unwrap_or(""))),
        );
        let report = self
            .entry_engine
            .validate(&document, &SectionContext::new("entry", None, None));
        checkpoint.assembly_attempts += 1;
        checkpoint.last_entry_report = Some(report.clone());

        if !report.passed {
            let reason = rejection_reason(&report);
            if checkpoint.assembly_attempts >= max {
                warn!(attempts = checkpoint.assembly_attempts, %reason, "Entry rejected, attempts exhausted");
                checkpoint.phase = EntryPhase::Failed;
                self.save(checkpoint)?;
                return Err(PipelineError::AssemblyExhausted(checkpoint.assembly_attempts));
            }
            warn!(attempt = checkpoint.assembly_attempts, max, %reason, "Entry rejected");
            self.save(checkpoint)?;
            return Err(PipelineError::AssemblyFailed {
                attempt: checkpoint.assembly_attempts,
                max,
                reason,
            });
        }

        let output_path = self.outputs.write(&entry.id, &document, &report)?;
        self.checkpoints.delete(&entry.id)?;
        let attempts = checkpoint.sections.iter().map(|s| s.attempts).sum();
        info!(
            score = report.overall_score,
            tier = %report.tier,
            attempts,
            path = %output_path.display(),
            "Entry finished"
        );
        Ok(FinishedEntry {
            entry_id: entry.id.clone(),
            title,
            document,
            report,
            output_path,
            attempts,
        })
    }

    /// The error describing why a checkpoint ended up Failed.
    fn failure_of(&self, checkpoint: &EntryCheckpoint) -> PipelineError {
        if let Some(record) = checkpoint
            .sections
            .iter()
            .find(|s| s.status == SectionStatus::Failed)
        {
            let reason = record
                .last_error
                .clone()
                .or_else(|| record.last_report.as_ref().map(rejection_reason))
                .unwrap_or_else(|| "unknown".to_string());
            return PipelineError::SectionFailed {
                section_id: record.section_id.clone(),
                attempts: record.attempts,
                reason,
            };
        }
        PipelineError::AssemblyExhausted(checkpoint.assembly_attempts)
    }
}

/// `# {title}`, then each section as `## {title}` and its content.
pub fn assemble_document<'a, I>(title: &str, sections: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut document = format!("# {}\n", title);
    for (section_title, content) in sections {
        document.push_str(&format!("\n## {}\n\n{}\n", section_title, content.trim()));
    }
    document
}
