//! Section state machine
//!
//! Drives one [`SectionRecord`] through generate, validate and correct. Each
//! call to [`SectionRunner::step`] performs exactly one transition so the
//! caller can checkpoint in between; a run killed between steps resumes from
//! the stored status with nothing but the interrupted step repeated.

use crate::backend::BackendCaller;
use crate::cache::{ArtifactCache, CachedArtifact, Origin};
use crate::checkpoint::{SectionRecord, SectionStatus};
use crate::error::{BackendError, PipelineError};
use crate::fingerprint::Fingerprint;
use crate::generation::prompt::PromptBuilder;
use crate::request::GenerationRequest;
use crate::validation::{SectionContext, ValidationEngine, ValidationReport, Verdict};
use tracing::{debug, info, warn};

/// What a single step did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Pending → Generating.
    Started,
    /// Text obtained (from cache or backend); now Validating.
    Generated {
        fingerprint: Fingerprint,
        origin: Origin,
        durable: bool,
    },
    /// Backend failure with budget left; the same phase runs again.
    BackendFailed { error: String },
    /// Validation passed; now Done.
    Accepted { overall_score: f64, tier: String },
    /// Validation rejected with budget left; now Correcting.
    Rejected { overall_score: f64, tier: String },
    /// Budget spent; now Failed.
    Failed { reason: String },
}

impl StepOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepOutcome::Accepted { .. } | StepOutcome::Failed { .. })
    }
}

/// Runs the generate → validate → correct loop for sections.
pub struct SectionRunner<'a> {
    cache: &'a ArtifactCache,
    caller: &'a BackendCaller,
    engine: &'a ValidationEngine,
    prompts: &'a dyn PromptBuilder,
    max_attempts: u32,
}

impl<'a> SectionRunner<'a> {
    pub fn new(
        cache: &'a ArtifactCache,
        caller: &'a BackendCaller,
        engine: &'a ValidationEngine,
        prompts: &'a dyn PromptBuilder,
        max_attempts: u32,
    ) -> Self {
        Self {
            cache,
            caller,
            engine,
            prompts,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Perform one transition of `record`.
    ///
    /// `request` is the section's base request; correction requests are
    /// derived from it. Stepping a terminal record is an invalid transition.
    pub async fn step(
        &self,
        record: &mut SectionRecord,
        request: &GenerationRequest,
    ) -> Result<StepOutcome, PipelineError> {
        match record.status {
            SectionStatus::Pending => {
                record.advance(SectionStatus::Generating)?;
                Ok(StepOutcome::Started)
            }
            SectionStatus::Generating => self.generate(record, request.clone()).await,
            SectionStatus::Correcting => {
                let correction = self.correction_request(record, request);
                self.generate(record, correction).await
            }
            SectionStatus::Validating => self.validate(record, request),
            status @ (SectionStatus::Done | SectionStatus::Failed) => {
                Err(PipelineError::InvalidTransition {
                    section_id: record.section_id.clone(),
                    from: status,
                    to: status,
                })
            }
        }
    }

    /// Step until the record is Done or Failed, calling `after_step` after every transition.
    pub async fn run<F>(
        &self,
        record: &mut SectionRecord,
        request: &GenerationRequest,
        mut after_step: F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(&SectionRecord, &StepOutcome) -> Result<(), PipelineError>,
    {
        while !record.status.is_terminal() {
            let outcome = self.step(record, request).await?;
            after_step(record, &outcome)?;
        }
        Ok(())
    }

    fn context(request: &GenerationRequest) -> SectionContext {
        let min_words = (request.min_words > 0).then_some(request.min_words);
        SectionContext::new(request.section_id.clone(), min_words, request.max_words)
    }

    fn correction_request(
        &self,
        record: &SectionRecord,
        request: &GenerationRequest,
    ) -> GenerationRequest {
        let previous = record.content.as_deref().unwrap_or("");
        let report = match &record.last_report {
            Some(report) => report.clone(),
            None => self.engine.validate(previous, &Self::context(request)),
        };
        request.with_prompt(
            self.prompts
                .correction_prompt(&request.prompt, previous, &report),
        )
    }

    async fn generate(
        &self,
        record: &mut SectionRecord,
        request: GenerationRequest,
    ) -> Result<StepOutcome, PipelineError> {
        let fingerprint = request.fingerprint();
        let context = Self::context(&request);
        let result = self
            .cache
            .get_or_compute(fingerprint, || async {
                let text = self.caller.call(&request).await?;
                let summary = self.engine.validate(&text, &context).summary();
                Ok::<_, BackendError>(CachedArtifact::new(fingerprint, text, Some(summary)))
            })
            .await;
        record.attempts += 1;

        match result {
            Ok(resolved) => {
                debug!(
                    entry_id = %request.entry_id,
                    section_id = %record.section_id,
                    fingerprint = %fingerprint.short(),
                    origin = ?resolved.origin,
                    attempts = record.attempts,
                    "Section text obtained"
                );
                record.content = Some(resolved.artifact.text.clone());
                record.last_fingerprint = Some(fingerprint);
                record.last_error = None;
                record.advance(SectionStatus::Validating)?;
                Ok(StepOutcome::Generated {
                    fingerprint,
                    origin: resolved.origin,
                    durable: resolved.durable,
                })
            }
            Err(err) => {
                let message = err.to_string();
                record.last_error = Some(message.clone());
                if record.attempts >= self.max_attempts {
                    warn!(
                        entry_id = %request.entry_id,
                        section_id = %record.section_id,
                        attempts = record.attempts,
                        error = %message,
                        "Generation failed, attempts exhausted"
                    );
                    record.advance(SectionStatus::Failed)?;
                    Ok(StepOutcome::Failed { reason: message })
                } else {
                    warn!(
                        entry_id = %request.entry_id,
                        section_id = %record.section_id,
                        attempts = record.attempts,
                        max_attempts = self.max_attempts,
                        error = %message,
                        "Generation failed, will retry"
                    );
                    record.advance(record.status)?;
                    Ok(StepOutcome::BackendFailed { error: message })
                }
            }
        }
    }

    fn validate(
        &self,
        record: &mut SectionRecord,
        request: &GenerationRequest,
    ) -> Result<StepOutcome, PipelineError> {
        let content = record.content.as_deref().unwrap_or("");
        let report = self.engine.validate(content, &Self::context(request));
        record.last_report = Some(report.clone());

        match report.verdict() {
            Verdict::Accepted(report) => {
                info!(
                    entry_id = %request.entry_id,
                    section_id = %record.section_id,
                    attempts = record.attempts,
                    score = report.overall_score,
                    tier = %report.tier,
                    "Section accepted"
                );
                record.advance(SectionStatus::Done)?;
                Ok(StepOutcome::Accepted {
                    overall_score: report.overall_score,
                    tier: report.tier,
                })
            }
            Verdict::Rejected(report) if record.attempts >= self.max_attempts => {
                let reason = rejection_reason(&report);
                warn!(
                    entry_id = %request.entry_id,
                    section_id = %record.section_id,
                    attempts = record.attempts,
                    score = report.overall_score,
                    "Section rejected, attempts exhausted"
                );
                record.advance(SectionStatus::Failed)?;
                Ok(StepOutcome::Failed { reason })
            }
            Verdict::Rejected(report) => {
                debug!(
                    entry_id = %request.entry_id,
                    section_id = %record.section_id,
                    attempts = record.attempts,
                    score = report.overall_score,
                    errors = report.errors.len(),
                    "Section rejected, correcting"
                );
                record.advance(SectionStatus::Correcting)?;
                Ok(StepOutcome::Rejected {
                    overall_score: report.overall_score,
                    tier: report.tier,
                })
            }
        }
    }
}

/// Human-readable reason a report was rejected.
pub fn rejection_reason(report: &ValidationReport) -> String {
    let mut reason = format!(
        "score {:.2} (tier {}) did not pass",
        report.overall_score, report.tier
    );
    if let Some(first) = report.errors.first() {
        reason.push_str(&format!("; {}", first.message));
    }
    reason
}
