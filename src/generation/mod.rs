//! Quality-gated generation: sections, entries and batches.
//!
//! [`section`] holds the per-section state machine, [`entry`] drives all
//! sections of one entry through checkpoints to a finished document, and
//! [`batch`] runs many entries while keeping going past failures.

pub mod batch;
pub mod entry;
pub mod job;
pub mod output;
pub mod prompt;
pub mod section;

pub use batch::{BatchRunStats, BatchScheduler, EntryError};
pub use entry::{EntryOrchestrator, FinishedEntry};
pub use job::{EntrySpec, JobSpec, SectionSpec};
pub use output::OutputStore;
pub use prompt::{PromptBuilder, SectionPromptContext, TemplatePrompts, DEFAULT_CORRECTION_TEMPLATE};
pub use section::{SectionRunner, StepOutcome};

use crate::backend::RetryPolicy;
use crate::request::SamplingParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempt budgets, timeouts and sampling shared by every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Generation calls per section (first draft plus corrections).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Whole-entry validations before the entry is failed.
    #[serde(default = "default_max_assembly_attempts")]
    pub max_assembly_attempts: u32,
    /// Per backend call, applied on top of the HTTP client timeout.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub sampling: SamplingParams,
    #[serde(default = "default_correction_template")]
    pub correction_template: String,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_assembly_attempts() -> u32 {
    2
}

fn default_call_timeout_secs() -> u64 {
    300
}

fn default_correction_template() -> String {
    DEFAULT_CORRECTION_TEMPLATE.to_string()
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_assembly_attempts: default_max_assembly_attempts(),
            call_timeout_secs: default_call_timeout_secs(),
            retry: RetryPolicy::default(),
            sampling: SamplingParams::default(),
            correction_template: default_correction_template(),
        }
    }
}

impl GenerationSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
