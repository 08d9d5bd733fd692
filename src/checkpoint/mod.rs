//! Entry checkpoints
//!
//! An [`EntryCheckpoint`] is the durable snapshot of an entry in progress: its
//! phase, the optional blueprint and one [`SectionRecord`] per planned section.
//! Section records only move along the edges [`SectionStatus::can_transition_to`]
//! allows, and `Done`/`Failed` are terminal.

pub mod store;

pub use store::CheckpointStore;

use crate::error::PipelineError;
use crate::fingerprint::Fingerprint;
use crate::validation::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bumped whenever the checkpoint layout changes incompatibly.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Pending,
    Generating,
    Validating,
    Correcting,
    Done,
    Failed,
}

impl SectionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SectionStatus::Done | SectionStatus::Failed)
    }

    pub fn can_transition_to(self, next: SectionStatus) -> bool {
        use SectionStatus::*;
        matches!(
            (self, next),
            (Pending, Generating)
                | (Generating, Validating)
                | (Generating, Generating)
                | (Generating, Failed)
                | (Validating, Done)
                | (Validating, Correcting)
                | (Validating, Failed)
                | (Correcting, Validating)
                | (Correcting, Correcting)
                | (Correcting, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SectionStatus::Pending => "pending",
            SectionStatus::Generating => "generating",
            SectionStatus::Validating => "validating",
            SectionStatus::Correcting => "correcting",
            SectionStatus::Done => "done",
            SectionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub section_id: String,
    pub status: SectionStatus,
    /// Completed generation calls, cache hits and backend failures included.
    pub attempts: u32,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub last_report: Option<ValidationReport>,
    #[serde(default)]
    pub last_fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SectionRecord {
    pub fn new(section_id: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            status: SectionStatus::Pending,
            attempts: 0,
            content: None,
            last_report: None,
            last_fingerprint: None,
            last_error: None,
        }
    }

    /// Move to `next`, refusing any edge the state machine does not allow.
    pub fn advance(&mut self, next: SectionStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                section_id: self.section_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.status == SectionStatus::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPhase {
    Blueprint,
    Sections,
    Assembly,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryCheckpoint {
    pub schema_version: u32,
    pub entry_id: String,
    pub phase: EntryPhase,
    pub sections: Vec<SectionRecord>,
    #[serde(default)]
    pub blueprint: Option<String>,
    #[serde(default)]
    pub assembly_attempts: u32,
    #[serde(default)]
    pub last_entry_report: Option<ValidationReport>,
    pub saved_at: DateTime<Utc>,
}

impl EntryCheckpoint {
    pub fn new<I, S>(entry_id: impl Into<String>, section_ids: I, needs_blueprint: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            entry_id: entry_id.into(),
            phase: if needs_blueprint {
                EntryPhase::Blueprint
            } else {
                EntryPhase::Sections
            },
            sections: section_ids.into_iter().map(SectionRecord::new).collect(),
            blueprint: None,
            assembly_attempts: 0,
            last_entry_report: None,
            saved_at: Utc::now(),
        }
    }

    pub fn section_ids(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.section_id.as_str())
    }

    /// True when the checkpoint's sections are exactly `plan`, in order.
    pub fn matches_plan<'a, I>(&self, plan: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.section_ids().eq(plan)
    }

    pub fn section(&self, section_id: &str) -> Option<&SectionRecord> {
        self.sections.iter().find(|s| s.section_id == section_id)
    }

    pub fn done_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_done()).count()
    }
}
