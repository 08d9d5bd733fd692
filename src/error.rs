//! Error types for the quire generation pipeline.

use crate::fingerprint::Fingerprint;
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors reported by a text-generation backend.
///
/// Cloneable so a single failure can be handed to every caller waiting on the
/// same in-flight computation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transient backend failure: {0}")]
    Transient(String),

    #[error("Backend rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Timeouts and connection-level failures are worth retrying; rejections are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout(_) | BackendError::Transient(_))
    }
}

/// Artifact cache errors
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Computation failed: {0}")]
    Compute(#[from] BackendError),

    #[error("In-flight computation for {0} was abandoned")]
    Abandoned(Fingerprint),

    #[error("Cache write failed: {0}")]
    Storage(String),
}

impl From<StorageError> for CacheError {
    fn from(err: StorageError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

/// Pipeline-level errors surfaced by the orchestrator and scheduler.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Section '{section_id}' failed after {attempts} attempts: {reason}")]
    SectionFailed {
        section_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("Blueprint generation failed after {attempts} attempts: {reason}")]
    BlueprintFailed { attempts: u32, reason: String },

    #[error("Entry assembly rejected (attempt {attempt} of {max}): {reason}")]
    AssemblyFailed {
        attempt: u32,
        max: u32,
        reason: String,
    },

    #[error("Entry assembly retries exhausted after {0} attempts")]
    AssemblyExhausted(u32),

    #[error("Invalid section transition for '{section_id}': {from:?} -> {to:?}")]
    InvalidTransition {
        section_id: String,
        from: crate::checkpoint::SectionStatus,
        to: crate::checkpoint::SectionStatus,
    },

    #[error("Invalid rubric: {0}")]
    InvalidRubric(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}
