//! Configuration System
//!
//! Layered configuration for the generation pipeline: merge-policy defaults,
//! the user's global config file, the workspace's `config/config.toml` and
//! `config/{QUIRE_ENV}.toml`, then `QUIRE__SECTION__KEY` environment variables.
//! The result is an immutable [`QuireConfig`] handed to constructors.

use crate::backend::{Backend, OllamaBackend, ScriptedBackend};
use crate::cache::CacheConfig;
use crate::error::{BackendError, PipelineError};
use crate::generation::GenerationSettings;
use crate::logging::LoggingConfig;
use crate::validation::{Rubric, ValidationEngine};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QuireConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub rubrics: RubricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where pipeline state lives. Relative paths resolve against the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Cache, checkpoints, ledger and batch stats live under this directory.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Finished documents.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".quire")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            output_dir: default_output_dir(),
        }
    }
}

/// Concrete directories derived from [`StorageConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub cache: PathBuf,
    pub checkpoints: PathBuf,
    pub ledger: PathBuf,
    pub stats: PathBuf,
    pub output: PathBuf,
}

impl StorageConfig {
    pub fn resolve(&self, workspace_root: &Path) -> StoragePaths {
        let state = absolutize(workspace_root, &self.state_dir);
        StoragePaths {
            cache: state.join("cache"),
            checkpoints: state.join("checkpoints"),
            ledger: state.join("ledger"),
            stats: state.join("batch_stats.json"),
            output: absolutize(workspace_root, &self.output_dir),
        }
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Ollama-compatible HTTP server.
    Ollama,
    /// Deterministic offline backend that echoes prompts; for dry runs.
    Scripted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub base_url: Option<String>,

    /// HTTP exchange timeout, independent of `generation.call_timeout_secs`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Ollama
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            model: default_model(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("Invalid base_url '{}': must be http(s)", url));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be positive".to_string());
        }
        Ok(())
    }

    pub fn build(&self) -> Result<Arc<dyn Backend>, BackendError> {
        match self.kind {
            BackendKind::Ollama => Ok(Arc::new(OllamaBackend::new(
                self.model.clone(),
                self.base_url.clone(),
                Duration::from_secs(self.request_timeout_secs),
            )?)),
            BackendKind::Scripted => Ok(Arc::new(ScriptedBackend::new(&self.model))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Persist batch stats every this many entries (0 = only at the end).
    #[serde(default = "default_stats_flush_every")]
    pub stats_flush_every: usize,

    /// Record runs and per-entry events in the run ledger.
    #[serde(default = "default_true")]
    pub ledger: bool,
}

fn default_stats_flush_every() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            stats_flush_every: default_stats_flush_every(),
            ledger: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricsConfig {
    #[serde(default = "Rubric::default_section")]
    pub section: Rubric,

    #[serde(default = "Rubric::default_entry")]
    pub entry: Rubric,
}

impl Default for RubricsConfig {
    fn default() -> Self {
        Self {
            section: Rubric::default_section(),
            entry: Rubric::default_entry(),
        }
    }
}

impl RubricsConfig {
    pub fn engines(&self) -> Result<(ValidationEngine, ValidationEngine), PipelineError> {
        Ok((
            ValidationEngine::new(self.section.clone())?,
            ValidationEngine::new(self.entry.clone())?,
        ))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Storage(String),
    Cache(String),
    Backend(String),
    Generation(String),
    Rubric(String, String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Backend(msg) => write!(f, "Backend: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Rubric(name, msg) => write!(f, "Rubric '{}': {}", name, msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl QuireConfig {
    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.state_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("state_dir cannot be empty".to_string()));
        }
        if self.storage.output_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("output_dir cannot be empty".to_string()));
        }

        if self.cache.hot_capacity == 0 || self.cache.warm_capacity == 0 {
            errors.push(ValidationError::Cache(
                "hot_capacity and warm_capacity must be positive".to_string(),
            ));
        }
        if self.cache.warm_capacity < self.cache.hot_capacity {
            errors.push(ValidationError::Cache(format!(
                "warm_capacity {} is smaller than hot_capacity {}",
                self.cache.warm_capacity, self.cache.hot_capacity
            )));
        }
        if self.cache.compression_level > 9 {
            errors.push(ValidationError::Cache(format!(
                "compression_level {} outside 0-9",
                self.cache.compression_level
            )));
        }

        if let Err(e) = self.backend.validate() {
            errors.push(ValidationError::Backend(e));
        }

        if self.generation.max_attempts == 0 {
            errors.push(ValidationError::Generation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.generation.max_assembly_attempts == 0 {
            errors.push(ValidationError::Generation(
                "max_assembly_attempts must be at least 1".to_string(),
            ));
        }
        if self.generation.call_timeout_secs == 0 {
            errors.push(ValidationError::Generation(
                "call_timeout_secs must be positive".to_string(),
            ));
        }

        for (name, rubric) in [("section", &self.rubrics.section), ("entry", &self.rubrics.entry)] {
            if let Err(e) = ValidationEngine::new(rubric.clone()) {
                errors.push(ValidationError::Rubric(name.to_string(), e.to_string()));
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            errors.push(ValidationError::Logging(format!(
                "format '{}' must be 'text' or 'json'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every problem into one error.
    pub fn validated(self) -> Result<Self, PipelineError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(self)
    }
}
