//! Text-generation backends
//!
//! The pipeline only needs one capability from a backend: turn a prompt and
//! sampling parameters into text. [`BackendCaller`] adds the per-call timeout
//! and bounded exponential backoff for transient failures, so everything above
//! it sees either text or a failure that already exhausted its retries.

pub mod ollama;
pub mod scripted;

pub use ollama::OllamaBackend;
pub use scripted::ScriptedBackend;

use crate::error::BackendError;
use crate::request::{GenerationRequest, SamplingParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// A black-box text generator.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, prompt: &str, sampling: &SamplingParams)
        -> Result<String, BackendError>;

    /// Identity of the underlying model; part of every request fingerprint.
    fn model_id(&self) -> &str;
}

/// Bounded exponential backoff for transient backend failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(32)).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Wraps a backend with a timeout and transient-failure retries.
#[derive(Clone)]
pub struct BackendCaller {
    backend: Arc<dyn Backend>,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl BackendCaller {
    pub fn new(backend: Arc<dyn Backend>, call_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            backend,
            call_timeout,
            retry,
        }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub async fn call(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let mut retries = 0u32;
        loop {
            let outcome = match timeout(
                self.call_timeout,
                self.backend.generate(&request.prompt, &request.sampling),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(self.call_timeout)),
            };

            match outcome {
                Ok(text) => {
                    debug!(
                        entry_id = %request.entry_id,
                        section_id = %request.section_id,
                        retries,
                        chars = text.len(),
                        "Backend call completed"
                    );
                    return Ok(text);
                }
                Err(err) if err.is_transient() && retries < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retries);
                    warn!(
                        entry_id = %request.entry_id,
                        section_id = %request.section_id,
                        retry = retries + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient backend failure, backing off"
                    );
                    sleep(delay).await;
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
