//! Generation requests and sampling parameters.

use serde::{Deserialize, Serialize};

/// Sampling parameters passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

fn default_repeat_penalty() -> f32 {
    1.1
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repeat_penalty: default_repeat_penalty(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// A single request for generated text.
///
/// Immutable once built; its fingerprint covers every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub entry_id: String,
    pub section_id: String,
    /// Backend model identity; the same prompt on another model is another artifact.
    pub model: String,
    pub prompt: String,
    pub sampling: SamplingParams,
    pub min_words: u32,
    pub max_words: Option<u32>,
}

impl GenerationRequest {
    pub fn fingerprint(&self) -> crate::fingerprint::Fingerprint {
        crate::fingerprint::compute_fingerprint(self)
    }

    /// Derive a request for the same section with a different prompt.
    pub fn with_prompt(&self, prompt: String) -> Self {
        Self {
            prompt,
            ..self.clone()
        }
    }
}
