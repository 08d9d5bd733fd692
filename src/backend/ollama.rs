//! Ollama-compatible HTTP backend (local models).

use crate::backend::Backend;
use crate::error::BackendError;
use crate::request::SamplingParams;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BACKEND_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

// Connection problems and server-side errors are retryable; anything else is the request's fault.
fn map_http_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Transient(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        BackendError::Transient(format!("Connection error: {}", error))
    } else if let Some(status) = error.status() {
        map_status(status.as_u16(), &error.to_string())
    } else {
        BackendError::Transient(format!("HTTP error: {}", error))
    }
}

fn map_status(status: u16, body: &str) -> BackendError {
    match status {
        429 | 500..=599 => {
            BackendError::Transient(format!("Request failed with status {}: {}", status, body))
        }
        404 => BackendError::Rejected(format!("Model not found: {}", body)),
        _ => BackendError::Rejected(format!("Request failed with status {}: {}", status, body)),
    }
}

/// Backend speaking Ollama's `/api/generate` protocol.
pub struct OllamaBackend {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaBackend {
    /// `request_timeout` bounds the HTTP exchange itself; the pipeline applies
    /// its own per-call timeout on top.
    pub fn new(
        model: String,
        base_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = base_url.unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(BACKEND_HTTP_CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Rejected(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
    ) -> Result<String, BackendError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: sampling.temperature,
                top_p: sampling.top_p,
                top_k: sampling.top_k,
                repeat_penalty: sampling.repeat_penalty,
                num_predict: sampling.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &error_text));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("Failed to parse response: {}", e)))?;

        Ok(body.response.trim().to_string())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
