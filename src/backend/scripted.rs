//! Deterministic scripted backend for tests and dry runs.
//!
//! Responses are chosen by the first rule whose needle occurs in the prompt.
//! A rule replays its responses in order and then keeps repeating the last
//! one; prompts matching no rule go to the fallback function.

use crate::backend::Backend;
use crate::error::BackendError;
use crate::request::SamplingParams;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Fallback = dyn Fn(&str) -> Result<String, BackendError> + Send + Sync;

struct Rule {
    needle: String,
    responses: Vec<Result<String, BackendError>>,
    next: usize,
}

pub struct ScriptedBackend {
    model: String,
    rules: Mutex<Vec<Rule>>,
    fallback: Box<Fallback>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// Backend whose fallback echoes the prompt back.
    pub fn new(model: &str) -> Self {
        Self::from_fn(model, |prompt| Ok(format!("Response to: {prompt}")))
    }

    /// Backend answering every unmatched prompt with `f(prompt)`.
    pub fn from_fn<F>(model: &str, f: F) -> Self
    where
        F: Fn(&str) -> Result<String, BackendError> + Send + Sync + 'static,
    {
        Self {
            model: model.to_string(),
            rules: Mutex::new(Vec::new()),
            fallback: Box::new(f),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, needle: &str, text: &str) -> Self {
        self.with_responses(needle, vec![Ok(text.to_string())])
    }

    pub fn with_responses(self, needle: &str, responses: Vec<Result<String, BackendError>>) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            responses,
            next: 0,
        });
        self
    }

    /// Sleep this long before answering, to exercise timeouts and joins.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn respond(&self, prompt: &str) -> Result<String, BackendError> {
        let mut rules = self.rules.lock();
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| !r.responses.is_empty() && prompt.contains(&r.needle))
        {
            let index = rule.next.min(rule.responses.len() - 1);
            rule.next += 1;
            return rule.responses[index].clone();
        }
        drop(rules);
        (self.fallback)(prompt)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(
        &self,
        prompt: &str,
        _sampling: &SamplingParams,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.respond(prompt)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
