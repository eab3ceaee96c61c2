//! Completion relay
//!
//! Turns a validated `CompletionRequest` into a provider call, either as a
//! single response or as an ordered stream of non-empty text fragments.

use crate::config::Settings;
use crate::error::RelayError;
use crate::message::{build_messages, ChatMessage};
use crate::provider::{route, Backend, ProviderAdapter, SamplingParams};
use futures::{future, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

/// Fragments of one streaming completion. Ends normally or after one `Err`.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// One logical completion call. The prompt is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    prompt: String,
    system_prompt: Option<String>,
    model: Option<String>,
    params: SamplingParams,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Result<Self, RelayError> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(RelayError::prompt_required());
        }
        Ok(Self {
            prompt,
            system_prompt: None,
            model: None,
            params: SamplingParams::default(),
        })
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|s| !s.is_empty());
        self
    }

    /// Override the configured default model
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.is_empty());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = max_tokens;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn params(&self) -> SamplingParams {
        self.params
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        build_messages(self.system_prompt(), &self.prompt)
    }
}

/// Result of a non-streaming completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
}

/// Forwards completion requests to a provider adapter
#[derive(Clone)]
pub struct CompletionRelay {
    settings: Arc<Settings>,
    adapter: Arc<dyn ProviderAdapter>,
}

impl CompletionRelay {
    pub fn new(settings: Arc<Settings>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self { settings, adapter }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The request's model override, or the configured default
    pub fn resolve_model<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model().unwrap_or(&self.settings.llm.model)
    }

    /// Select the backend for a request without contacting it
    pub fn resolve(&self, request: &CompletionRequest) -> Result<Backend, RelayError> {
        route(self.resolve_model(request), &self.settings.llm)
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<Completion, RelayError> {
        let backend = self.resolve(request)?;
        let model = self.resolve_model(request).to_string();

        let content = self
            .adapter
            .complete(&backend, &request.messages(), request.params())
            .await
            .map_err(|e| {
                tracing::error!(model = %model, backend = backend.kind(), error = %e, "Completion failed");
                RelayError::from(e)
            })?;

        Ok(Completion { content, model })
    }

    /// Open a streaming completion.
    ///
    /// Empty fragments are dropped. A provider failure, whether on open or
    /// mid-stream, surfaces as an `Err` and nothing follows it.
    pub async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, RelayError> {
        let backend = self.resolve(request)?;

        let upstream = self
            .adapter
            .stream(&backend, &request.messages(), request.params())
            .await
            .map_err(|e| {
                tracing::error!(backend = backend.kind(), error = %e, "Opening stream failed");
                RelayError::from(e)
            })?;

        let fragments = upstream
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .try_filter(|fragment| future::ready(!fragment.is_empty()))
            .map_err(RelayError::from);

        Ok(Box::pin(fragments))
    }
}
