//! Provider adapter seam

use super::Backend;
use crate::message::ChatMessage;
use async_openai::error::OpenAIError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Lazy sequence of text fragments from a streaming completion.
///
/// Ends after `[DONE]` or after the first `Err` item.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Errors raised by a provider call
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("API call failed: {0}")]
    Sdk(#[from] OpenAIError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Error object delivered in the middle of a stream
    #[error("Stream error: {0}")]
    Stream(String),
}

/// Sampling parameters forwarded with every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// An LLM integration exposing request/response and streaming completion
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Suspends until the full response text is available
    async fn complete(
        &self,
        backend: &Backend,
        messages: &[ChatMessage],
        params: SamplingParams,
    ) -> Result<String, ProviderError>;

    /// Opens a streaming completion. Fragments are yielded in arrival order.
    async fn stream(
        &self,
        backend: &Backend,
        messages: &[ChatMessage],
        params: SamplingParams,
    ) -> Result<FragmentStream, ProviderError>;
}
