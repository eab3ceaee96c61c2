//! OpenAI-compatible provider client
//!
//! Non-streaming calls go through async-openai. Streaming uses raw HTTP and
//! decodes the SSE body incrementally so fragments are forwarded as soon as
//! they arrive.

use super::sse::content_fragments;
use super::{Backend, FragmentStream, ProviderAdapter, ProviderError, SamplingParams};
use crate::config::LlmConfig;
use crate::message::ChatMessage;
use async_openai::{
    config::{AzureConfig, OpenAIConfig},
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequest, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use std::time::Instant;

/// Key sent to local servers that ignore authentication
const LOCAL_API_KEY: &str = "ollama";

/// Adapter for any backend implementing the OpenAI chat-completions API
#[derive(Clone, Default)]
pub struct OpenAiCompatClient {
    http_client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (timeouts, proxies)
    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Client with the configured connect and read timeouts.
    ///
    /// The read timeout bounds every wait on the upstream, so a stalled
    /// stream ends in an error instead of hanging its session.
    pub fn from_config(llm: &LlmConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(llm.connect_timeout())
            .read_timeout(llm.read_timeout())
            .build()?;
        Ok(Self::with_http_client(http_client))
    }

    #[allow(deprecated)]
    fn build_request(
        backend: &Backend,
        messages: &[ChatMessage],
        params: SamplingParams,
    ) -> Result<CreateChatCompletionRequest, ProviderError> {
        let messages = messages
            .iter()
            .map(ChatMessage::to_request)
            .collect::<Result<Vec<ChatCompletionRequestMessage>, _>>()?;

        Ok(CreateChatCompletionRequestArgs::default()
            .model(backend.model())
            .messages(messages)
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .build()?)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatClient {
    async fn complete(
        &self,
        backend: &Backend,
        messages: &[ChatMessage],
        params: SamplingParams,
    ) -> Result<String, ProviderError> {
        let request = Self::build_request(backend, messages, params)?;

        let start = Instant::now();
        tracing::info!(
            target: "llm",
            backend = backend.kind(),
            model = backend.model(),
            message_count = messages.len(),
            "Starting LLM completion"
        );

        let result = match backend {
            Backend::Azure {
                endpoint,
                api_key,
                api_version,
                deployment,
            } => {
                let config = AzureConfig::new()
                    .with_api_base(endpoint)
                    .with_api_key(api_key.expose())
                    .with_deployment_id(deployment)
                    .with_api_version(api_version);
                Client::with_config(config)
                    .with_http_client(self.http_client.clone())
                    .chat()
                    .create(request)
                    .await
            }
            Backend::OpenAi { base_url, api_key, .. } | Backend::Anthropic { base_url, api_key, .. } => {
                let config = OpenAIConfig::new()
                    .with_api_base(base_url)
                    .with_api_key(api_key.expose());
                Client::with_config(config)
                    .with_http_client(self.http_client.clone())
                    .chat()
                    .create(request)
                    .await
            }
            Backend::Local { base_url, .. } => {
                let config = OpenAIConfig::new()
                    .with_api_base(base_url)
                    .with_api_key(LOCAL_API_KEY);
                Client::with_config(config)
                    .with_http_client(self.http_client.clone())
                    .chat()
                    .create(request)
                    .await
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let response = result.map_err(|e| {
            tracing::error!(target: "llm", error = %e, elapsed_ms, "LLM completion failed");
            ProviderError::from(e)
        })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("No content in response".to_string()))?;

        tracing::info!(
            target: "llm",
            backend = backend.kind(),
            model = backend.model(),
            elapsed_ms,
            input_tokens = response.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens = response.usage.as_ref().map(|u| u.completion_tokens),
            "LLM completion finished"
        );

        Ok(content)
    }

    async fn stream(
        &self,
        backend: &Backend,
        messages: &[ChatMessage],
        params: SamplingParams,
    ) -> Result<FragmentStream, ProviderError> {
        let body = serde_json::json!({
            "model": backend.model(),
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": true,
        });

        tracing::info!(
            target: "llm",
            backend = backend.kind(),
            model = backend.model(),
            message_count = messages.len(),
            "Starting streaming LLM call"
        );

        let mut request = self
            .http_client
            .post(backend.chat_completions_url())
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some((name, value)) = backend.auth_header() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(target: "llm", error = %e, "Streaming LLM call failed");
            ProviderError::from(e)
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(target: "llm", status = %status, error = %text, "Streaming LLM call returned error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(Box::pin(content_fragments(response.bytes_stream())))
    }
}
