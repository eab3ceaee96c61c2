//! Backend selection
//!
//! Which backend serves a request depends only on the model name and the
//! static `LlmConfig`, so routing is a pure function.

use crate::config::LlmConfig;
use crate::error::RelayError;
use std::fmt;

/// Model prefix routed to Azure OpenAI (`azure/<deployment>`)
pub const AZURE_PREFIX: &str = "azure/";
/// Model prefix routed to the local Ollama endpoint (`ollama/<model>`)
pub const LOCAL_PREFIX: &str = "ollama/";
/// Model prefix routed to Anthropic
pub const ANTHROPIC_PREFIX: &str = "claude";

const NO_PROVIDER: &str = "No LLM provider configured. \
    Set AZURE_OPENAI_API_KEY + AZURE_OPENAI_ENDPOINT for Azure OpenAI, \
    or OPENAI_API_KEY for OpenAI in your .env file.";

/// An API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// A resolved backend with its credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    OpenAi {
        base_url: String,
        api_key: ApiKey,
        model: String,
    },
    Azure {
        endpoint: String,
        api_key: ApiKey,
        api_version: String,
        deployment: String,
    },
    /// Anthropic through its OpenAI-compatible endpoint
    Anthropic {
        base_url: String,
        api_key: ApiKey,
        model: String,
    },
    /// Local OpenAI-compatible server; no credentials
    Local { base_url: String, model: String },
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::OpenAi { .. } => "openai",
            Backend::Azure { .. } => "azure",
            Backend::Anthropic { .. } => "anthropic",
            Backend::Local { .. } => "local",
        }
    }

    /// Model (or Azure deployment) name sent upstream
    pub fn model(&self) -> &str {
        match self {
            Backend::OpenAi { model, .. }
            | Backend::Anthropic { model, .. }
            | Backend::Local { model, .. } => model,
            Backend::Azure { deployment, .. } => deployment,
        }
    }

    /// Chat-completions endpoint
    pub fn chat_completions_url(&self) -> String {
        match self {
            Backend::OpenAi { base_url, .. }
            | Backend::Anthropic { base_url, .. }
            | Backend::Local { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Backend::Azure {
                endpoint,
                api_version,
                deployment,
                ..
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    /// Authentication header for raw HTTP calls
    pub fn auth_header(&self) -> Option<(&'static str, String)> {
        match self {
            Backend::OpenAi { api_key, .. } | Backend::Anthropic { api_key, .. } => {
                Some(("Authorization", format!("Bearer {}", api_key.expose())))
            }
            Backend::Azure { api_key, .. } => Some(("api-key", api_key.expose().to_string())),
            Backend::Local { .. } => None,
        }
    }
}

/// Pick the backend for `model`.
///
/// Fails with `ProviderUnavailable` when the backend the model needs has no
/// credentials; no network resource is touched either way.
pub fn route(model: &str, llm: &LlmConfig) -> Result<Backend, RelayError> {
    if let Some(deployment) = model.strip_prefix(AZURE_PREFIX) {
        if deployment.is_empty() {
            return Err(RelayError::validation(format!(
                "model '{model}' does not name an Azure deployment"
            )));
        }
        return azure(llm, deployment).ok_or_else(|| {
            RelayError::ProviderUnavailable(format!(
                "Model '{model}' needs Azure OpenAI. \
                 Set AZURE_OPENAI_API_KEY + AZURE_OPENAI_ENDPOINT in your .env file."
            ))
        });
    }

    if let Some(name) = model.strip_prefix(LOCAL_PREFIX) {
        if name.is_empty() {
            return Err(RelayError::validation(format!(
                "model '{model}' does not name a local model"
            )));
        }
        return Ok(Backend::Local {
            base_url: llm.ollama_base_url.clone(),
            model: name.to_string(),
        });
    }

    if model.starts_with(ANTHROPIC_PREFIX) {
        return match &llm.anthropic_api_key {
            Some(key) => Ok(Backend::Anthropic {
                base_url: llm.anthropic_base_url.clone(),
                api_key: ApiKey::new(key.clone()),
                model: model.to_string(),
            }),
            None => Err(RelayError::ProviderUnavailable(format!(
                "Model '{model}' needs Anthropic. Set ANTHROPIC_API_KEY in your .env file."
            ))),
        };
    }

    if let Some(key) = &llm.openai_api_key {
        return Ok(Backend::OpenAi {
            base_url: llm.openai_base_url.clone(),
            api_key: ApiKey::new(key.clone()),
            model: model.to_string(),
        });
    }

    // Bare model names double as Azure deployment names
    azure(llm, model).ok_or_else(|| RelayError::ProviderUnavailable(NO_PROVIDER.to_string()))
}

fn azure(llm: &LlmConfig, deployment: &str) -> Option<Backend> {
    let api_key = llm.azure_api_key.as_ref()?;
    let endpoint = llm.azure_endpoint.as_ref()?;
    Some(Backend::Azure {
        endpoint: endpoint.clone(),
        api_key: ApiKey::new(api_key.clone()),
        api_version: llm.azure_api_version.clone(),
        deployment: deployment.to_string(),
    })
}
