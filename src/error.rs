//! Error types shared by the relay and the session manager

use crate::provider::ProviderError;

/// Message sent when a request carries no usable prompt
pub const PROMPT_REQUIRED: &str = "prompt is required";

/// Failure of a single completion request.
///
/// None of these end the connection the request arrived on.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed or missing request field; never reaches the provider
    #[error("{0}")]
    Validation(String),

    /// No usable credentials for the requested model; detected before any network call
    #[error("{0}")]
    ProviderUnavailable(String),

    /// The provider call itself failed. Not retried.
    #[error("LLM provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl RelayError {
    pub fn validation(message: impl Into<String>) -> Self {
        RelayError::Validation(message.into())
    }

    pub fn prompt_required() -> Self {
        RelayError::Validation(PROMPT_REQUIRED.to_string())
    }

    /// Short label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::ProviderUnavailable(_) => "provider_unavailable",
            RelayError::Provider(_) => "provider",
        }
    }
}

/// The peer went away. Ends a session normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection closed by peer")]
pub struct ConnectionClosed;
