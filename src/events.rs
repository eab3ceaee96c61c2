//! Wire types for the streaming protocol
//!
//! A client sends one `RequestEnvelope` per logical request. The server answers
//! with zero or more chunk frames followed by exactly one terminal frame
//! (`done` or `error`).

use crate::error::RelayError;
use crate::relay::CompletionRequest;
use serde::{Deserialize, Serialize};

/// Inbound request as sent by clients (WebSocket message or HTTP body)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl RequestEnvelope {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Parse one inbound text message
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::validation(format!("invalid request: {e}")))
    }

    /// Validate and freeze into a `CompletionRequest`
    pub fn into_request(self) -> Result<CompletionRequest, RelayError> {
        let prompt = self
            .prompt
            .filter(|p| !p.is_empty())
            .ok_or_else(RelayError::prompt_required)?;

        let mut request = CompletionRequest::new(prompt)?
            .with_system_prompt(self.system_prompt)
            .with_model(self.model);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        Ok(request)
    }
}

/// Outbound frame on a streaming connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Chunk { chunk: String },
    Done { done: bool },
    Error { error: String },
}

impl ServerFrame {
    pub fn chunk(text: impl Into<String>) -> Self {
        ServerFrame::Chunk { chunk: text.into() }
    }

    pub fn done() -> Self {
        ServerFrame::Done { done: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            error: message.into(),
        }
    }

    /// True for `done` and `error`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ServerFrame::Chunk { .. })
    }

    pub fn to_json(&self) -> String {
        match self {
            ServerFrame::Chunk { chunk } => serde_json::json!({ "chunk": chunk }),
            ServerFrame::Done { done } => serde_json::json!({ "done": done }),
            ServerFrame::Error { error } => serde_json::json!({ "error": error }),
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_on_the_wire() {
        assert_eq!(ServerFrame::chunk("4").to_json(), r#"{"chunk":"4"}"#);
        assert_eq!(ServerFrame::done().to_json(), r#"{"done":true}"#);
        assert_eq!(
            ServerFrame::error("prompt is required").to_json(),
            r#"{"error":"prompt is required"}"#
        );
    }

    #[test]
    fn test_frames_parse_back() {
        let frame: ServerFrame = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert_eq!(frame, ServerFrame::done());
        assert!(frame.is_terminal());

        let frame: ServerFrame = serde_json::from_str(r#"{"chunk":"x"}"#).unwrap();
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_envelope_defaults() {
        let request = RequestEnvelope::parse(r#"{"prompt": "count"}"#)
            .unwrap()
            .into_request()
            .unwrap();

        assert_eq!(request.prompt(), "count");
        assert_eq!(request.system_prompt(), None);
        assert_eq!(request.model(), None);
        assert_eq!(request.params().temperature, 0.7);
        assert_eq!(request.params().max_tokens, 1000);
    }

    #[test]
    fn test_envelope_overrides() {
        let request = RequestEnvelope::parse(
            r#"{"prompt": "story", "system_prompt": "You are a storyteller",
                "model": "ollama/llama3", "temperature": 0.2, "max_tokens": 50,
                "extra": "ignored"}"#,
        )
        .unwrap()
        .into_request()
        .unwrap();

        assert_eq!(request.system_prompt(), Some("You are a storyteller"));
        assert_eq!(request.model(), Some("ollama/llama3"));
        assert_eq!(request.params().temperature, 0.2);
        assert_eq!(request.params().max_tokens, 50);
    }

    #[test]
    fn test_missing_or_empty_prompt() {
        for text in [r#"{}"#, r#"{"prompt": ""}"#, r#"{"prompt": null, "model": "x"}"#] {
            let err = RequestEnvelope::parse(text)
                .unwrap()
                .into_request()
                .unwrap_err();
            assert_eq!(err.to_string(), "prompt is required");
        }
    }

    #[test]
    fn test_malformed_envelope() {
        let err = RequestEnvelope::parse("not json").unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert!(err.to_string().starts_with("invalid request"));

        let err = RequestEnvelope::parse(r#"{"prompt": "x", "max_tokens": "lots"}"#).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }
}
