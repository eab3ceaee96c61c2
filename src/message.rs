//! Chat message types sent to the provider.
//!
//! Stored as plain role/content pairs; `to_request()` produces the
//! async-openai wire type when the SDK path is used.

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single message in the outbound conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn to_request(&self) -> Result<ChatCompletionRequestMessage, OpenAIError> {
        Ok(match self.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(self.content.clone())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(self.content.clone())
                .build()?
                .into(),
        })
    }
}

/// Build the conversation for a single prompt: optional system message, then the user prompt
pub fn build_messages(system_prompt: Option<&str>, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_is_prepended() {
        let messages = build_messages(Some("Be brief"), "2+2?");

        assert_eq!(
            messages,
            vec![ChatMessage::system("Be brief"), ChatMessage::user("2+2?")]
        );
    }

    #[test]
    fn test_empty_system_prompt_is_skipped() {
        assert_eq!(build_messages(Some(""), "hi"), vec![ChatMessage::user("hi")]);
        assert_eq!(build_messages(None, "hi"), vec![ChatMessage::user("hi")]);
    }

    #[test]
    fn test_wire_roles() {
        let json = serde_json::to_value(ChatMessage::system("x")).unwrap();
        assert_eq!(json["role"], "system");

        let request = ChatMessage::user("hello").to_request().unwrap();
        assert!(matches!(request, ChatCompletionRequestMessage::User(_)));
    }
}
