//! CapStack - backend template with an LLM completion relay
//!
//! This crate provides:
//! - A completion relay in front of OpenAI-compatible providers (OpenAI,
//!   Azure OpenAI, Anthropic's compatibility endpoint, local Ollama)
//! - A per-connection session manager streaming completions over WebSockets
//! - A SQLite-backed item store with a small CRUD API
//! - An axum HTTP server tying it together

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod provider;
pub mod relay;
pub mod server;
pub mod session;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::ApiKeyGuard;
pub use config::{LlmConfig, Settings};
pub use error::{ConnectionClosed, RelayError};
pub use events::{RequestEnvelope, ServerFrame};
pub use message::{ChatMessage, Role};
pub use provider::{route, Backend, OpenAiCompatClient, ProviderAdapter, ProviderError};
pub use relay::{Completion, CompletionRelay, CompletionRequest, CompletionStream};
pub use session::{Session, SessionState, SessionSummary, Transport};
pub use store::{Item, ItemStore, NewItem, StoreError};
pub use telemetry::Telemetry;
