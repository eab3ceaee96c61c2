//! LLM Provider layer
//!
//! Backend selection is a pure function of the model name and the static
//! settings (`route`). The selected `Backend` is handed to a `ProviderAdapter`,
//! which performs the actual call. `OpenAiCompatClient` is the production
//! adapter and speaks the OpenAI chat-completions protocol to every backend.

mod adapter;
mod client;
mod config;
mod sse;

pub use adapter::*;
pub use client::*;
pub use config::*;
