//! Model backend drivers.
//!
//! The [`LlmDriver`] trait is the seam between the chat pipeline and whatever
//! generates text. A driver turns a message list into a stream of
//! [`LlmEvent`]s: zero or more text increments followed by exactly one
//! [`LlmEvent::Completed`] carrying the final choices.
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: OpenAI-compatible `/v1/chat/completions`
//!   (OpenAI, Azure `OpenAI`, Ollama, and other compatible servers)

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;

use std::pin::Pin;

use futures::Stream;

use crate::session::Turn;

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `http://localhost:11434`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gemma`, `gpt-4o`).
    pub model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
}

/// Event produced by a driver while generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEvent {
    /// Incremental text of the primary choice.
    Delta {
        /// The text fragment to append.
        text: String,
    },
    /// Generation finished.
    Completed(Completion),
}

/// Final outcome of a generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Full text of every choice the backend produced, in choice-index order.
    pub choices: Vec<String>,
}

/// Boxed stream of driver events.
pub type LlmStream = Pin<Box<dyn Stream<Item = anyhow::Result<LlmEvent>> + Send>>;

/// Trait for streaming model backends.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Start generating a reply to `messages`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. Failures after the
    /// stream is open are reported as `Err` items on the stream.
    async fn stream(&self, messages: &[Turn]) -> anyhow::Result<LlmStream>;
}
