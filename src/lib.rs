//! Chat Relay
//!
//! A streaming chat service that forwards prompts to a language-model backend
//! and relays the reply token-by-token over server-sent events, keeping
//! multi-turn context per client session.
//!
//! # Architecture
//!
//! - **Server**: Axum-based HTTP server with SSE streaming
//! - **Sessions**: in-memory, TTL-bounded conversation store
//! - **Chat pipeline**: resolve session → stream generation → commit exchange
//! - **LLM drivers**: OpenAI-compatible Chat Completions backend
//!
//! # Modules
//!
//! - [`chat`]: Session resolution, streaming relay, generation and commit
//! - [`config`]: Layered configuration (defaults, file, env, CLI)
//! - [`llm`]: LLM driver trait and implementations
//! - [`session`]: Conversation turns and session storage

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unused_async)]

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;

use crate::config::AppConfig;

use llm::LlmDriver;
use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session store for conversation history.
    pub sessions: SessionStore,
    /// Model backend.
    pub driver: Arc<dyn LlmDriver>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}
