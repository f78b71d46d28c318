//! Conversation turns.

use serde::{Deserialize, Serialize};

/// Ordered conversation history, oldest turn first.
pub type History = Vec<Turn>;

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller.
    Human,
    /// The model.
    Assistant,
}

impl Role {
    /// Role name as understood by OpenAI-compatible chat backends.
    #[must_use]
    pub fn as_chat_role(self) -> &'static str {
        match self {
            Self::Human => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
///
/// Turns are immutable once created; history only ever grows by appending
/// new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    /// Create a turn authored by the caller.
    #[must_use]
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    /// Create a turn authored by the model.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Wire representation for a Chat Completions `messages` array.
    #[must_use]
    pub fn to_chat_message(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role.as_chat_role(),
            "content": self.content,
        })
    }
}
