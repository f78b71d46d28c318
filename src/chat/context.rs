//! Per-request session context.
//!
//! [`ChatContext::resolve`] runs before generation and [`ChatContext::commit`]
//! after it succeeds. `commit` consumes the context, so a request can write
//! its exchange back at most once.

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::session::{History, SessionStore, Turn};

/// Header carrying the session identifier, both inbound and outbound.
pub const SESSION_HEADER: &str = "x-chat-id";

/// Session state resolved for one chat request.
#[derive(Debug)]
pub struct ChatContext {
    session_id: String,
    history: History,
    minted: bool,
}

impl ChatContext {
    /// Resolve the caller's session from request headers.
    ///
    /// A missing or blank [`SESSION_HEADER`] yields a freshly minted UUID v4.
    /// History is loaded from `store` if an unexpired entry exists, otherwise
    /// the conversation starts empty.
    pub fn resolve(headers: &HeaderMap, store: &SessionStore) -> Self {
        let supplied = headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let (session_id, minted) = match supplied {
            Some(id) => (id.to_string(), false),
            None => (Uuid::new_v4().to_string(), true),
        };

        let history = store.get(&session_id).unwrap_or_default();

        tracing::info!(
            name: "session.resolved",
            session_id = %session_id,
            minted,
            prior_turns = history.len(),
            "Resolved chat session"
        );

        Self {
            session_id,
            history,
            minted,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// History as it was when the request arrived.
    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Whether the identifier was generated for this request.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.minted
    }

    /// Messages to send to the backend: prior history plus the new query.
    #[must_use]
    pub fn messages_with(&self, query: &str) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend_from_slice(&self.history);
        messages.push(Turn::human(query));
        messages
    }

    /// Append the exchange to the session and refresh its TTL.
    ///
    /// The exchange is appended to the session's current history if it is
    /// still live, otherwise to the history captured at resolution. Commits on
    /// the same session are serialized by the store, so concurrent requests
    /// cannot overwrite each other's turns.
    pub fn commit(self, store: &SessionStore, query: String, reply: String) {
        let Self {
            session_id,
            history,
            ..
        } = self;

        let mut turns = 0;
        store.update(session_id.as_str(), store.ttl(), |current| {
            let mut updated = current.unwrap_or(history);
            updated.push(Turn::human(query));
            updated.push(Turn::assistant(reply));
            turns = updated.len();
            updated
        });

        tracing::info!(
            name: "session.committed",
            session_id = %session_id,
            turns,
            "Committed exchange to session"
        );
    }
}
