//! Session-scoped conversation storage.
//!
//! Conversations are kept in memory only, keyed by an opaque session
//! identifier, and expire a fixed time after their last write.
//!
//! # Architecture
//!
//! - [`Turn`]: a single human or assistant message
//! - [`SessionStore`]: sharded TTL store with a background sweeper
//!
//! # Example
//!
//! ```rust
//! use chat_relay::session::{SessionStore, Turn};
//!
//! let store = SessionStore::default();
//! store.put("chat-1", vec![Turn::human("Hello!")], store.ttl());
//!
//! let history = store.get("chat-1").unwrap();
//! assert_eq!(history.len(), 1);
//! ```

mod store;
mod turn;

pub use store::{DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL, SessionStore};
pub use turn::{History, Role, Turn};
