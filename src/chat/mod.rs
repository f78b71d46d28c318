//! Session-aware streaming chat.
//!
//! A chat request runs as an explicit pipeline:
//!
//! 1. [`ChatContext::resolve`] picks up (or mints) the session and its history.
//! 2. [`invoker::generate`] streams the backend's reply through an
//!    [`SseRelay`] as `chunk` events, then a single `full` event.
//! 3. [`ChatContext::commit`] appends the exchange to the session, only if
//!    step 2 succeeded.

pub mod context;
pub mod invoker;
pub mod relay;

pub use context::{ChatContext, SESSION_HEADER};
pub use invoker::{GenerateError, Generation, generate, generate_from_prompt};
pub use relay::{RelayError, RelayEvent, RelaySubscriber, SseRelay};
