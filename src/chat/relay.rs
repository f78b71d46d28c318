//! Server-sent-events relay for generated text.
//!
//! [`channel`] pairs a publishing [`SseRelay`] with a [`RelaySubscriber`]
//! that becomes the HTTP response body. A publish returns only once the
//! transport has taken the event off the channel, and fails as soon as the
//! client has gone away.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// SSE event name for incremental text.
pub const CHUNK_EVENT: &str = "chunk";

/// SSE event name for the complete reply.
pub const FULL_EVENT: &str = "full";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Errors raised while publishing to a client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The response body was dropped, usually because the client disconnected.
    #[error("client disconnected before the `{event}` event could be delivered")]
    Closed {
        /// Name of the event that could not be delivered.
        event: &'static str,
    },
}

/// An event on the outbound stream.
///
/// Carriage returns in the text are written to the wire as `\n`, since SSE
/// data may not contain them. This is the one place the streamed text can
/// differ from the committed history, which keeps the raw reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A partial text fragment.
    Chunk(String),
    /// The complete generated text.
    Full(String),
}

impl RelayEvent {
    /// SSE event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chunk(_) => CHUNK_EVENT,
            Self::Full(_) => FULL_EVENT,
        }
    }

    /// Event payload.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Chunk(text) | Self::Full(text) => text,
        }
    }

    fn into_sse(self) -> Event {
        // SSE field values may not contain bare carriage returns.
        let data = self.text().replace("\r\n", "\n").replace('\r', "\n");
        Event::default().event(self.name()).data(data)
    }
}

/// Publishing half of the relay.
///
/// Not `Clone`: a single owner publishes, which keeps events in call order.
#[derive(Debug)]
pub struct SseRelay {
    tx: mpsc::Sender<RelayEvent>,
}

impl SseRelay {
    /// Hand one event to the transport, returning once the subscriber has taken it.
    pub async fn publish(&self, event: RelayEvent) -> Result<(), RelayError> {
        let name = event.name();
        self.tx
            .send(event)
            .await
            .map_err(|_closed| RelayError::Closed { event: name })?;
        // The only slot frees up once the subscriber has taken the event.
        self.tx
            .reserve()
            .await
            .map(drop)
            .map_err(|_closed| RelayError::Closed { event: name })
    }

    /// Publish a `chunk` event.
    pub async fn publish_chunk(&self, text: impl Into<String>) -> Result<(), RelayError> {
        self.publish(RelayEvent::Chunk(text.into())).await
    }

    /// Publish the `full` event.
    pub async fn publish_full(&self, text: impl Into<String>) -> Result<(), RelayError> {
        self.publish(RelayEvent::Full(text.into())).await
    }
}

/// Receiving half of the relay.
#[derive(Debug)]
pub struct RelaySubscriber {
    rx: mpsc::Receiver<RelayEvent>,
}

impl RelaySubscriber {
    /// Receive the next event; `None` once the relay has been dropped.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        self.rx.recv().await
    }

    /// Turn the subscriber into an SSE response body.
    ///
    /// The body ends when the publishing [`SseRelay`] is dropped.
    pub fn into_sse(self) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
        let stream = ReceiverStream::new(self.rx).map(|event| Ok(event.into_sse()));
        Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
    }
}

/// Create a connected relay pair.
#[must_use]
pub fn channel() -> (SseRelay, RelaySubscriber) {
    let (tx, rx) = mpsc::channel(1);
    (SseRelay { tx }, RelaySubscriber { rx })
}
