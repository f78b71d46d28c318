//! Drives a model backend and forwards its output through the relay.

use futures::StreamExt;

use crate::llm::{LlmDriver, LlmEvent};
use crate::session::Turn;

use super::relay::{RelayError, SseRelay};

/// Outcome of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Full assistant reply, as delivered in the `full` event.
    pub text: String,
    /// Fragments delivered as `chunk` events, in order.
    pub chunks: Vec<String>,
}

/// Why a generation did not produce a reply.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The backend failed to start or failed mid-stream.
    #[error("backend generation failed: {0:#}")]
    Backend(anyhow::Error),
    /// The client went away.
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// The backend finished without any output choice.
    #[error("backend returned no choices")]
    NoChoices,
    /// The backend stream ended without signalling completion.
    #[error("backend stream ended before completion")]
    Incomplete,
}

/// Generate a reply to `messages`, streaming it through `relay`.
///
/// Each increment is published as a `chunk` as soon as it arrives. The `full`
/// event is published only when the backend completes with at least one
/// choice; on any error nothing further is published.
pub async fn generate(
    driver: &dyn LlmDriver,
    messages: &[Turn],
    relay: &SseRelay,
) -> Result<Generation, GenerateError> {
    let mut stream = driver
        .stream(messages)
        .await
        .map_err(GenerateError::Backend)?;

    let mut chunks = Vec::new();
    let mut completion = None;

    while let Some(event) = stream.next().await {
        match event.map_err(GenerateError::Backend)? {
            LlmEvent::Delta { text } => {
                relay.publish_chunk(text.as_str()).await?;
                chunks.push(text);
            }
            LlmEvent::Completed(done) => {
                completion = Some(done);
                break;
            }
        }
    }

    let completion = completion.ok_or(GenerateError::Incomplete)?;
    let text = completion
        .choices
        .into_iter()
        .next()
        .ok_or(GenerateError::NoChoices)?;

    relay.publish_full(text.as_str()).await?;

    Ok(Generation { text, chunks })
}

/// Generate a reply to a single prompt with no prior history.
pub async fn generate_from_prompt(
    driver: &dyn LlmDriver,
    prompt: &str,
    relay: &SseRelay,
) -> Result<Generation, GenerateError> {
    generate(driver, &[Turn::human(prompt)], relay).await
}
