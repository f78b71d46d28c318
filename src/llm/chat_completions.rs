//! OpenAI-compatible Chat Completions driver.
//!
//! Implements [`LlmDriver`] for `/v1/chat/completions` with `stream: true`,
//! decoding the server-sent `data:` frames into [`LlmEvent`]s.

use std::collections::BTreeMap;

use futures::StreamExt;

use crate::session::Turn;

use super::{Completion, LlmDriver, LlmEvent, LlmSettings, LlmStream};

/// Driver for OpenAI-compatible Chat Completions endpoints.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, messages: &[Turn]) -> anyhow::Result<LlmStream> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);

        let body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "messages": messages.iter().map(Turn::to_chat_message).collect::<Vec<_>>(),
        });

        let mut rb = self.http.post(&url).json(&body);
        if let Some(key) = &self.settings.api_key {
            rb = if self.settings.provider.uses_api_key_header() {
                rb.header("api-key", key)
            } else {
                rb.bearer_auth(key)
            };
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("backend returned {status}: {detail}");
        }

        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut decoder = FrameDecoder::default();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                for event in decoder.feed(&chunk)? {
                    yield event;
                }
                if decoder.is_done() {
                    break;
                }
            }
        };

        Ok(Box::pin(out))
    }
}

/// Incremental decoder for a streamed Chat Completions body.
///
/// Text of every choice is accumulated so the final [`Completion`] carries
/// full replies; only choice 0 is surfaced as [`LlmEvent::Delta`].
#[derive(Debug, Default)]
struct FrameDecoder {
    buf: Vec<u8>,
    choices: BTreeMap<usize, String>,
    done: bool,
}

impl FrameDecoder {
    fn is_done(&self) -> bool {
        self.done
    }

    fn feed(&mut self, bytes: &[u8]) -> anyhow::Result<Vec<LlmEvent>> {
        self.buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = find_double_newline(&self.buf) {
            if self.done {
                break;
            }
            let frame = self.buf.drain(..pos + 2).collect::<Vec<_>>();
            let text = String::from_utf8_lossy(&frame);

            for line in text.lines() {
                let line = line.trim();
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                self.decode_data(data.trim(), &mut events)?;
            }
        }
        Ok(events)
    }

    fn decode_data(&mut self, data: &str, events: &mut Vec<LlmEvent>) -> anyhow::Result<()> {
        if self.done {
            return Ok(());
        }

        if data == "[DONE]" {
            self.done = true;
            let choices = std::mem::take(&mut self.choices).into_values().collect();
            events.push(LlmEvent::Completed(Completion { choices }));
            return Ok(());
        }

        let v: serde_json::Value = serde_json::from_str(data)?;

        if let Some(err) = v.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map_or_else(|| err.to_string(), ToString::to_string);
            anyhow::bail!("backend error: {message}");
        }

        let Some(choices) = v.get("choices").and_then(|c| c.as_array()) else {
            return Ok(());
        };

        for (position, choice) in choices.iter().enumerate() {
            let index = choice
                .get("index")
                .and_then(serde_json::Value::as_u64)
                .map_or(position, |i| i as usize);
            let text = self.choices.entry(index).or_default();

            if let Some(delta) = choice
                .get("delta")
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
                && !delta.is_empty()
            {
                text.push_str(delta);
                if index == 0 {
                    events.push(LlmEvent::Delta {
                        text: delta.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
