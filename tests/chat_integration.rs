//! End-to-end chat tests: the real router, a scripted backend, no network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use chat_relay::AppState;
use chat_relay::chat::SESSION_HEADER;
use chat_relay::config::{AppConfig, ServerConfig};
use chat_relay::llm::{Completion, LlmDriver, LlmEvent, LlmStream};
use chat_relay::server::router;
use chat_relay::session::{SessionStore, Turn};
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

/// Backend that replays fixed chunks and records every message list it sees.
struct ScriptedDriver {
    chunks: Vec<&'static str>,
    fail_after: Option<usize>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedDriver {
    fn replying(chunks: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.to_vec(),
            fail_after: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing_after(chunks: &[&'static str], n: usize) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.to_vec(),
            fail_after: Some(n),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmDriver for ScriptedDriver {
    async fn stream(&self, messages: &[Turn]) -> anyhow::Result<LlmStream> {
        self.seen.lock().unwrap().push(messages.to_vec());

        let mut events: Vec<anyhow::Result<LlmEvent>> = Vec::new();
        for (idx, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(idx) {
                events.push(Err(anyhow::anyhow!("backend connection reset")));
                return Ok(Box::pin(futures::stream::iter(events)));
            }
            events.push(Ok(LlmEvent::Delta {
                text: (*chunk).to_string(),
            }));
        }
        if self.fail_after.is_some() {
            events.push(Err(anyhow::anyhow!("backend connection reset")));
        } else {
            events.push(Ok(LlmEvent::Completed(Completion {
                choices: vec![self.chunks.concat()],
            })));
        }
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

fn state_with(driver: Arc<ScriptedDriver>) -> AppState {
    AppState {
        sessions: SessionStore::default(),
        driver,
        config: Arc::new(AppConfig::default()),
    }
}

fn chat_request(uri: &str, session: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER, id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Parse an SSE body into `(event, data)` pairs, skipping comments.
fn parse_sse(body: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    for block in body.split("\n\n") {
        let mut name = String::from("message");
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                name = value.strip_prefix(' ').unwrap_or(value).to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }
        if !data.is_empty() {
            events.push((name, data.join("\n")));
        }
    }
    events
}

async fn read_events(response: Response) -> Vec<(String, String)> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    parse_sse(std::str::from_utf8(&bytes).unwrap())
}

fn session_id_of(response: &Response) -> String {
    response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_first_request_mints_session_and_streams_reply() {
    let driver = ScriptedDriver::replying(&["Hi", " there", "!"]);
    let state = state_with(Arc::clone(&driver));
    let app = router(state.clone());

    let response = app
        .oneshot(chat_request("/sse", None, r#"{"query":"hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    let id = session_id_of(&response);
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let events = read_events(response).await;
    assert_eq!(
        events,
        vec![
            ("chunk".to_string(), "Hi".to_string()),
            ("chunk".to_string(), " there".to_string()),
            ("chunk".to_string(), "!".to_string()),
            ("full".to_string(), "Hi there!".to_string()),
        ]
    );

    assert_eq!(driver.calls(), vec![vec![Turn::human("hello")]]);
    assert_eq!(
        state.sessions.get(&id).unwrap(),
        vec![Turn::human("hello"), Turn::assistant("Hi there!")]
    );
}

#[tokio::test]
async fn test_follow_up_replays_history() {
    let driver = ScriptedDriver::replying(&["Then", " more."]);
    let state = state_with(Arc::clone(&driver));
    state.sessions.put(
        "s-1",
        vec![Turn::human("hello"), Turn::assistant("Hi there!")],
        state.sessions.ttl(),
    );

    let response = router(state.clone())
        .oneshot(chat_request("/sse", Some("s-1"), r#"{"query":"and then?"}"#))
        .await
        .unwrap();

    assert_eq!(session_id_of(&response), "s-1");
    let events = read_events(response).await;
    assert_eq!(events.last().unwrap(), &("full".to_string(), "Then more.".to_string()));

    assert_eq!(
        driver.calls(),
        vec![vec![
            Turn::human("hello"),
            Turn::assistant("Hi there!"),
            Turn::human("and then?"),
        ]]
    );
    assert_eq!(
        state.sessions.get("s-1").unwrap(),
        vec![
            Turn::human("hello"),
            Turn::assistant("Hi there!"),
            Turn::human("and then?"),
            Turn::assistant("Then more."),
        ]
    );
}

#[tokio::test]
async fn test_two_sequential_requests_share_session() {
    let driver = ScriptedDriver::replying(&["ok"]);
    let state = state_with(Arc::clone(&driver));

    let first = router(state.clone())
        .oneshot(chat_request("/sse", None, r#"{"query":"one"}"#))
        .await
        .unwrap();
    let id = session_id_of(&first);
    read_events(first).await;

    let second = router(state.clone())
        .oneshot(chat_request("/sse", Some(&id), r#"{"query":"two"}"#))
        .await
        .unwrap();
    read_events(second).await;

    assert_eq!(state.sessions.get(&id).unwrap().len(), 4);
    assert_eq!(driver.calls()[1].len(), 3);
}

#[tokio::test]
async fn test_missing_query_is_rejected_without_side_effects() {
    let driver = ScriptedDriver::replying(&["unused"]);
    let state = state_with(Arc::clone(&driver));

    let response = router(state.clone())
        .oneshot(chat_request("/sse", None, r#"{"prompt":"hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(SESSION_HEADER).is_none());

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["message"].as_str().unwrap().contains("query"));

    assert!(driver.calls().is_empty());
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_non_json_body_is_rejected() {
    let driver = ScriptedDriver::replying(&["unused"]);
    let state = state_with(Arc::clone(&driver));

    let response = router(state)
        .oneshot(
            Request::post("/sse")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn test_backend_failure_leaves_session_unchanged() {
    let driver = ScriptedDriver::failing_after(&["Hel", "lo", " wor", "ld"], 2);
    let state = state_with(Arc::clone(&driver));
    let prior = vec![Turn::human("hi"), Turn::assistant("hey")];
    state.sessions.put("s-2", prior.clone(), state.sessions.ttl());

    let response = router(state.clone())
        .oneshot(chat_request("/sse", Some("s-2"), r#"{"query":"say hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let events = read_events(response).await;
    assert_eq!(
        events,
        vec![
            ("chunk".to_string(), "Hel".to_string()),
            ("chunk".to_string(), "lo".to_string()),
        ]
    );

    assert_eq!(state.sessions.get("s-2").unwrap(), prior);
}

#[tokio::test]
async fn test_client_gone_before_full_commits_nothing() {
    let driver = ScriptedDriver::replying(&["Hi"]);
    let state = state_with(Arc::clone(&driver));

    let response = router(state.clone())
        .oneshot(chat_request("/sse", None, r#"{"query":"hello"}"#))
        .await
        .unwrap();
    let id = session_id_of(&response);

    // Take only the chunk frame, then hang up.
    let mut body = response.into_body().into_data_stream();
    let mut received = String::new();
    while parse_sse(&received).is_empty() {
        let frame = body.next().await.expect("chunk frame").unwrap();
        received.push_str(std::str::from_utf8(&frame).unwrap());
    }
    assert_eq!(parse_sse(&received), vec![("chunk".to_string(), "Hi".to_string())]);
    drop(body);

    // Let the generation task observe the disconnect.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(driver.calls().len(), 1);
    assert!(state.sessions.get(&id).is_none());
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_413() {
    let driver = ScriptedDriver::replying(&["unused"]);
    let state = AppState {
        config: Arc::new(AppConfig {
            server: ServerConfig {
                body_limit_bytes: 32,
                ..ServerConfig::default()
            },
            ..AppConfig::default()
        }),
        ..state_with(Arc::clone(&driver))
    };
    let query = "x".repeat(64);

    let response = router(state.clone())
        .oneshot(chat_request("/sse", None, &format!(r#"{{"query":"{query}"}}"#)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["message"].is_string());

    assert!(driver.calls().is_empty());
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_backend_failure_on_new_session_creates_nothing() {
    let driver = ScriptedDriver::failing_after(&["a", "b"], 0);
    let state = state_with(driver);

    let response = router(state.clone())
        .oneshot(chat_request("/sse", None, r#"{"query":"hello"}"#))
        .await
        .unwrap();

    let id = session_id_of(&response);
    assert!(read_events(response).await.is_empty());
    assert!(state.sessions.get(&id).is_none());
}

#[tokio::test]
async fn test_prompt_endpoint_is_stateless() {
    let driver = ScriptedDriver::replying(&["4"]);
    let state = state_with(Arc::clone(&driver));

    let response = router(state.clone())
        .oneshot(chat_request("/prompt", Some("ignored"), r#"{"query":"2+2?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SESSION_HEADER).is_none());
    assert_eq!(
        read_events(response).await,
        vec![
            ("chunk".to_string(), "4".to_string()),
            ("full".to_string(), "4".to_string()),
        ]
    );

    assert_eq!(driver.calls(), vec![vec![Turn::human("2+2?")]]);
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_session_messages_endpoint() {
    let state = state_with(ScriptedDriver::replying(&[]));
    state.sessions.put(
        "s-3",
        vec![Turn::human("hello"), Turn::assistant("hi")],
        state.sessions.ttl(),
    );

    let response = router(state.clone())
        .oneshot(
            Request::get("/sessions/s-3/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        serde_json::json!([
            { "role": "human", "content": "hello" },
            { "role": "assistant", "content": "hi" }
        ])
    );

    let missing = router(state)
        .oneshot(
            Request::get("/sessions/nope/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let bytes = to_bytes(missing.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_health() {
    let response = router(state_with(ScriptedDriver::replying(&[])))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}
