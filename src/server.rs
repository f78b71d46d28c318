use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{Instrument, info};

use crate::AppState;
use crate::chat::{self, ChatContext, SESSION_HEADER};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::llm::{ChatCompletionsDriver, LlmDriver, LlmSettings};
use crate::session::{SessionStore, Turn};

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        provider = ?settings.provider,
        "LLM configuration loaded"
    );

    let driver: Arc<dyn LlmDriver> = Arc::new(ChatCompletionsDriver::new(settings));

    let sessions = SessionStore::new(config.session.ttl(), config.session.sweep_interval());
    let sweeper = sessions.start_sweeper();

    info!(
        name: "session.store.started",
        ttl_secs = config.session.ttl_secs,
        sweep_interval_secs = config.session.sweep_interval_secs,
        "Session store started"
    );

    let state = AppState {
        sessions: sessions.clone(),
        driver,
        config: Arc::clone(&config),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "Session sweeper terminated abnormally");
    }

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .route("/sse", post(chat_stream))
        .route("/prompt", post(single_prompt))
        .route("/sessions/{id}/messages", get(session_messages))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!(name: "server.shutdown", "Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the chat endpoints.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// User prompt.
    query: String,
}

/// POST /sse - Session-scoped chat streamed as SSE.
async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;

    let ctx = ChatContext::resolve(&headers, &state.sessions);
    let session_id = ctx.session_id().to_string();
    let messages = ctx.messages_with(&req.query);

    for (idx, msg) in messages.iter().enumerate() {
        tracing::debug!(
            session_id = %session_id,
            message_index = idx,
            role = ?msg.role(),
            content = %msg.content(),
            "Message in history"
        );
    }

    let (relay, subscriber) = chat::relay::channel();
    let driver = Arc::clone(&state.driver);
    let sessions = state.sessions.clone();
    let span = tracing::info_span!("chat", session_id = %session_id);

    tokio::spawn(
        async move {
            match chat::generate(driver.as_ref(), &messages, &relay).await {
                Ok(generation) => {
                    info!(
                        name: "generation.completed",
                        chunks = generation.chunks.len(),
                        reply_length = generation.text.len(),
                        "Generation completed"
                    );
                    ctx.commit(&sessions, req.query, generation.text);
                }
                Err(e) => {
                    tracing::error!(
                        name: "generation.failed",
                        error = %e,
                        "Failed to generate; session left unchanged"
                    );
                }
            }
            // Ends the response body.
            drop(relay);
        }
        .instrument(span),
    );

    Ok(([(SESSION_HEADER, session_id)], subscriber.into_sse()).into_response())
}

/// POST /prompt - Stateless single-prompt generation streamed as SSE.
async fn single_prompt(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;

    let (relay, subscriber) = chat::relay::channel();
    let driver = Arc::clone(&state.driver);
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("prompt", request_id = %request_id);

    tokio::spawn(
        async move {
            match chat::generate_from_prompt(driver.as_ref(), &req.query, &relay).await {
                Ok(generation) => info!(
                    name: "generation.completed",
                    chunks = generation.chunks.len(),
                    reply_length = generation.text.len(),
                    "Generation completed"
                ),
                Err(e) => tracing::error!(
                    name: "generation.failed",
                    error = %e,
                    "Failed to generate"
                ),
            }
        }
        .instrument(span),
    );

    Ok(subscriber.into_sse().into_response())
}

/// GET /sessions/:id/messages - History of a live session.
async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Turn>>, ApiError> {
    state
        .sessions
        .get(&id)
        .map(Json)
        .ok_or(ApiError::SessionNotFound(id))
}

/// GET /health - Liveness probe.
async fn health() -> &'static str {
    "ok"
}
