//! HTTP-facing error type.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors returned to API clients as `{ "message": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body could not be bound.
    #[error("{0}")]
    InvalidRequest(String),

    /// The request body exceeded `server.body_limit_bytes`.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// No live session has this identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::InvalidRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(
            name: "request.rejected",
            status = status.as_u16(),
            error = %self,
            "Request rejected"
        );
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}
