//! Typed failure taxonomy for the dispatch engine.
//!
//! Every fallible engine operation returns [`DispatchError`]. The first six
//! variants are expected outcomes surfaced to callers with a stable HTTP
//! mapping; `Storage` covers the genuinely unexpected case of the database
//! being unavailable.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors produced by dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed input. Recoverable by re-submitting corrected input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation is not valid for the entity's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A configured ceiling has been reached.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The acting party does not own the targeted entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Lost a concurrency race. The request was already resolved; do not
    /// retry the same response.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence failure. Logged and surfaced as a 500.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl DispatchError {
    /// Short machine-readable kind, used in response bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation",
            DispatchError::NotFound(_) => "not_found",
            DispatchError::InvalidState(_) => "invalid_state",
            DispatchError::LimitExceeded(_) => "limit_exceeded",
            DispatchError::Forbidden(_) => "forbidden",
            DispatchError::Conflict(_) => "conflict",
            DispatchError::Storage(_) => "storage",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::InvalidState(_) => StatusCode::CONFLICT,
            DispatchError::LimitExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Forbidden(_) => StatusCode::FORBIDDEN,
            DispatchError::Conflict(_) => StatusCode::CONFLICT,
            DispatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Do not leak SQL details to callers
        let message = match &self {
            DispatchError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
        }));

        (status, body).into_response()
    }
}
