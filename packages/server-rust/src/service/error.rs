//! Batch-level errors returned by the batch endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use batchwire_core::BatchError;
use serde_json::json;

/// Errors that reject a whole batch. Per-operation failures never surface
/// here; they are recorded as that operation's outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum BatchApiError {
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("server overloaded, try again later")]
    Overloaded,
}

impl BatchApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Batch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ShuttingDown | Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for BatchApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": { "message": self.to_string() } }));
        (self.status_code(), body).into_response()
    }
}
