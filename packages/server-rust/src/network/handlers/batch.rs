//! Batch endpoint handler.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use batchwire_core::{Batch, ExecutionOutcome, SequentialProcessor};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use super::AppState;
use crate::service::{build_dispatch_pipeline, BatchApiError, RouterDispatcher};

/// Body of a successful batch response.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<ExecutionOutcome>,
}

/// Handles `POST` on the batch endpoint.
///
/// Validates the whole payload before running anything, then dispatches each
/// operation in order into the application router. Per-operation failures
/// are reported in `results`; only batch-level problems produce an error
/// status.
///
/// # Errors
///
/// - `503` when the server is draining
/// - `422` when the payload is not a valid batch
pub async fn batch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BatchResponse>, Response> {
    let Some(_guard) = state.shutdown.admit_batch() else {
        return Err(BatchApiError::ShuttingDown.into_response());
    };

    let batch = Batch::from_slice(&body, state.batch.max_operations).map_err(|err| {
        debug!(error = %err, "batch rejected");
        BatchApiError::from(err).into_response()
    })?;

    let pipeline = build_dispatch_pipeline(state.app.clone(), &state.batch);
    let dispatcher =
        RouterDispatcher::new(pipeline, &headers, state.batch.max_response_body_bytes);
    let results = SequentialProcessor::new(dispatcher).run_batch(&batch).await;

    info!(
        operations = batch.len(),
        failed = results.iter().filter(|outcome| outcome.failed).count(),
        "batch completed"
    );

    Ok(Json(BatchResponse { results }))
}
