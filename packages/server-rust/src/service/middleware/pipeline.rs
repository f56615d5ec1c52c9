//! Pipeline composition: wraps the application router in the layers every
//! dispatched operation passes through.

use std::time::Duration;

use axum::Router;
use http::StatusCode;
use tower::ServiceBuilder;
use tower_http::timeout::{Timeout, TimeoutLayer};

use super::metrics::{MetricsLayer, MetricsService};
use crate::service::config::BatchConfig;

/// Service stack a batch dispatches its operations into.
pub type DispatchPipeline = MetricsService<Timeout<Router>>;

/// Build the dispatch pipeline around the application `router`.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- record timing and outcome, including timeouts
/// 2. `TimeoutLayer` -- answer `504 Gateway Timeout` when a single operation
///    exceeds `operation_timeout_ms`
#[must_use]
pub fn build_dispatch_pipeline(router: Router, config: &BatchConfig) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            Duration::from_millis(config.operation_timeout_ms),
        ))
        .service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
