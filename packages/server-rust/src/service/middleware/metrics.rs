//! Metrics middleware for dispatched sub-requests.
//!
//! Records duration and outcome of every operation a batch dispatches, both
//! as `tracing` span fields and through the `metrics` facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use http::{Request, Response};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

/// Counter of dispatched operations, labelled by `outcome`.
pub const OPERATIONS_TOTAL: &str = "batchwire_operations_total";

/// Histogram of dispatch durations in seconds.
pub const OPERATION_DURATION_SECONDS: &str = "batchwire_operation_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments sub-requests with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records sub-request duration and status.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for MetricsService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let span = info_span!(
            "dispatch",
            method = %request.method(),
            path = %request.uri().path(),
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let (outcome, status) = match &result {
                    Ok(response) if response.status().is_success() => {
                        ("success", response.status().as_u16())
                    }
                    Ok(response) => ("failure", response.status().as_u16()),
                    Err(_) => ("error", 0),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("status", status);
                tracing::Span::current().record("duration_ms", duration_ms);

                metrics::counter!(OPERATIONS_TOTAL, "outcome" => outcome).increment(1);
                metrics::histogram!(OPERATION_DURATION_SECONDS).record(elapsed.as_secs_f64());

                tracing::debug!(outcome, status, duration_ms, "sub-request complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
