//! Outer HTTP stack for the batch server.
//!
//! Wraps the public router (health, batch endpoint, fronted application).
//! Sub-requests dispatched from a batch never pass through here; they go
//! straight into the application through the dispatch pipeline.

use std::time::Duration;

use axum::body::Body;
use axum::http::header::HeaderName;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::config::NetworkConfig;

/// Header carrying the per-request UUID. Sub-requests inherit it from the
/// batch request, which ties their logs to the batch.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Methods a browser may use cross-origin: the batch endpoint plus whatever
/// the fronted application serves.
const CORS_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Wraps `router` in the outer HTTP stack.
///
/// Outermost first: request id assignment, tracing, gzip, CORS, the
/// whole-request timeout (a batch counts as one request), request id
/// propagation onto the response.
pub fn with_http_layers(router: Router, config: &NetworkConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    router
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(request_timeout(config.request_timeout))
        .layer(cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(http_span))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Span for one inbound request, keyed by its request id so batch and
/// per-operation spans nest under something searchable.
fn http_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
        request_id,
    )
}

/// `"*"` anywhere in `origins` allows every origin; otherwise only the
/// origins that parse as header values are allowed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(CORS_METHODS)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    fn app(config: &NetworkConfig) -> Router {
        let router = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "late"
                }),
            );
        with_http_layers(router, config)
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let response = app(&NetworkConfig::default())
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn caller_request_id_is_kept() {
        let response = app(&NetworkConfig::default())
            .oneshot(
                Request::get("/ping")
                    .header(REQUEST_ID_HEADER, "batch-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "batch-42");
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_headers() {
        let config = NetworkConfig {
            cors_origins: vec!["https://example.com".to_string(), "not a\nheader".to_string()],
            ..NetworkConfig::default()
        };
        let response = app(&config)
            .oneshot(
                Request::get("/ping")
                    .header("origin", "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let config = NetworkConfig {
            request_timeout: Duration::from_millis(20),
            ..NetworkConfig::default()
        };
        let response = app(&config)
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
