//! In-process dispatch: executes resolved operations against an axum
//! application without leaving the process.
//!
//! Each operation becomes an `http::Request` built the way a client would
//! have sent it on its own:
//! - headers of the enclosing batch request are inherited unless the
//!   operation overrides them
//! - `params` travel in the query string for GET, HEAD and DELETE, and as a
//!   JSON body otherwise
//! - response bodies are decoded as JSON when possible

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::Body;
use batchwire_core::{Dispatch, DispatchResponse, Headers, ResolvedOperation};
use http::header::{ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use serde_json::{json, Map, Value};
use tower::{Service, ServiceExt};
use url::form_urlencoded;

/// Batch request headers that describe the batch payload itself and must not
/// leak into sub-requests. `accept-encoding` is dropped because sub-response
/// bodies are decoded here, not by the client.
const NON_INHERITED_HEADERS: [HeaderName; 5] = [
    ACCEPT_ENCODING,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    HOST,
    TRANSFER_ENCODING,
];

/// Reasons an operation cannot be turned into an HTTP request.
#[derive(Debug, thiserror::Error)]
pub enum RequestBuildError {
    #[error("invalid method {0:?}")]
    Method(String),
    #[error("invalid header {name:?}")]
    Header { name: String },
    #[error("invalid url {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: http::Error,
    },
}

// ---------------------------------------------------------------------------
// RouterDispatcher
// ---------------------------------------------------------------------------

/// [`Dispatch`] implementation backed by a tower service, normally the
/// application router wrapped in the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct RouterDispatcher<S> {
    service: S,
    base_headers: HeaderMap,
    max_body_bytes: usize,
}

impl<S> RouterDispatcher<S> {
    /// Creates a dispatcher whose sub-requests inherit `batch_headers`.
    #[must_use]
    pub fn new(service: S, batch_headers: &HeaderMap, max_body_bytes: usize) -> Self {
        let mut base_headers = batch_headers.clone();
        for name in &NON_INHERITED_HEADERS {
            base_headers.remove(name);
        }
        Self {
            service,
            base_headers,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl<S> Dispatch for RouterDispatcher<S>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    async fn dispatch(&self, op: &ResolvedOperation) -> anyhow::Result<DispatchResponse> {
        let request = match build_request(op, &self.base_headers) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "operation could not be turned into a request");
                return Ok(DispatchResponse::new(
                    StatusCode::BAD_REQUEST.as_u16(),
                    json!({ "error": { "message": err.to_string() } }),
                ));
            }
        };

        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        into_dispatch_response(response, self.max_body_bytes).await
    }
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

/// Whether `params` go into the query string for this method.
fn params_in_query(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
}

/// Builds the HTTP request for a resolved operation.
///
/// # Errors
///
/// Returns [`RequestBuildError`] if the method, a header, or the url is not
/// valid HTTP.
pub fn build_request(
    op: &ResolvedOperation,
    base_headers: &HeaderMap,
) -> Result<Request<Body>, RequestBuildError> {
    let method = Method::from_bytes(op.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| RequestBuildError::Method(op.method.clone()))?;

    let mut headers = base_headers.clone();
    for (name, value) in &op.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RequestBuildError::Header { name: name.clone() })?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| RequestBuildError::Header { name: name.clone() })?;
        headers.insert(header_name, header_value);
    }

    let (uri, body) = if params_in_query(&method) {
        (append_query(&op.url, &op.params), Body::empty())
    } else {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = Value::Object(op.params.clone()).to_string();
        (op.url.clone(), Body::from(body))
    };

    let mut builder = Request::builder().method(method).uri(&uri);
    if let Some(target) = builder.headers_mut() {
        *target = headers;
    }
    builder
        .body(body)
        .map_err(|source| RequestBuildError::Url { url: uri, source })
}

/// Appends `params` to the query string of `url`, Rack style: nested objects
/// become `key[sub]=...` and arrays become repeated `key[]=...`.
fn append_query(target: &str, params: &Map<String, Value>) -> String {
    if params.is_empty() {
        return target.to_string();
    }

    let (path, existing) = target.split_once('?').unwrap_or((target, ""));

    // Start position 0 so the first new pair is separated from `existing`.
    let mut serializer = form_urlencoded::Serializer::for_suffix(existing.to_string(), 0);
    for (key, value) in params {
        encode_param(&mut serializer, key, value);
    }
    format!("{path}?{}", serializer.finish())
}

fn encode_param(serializer: &mut form_urlencoded::Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (sub, nested) in map {
                encode_param(serializer, &format!("{key}[{sub}]"), nested);
            }
        }
        Value::Array(items) => {
            let array_key = format!("{key}[]");
            for item in items {
                encode_param(serializer, &array_key, item);
            }
        }
        Value::String(s) => {
            serializer.append_pair(key, s);
        }
        Value::Null => {
            serializer.append_pair(key, "");
        }
        other => {
            serializer.append_pair(key, &other.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Response conversion
// ---------------------------------------------------------------------------

async fn into_dispatch_response(
    response: Response<Body>,
    max_body_bytes: usize,
) -> anyhow::Result<DispatchResponse> {
    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());
    let bytes = axum::body::to_bytes(response.into_body(), max_body_bytes).await?;

    Ok(DispatchResponse {
        status,
        headers,
        body: decode_body(&bytes),
    })
}

/// Flattens a header map; repeated headers are joined with `", "`.
fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let Ok(value) = value.to_str() else { continue };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}

/// JSON bodies are decoded; anything else is returned as a string, and an
/// empty body as `null`.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;

    fn op(method: &str, url: &str, params: Value, headers: &[(&str, &str)]) -> ResolvedOperation {
        let Value::Object(params) = params else {
            panic!("params must be an object")
        };
        ResolvedOperation {
            index: 0,
            method: method.to_string(),
            url: url.to_string(),
            params,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn get_params_go_into_the_query_string() {
        let request = build_request(
            &op("get", "/items?sort=asc", json!({"name": "a b", "limit": 5}), &[]),
            &HeaderMap::new(),
        )
        .unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.uri().path(), "/items");
        assert_eq!(request.uri().query(), Some("sort=asc&limit=5&name=a+b"));
    }

    #[test]
    fn nested_params_use_bracket_keys() {
        let url = append_query("/s", json!({"f": {"a": 1}, "ids": [1, 2]}).as_object().unwrap());
        assert_eq!(url, "/s?f%5Ba%5D=1&ids%5B%5D=1&ids%5B%5D=2");
    }

    #[test]
    fn non_get_params_become_a_json_body() {
        let request = build_request(
            &op("post", "/items", json!({"name": "a"}), &[]),
            &HeaderMap::new(),
        )
        .unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.uri().query(), None);
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn operation_headers_override_batch_headers() {
        let mut batch_headers = HeaderMap::new();
        batch_headers.insert("authorization", HeaderValue::from_static("Bearer batch"));
        batch_headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        batch_headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        batch_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));

        let dispatcher = RouterDispatcher::new((), &batch_headers, 1024);
        let request = build_request(
            &op("get", "/a", json!({}), &[("authorization", "Bearer op")]),
            &dispatcher.base_headers,
        )
        .unwrap();

        assert_eq!(request.headers()["authorization"], "Bearer op");
        assert_eq!(request.headers()["x-request-id"], "req-1");
        assert!(request.headers().get(CONTENT_LENGTH).is_none());
        assert!(request.headers().get(ACCEPT_ENCODING).is_none());
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = build_request(&op("get", "/a", json!({}), &[("bad header", "v")]), &HeaderMap::new())
            .unwrap_err();
        assert!(matches!(err, RequestBuildError::Header { .. }));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = build_request(&op("get", "/a b", json!({}), &[]), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, RequestBuildError::Url { .. }));
    }

    #[test]
    fn body_decoding() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(br#"{"id": 7}"#), json!({"id": 7}));
        assert_eq!(decode_body(b"plain text"), json!("plain text"));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut map = HeaderMap::new();
        map.append("vary", HeaderValue::from_static("accept"));
        map.append("vary", HeaderValue::from_static("origin"));
        assert_eq!(collect_headers(&map)["vary"], "accept, origin");
    }

    #[tokio::test]
    async fn dispatches_into_router() {
        let router = Router::new().route(
            "/items/{id}",
            get(|Path(id): Path<u64>| async move { Json(json!({"id": id})) }),
        );
        let dispatcher = RouterDispatcher::new(router, &HeaderMap::new(), 1024);

        let response = dispatcher
            .dispatch(&op("get", "/items/7", json!({}), &[]))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"id": 7}));
        assert_eq!(response.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn unroutable_path_is_a_404_not_an_error() {
        let dispatcher = RouterDispatcher::new(Router::new(), &HeaderMap::new(), 1024);
        let response = dispatcher
            .dispatch(&op("get", "/nowhere", json!({}), &[]))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn malformed_request_is_a_400() {
        let dispatcher = RouterDispatcher::new(Router::new(), &HeaderMap::new(), 1024);
        let response = dispatcher
            .dispatch(&op("get", "/a", json!({}), &[("bad header", "v")]))
            .await
            .unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, json!({"error": {"message": "invalid header \"bad header\""}}));
    }
}
