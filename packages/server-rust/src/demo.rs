//! In-memory demo application that batches can be dispatched into.
//!
//! Serves a small `items` resource, an echo route, and a route that panics,
//! which together cover the interesting outcome shapes of a batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ItemInput {
    pub name: String,
    pub owner_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ItemFilter {
    pub name: Option<String>,
}

/// Shared store behind the demo routes. Ids start at 1.
#[derive(Debug)]
pub struct ItemStore {
    items: DashMap<u64, Item>,
    next_id: AtomicU64,
}

impl ItemStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, input: ItemInput) -> Item {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item = Item {
            id,
            name: input.name,
            owner_id: input.owner_id,
        };
        self.items.insert(id, item.clone());
        item
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<Item> {
        self.items.get(&id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn list(&self, name: Option<&str>) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|item| name.is_none_or(|name| item.name == name))
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }

    pub fn update(&self, id: u64, input: ItemInput) -> Option<Item> {
        let mut entry = self.items.get_mut(&id)?;
        entry.name = input.name;
        entry.owner_id = input.owner_id;
        Some(entry.value().clone())
    }

    pub fn remove(&self, id: u64) -> Option<Item> {
        self.items.remove(&id).map(|(_, item)| item)
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the demo router over a fresh store.
#[must_use]
pub fn demo_app() -> Router {
    demo_app_with_store(Arc::new(ItemStore::new()))
}

/// Builds the demo router over `store`.
pub fn demo_app_with_store(store: Arc<ItemStore>) -> Router {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(show_item).put(update_item).delete(delete_item),
        )
        .route("/echo", any(echo))
        .route("/panic", get(panic_route))
        .with_state(store)
}

fn not_found(id: u64) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("item {id} not found") })),
    )
        .into_response()
}

async fn list_items(
    State(store): State<Arc<ItemStore>>,
    Query(filter): Query<ItemFilter>,
) -> Json<Vec<Item>> {
    Json(store.list(filter.name.as_deref()))
}

async fn create_item(
    State(store): State<Arc<ItemStore>>,
    Json(input): Json<ItemInput>,
) -> (StatusCode, Json<Item>) {
    (StatusCode::CREATED, Json(store.insert(input)))
}

async fn show_item(State(store): State<Arc<ItemStore>>, Path(id): Path<u64>) -> Response {
    match store.get(id) {
        Some(item) => Json(item).into_response(),
        None => not_found(id),
    }
}

async fn update_item(
    State(store): State<Arc<ItemStore>>,
    Path(id): Path<u64>,
    Json(input): Json<ItemInput>,
) -> Response {
    match store.update(id, input) {
        Some(item) => Json(item).into_response(),
        None => not_found(id),
    }
}

async fn delete_item(State(store): State<Arc<ItemStore>>, Path(id): Path<u64>) -> Response {
    match store.remove(id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(id),
    }
}

/// Reflects the request back so callers can see what a sub-request carried.
async fn echo(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), Value::from(value)))
        })
        .collect();
    let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": query,
        "headers": headers,
        "body": body,
    }))
}

#[allow(clippy::unused_async)]
async fn panic_route() -> &'static str {
    panic!("demo route panicked")
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn store_assigns_sequential_ids() {
        let store = ItemStore::new();
        let first = store.insert(ItemInput {
            name: "a".into(),
            owner_id: None,
        });
        let second = store.insert(ItemInput {
            name: "b".into(),
            owner_id: Some(first.id),
        });
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(store.list(Some("b")).len(), 1);
        assert_eq!(store.list(None).len(), 2);
    }

    #[test]
    fn default_store_matches_new() {
        let store = ItemStore::default();
        let item = store.insert(ItemInput {
            name: "a".into(),
            owner_id: None,
        });
        assert_eq!(item.id, 1);
    }

    #[tokio::test]
    async fn item_lifecycle() {
        let store = Arc::new(ItemStore::new());
        let app = demo_app_with_store(Arc::clone(&store));

        let (status, created) =
            call(app.clone(), json_request("POST", "/items", &json!({ "name": "lamp" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created, json!({ "id": 1, "name": "lamp" }));

        let (status, updated) = call(
            app.clone(),
            json_request("PUT", "/items/1", &json!({ "name": "desk", "owner_id": 9 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["owner_id"], 9);

        let (status, _) = call(
            app.clone(),
            Request::delete("/items/1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, missing) =
            call(app, Request::get("/items/1").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["error"], "item 1 not found");
        assert!(store.get(1).is_none());
    }

    #[tokio::test]
    async fn echo_reflects_request() {
        let request = Request::post("/echo?page=2")
            .header("x-trace", "abc")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap();

        let (status, body) = call(demo_app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "POST");
        assert_eq!(body["path"], "/echo");
        assert_eq!(body["query"]["page"], "2");
        assert_eq!(body["headers"]["x-trace"], "abc");
        assert_eq!(body["body"], json!({ "a": 1 }));
    }
}
