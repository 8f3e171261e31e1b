//! In-process fake of the marketplace analytics API.
//!
//! Listing totals depend on the `path` query parameter:
//! `Empty` → 0 rows, `Broken` → HTTP 500, anything else → the configured total.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const TOKEN: &str = "test-token";
pub const TOKEN_HEADER: &str = "X-Mpstats-TOKEN";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub endpoint: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Clone)]
pub struct FakeApi {
    pub category_total: u64,
    pub brand_total: u64,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeApi {
    pub fn new(category_total: u64, brand_total: u64) -> Self {
        Self {
            category_total,
            brand_total,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recorded(&self, endpoint: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    fn record(&self, endpoint: &str, query: HashMap<String, String>, body: Value) {
        self.requests.lock().unwrap().push(Recorded {
            endpoint: endpoint.to_string(),
            query,
            body,
        });
    }

    /// Bind to an ephemeral port and serve in the background.
    /// Returns the API base URL (without marketplace segment).
    pub async fn spawn(self) -> String {
        let app = Router::new()
            .route("/api/wb/get/category", post(category))
            .route("/api/wb/get/brand", post(brand))
            .route("/api/wb/get/items/batch", post(items_batch))
            .route("/api/wb/get/item/{sku}/sales", get(item_sales))
            .with_state(self);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == TOKEN)
        .unwrap_or(false)
}

fn listing_page(total: u64, body: &Value, make: impl Fn(u64) -> Value) -> Value {
    let start = body["startRow"].as_u64().unwrap_or(0);
    let end = body["endRow"].as_u64().unwrap_or(0).min(total);
    let data: Vec<Value> = (start..end).map(make).collect();
    json!({ "data": data, "total": total })
}

fn listing_total(query: &HashMap<String, String>, configured: u64) -> Option<u64> {
    match query.get("path").map(String::as_str) {
        Some("Empty") => Some(0),
        Some("Broken") => None,
        _ => Some(configured),
    }
}

async fn category(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    api.record("category", query.clone(), body.clone());
    let Some(total) = listing_total(&query, api.category_total) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    };
    Json(listing_page(total, &body, |i| {
        json!({
            "id": i,
            "name": format!("item {}", i),
            "revenue": (i as f64) * 1.5,
            "seller": { "name": "Seller" }
        })
    }))
    .into_response()
}

async fn brand(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    api.record("brand", query.clone(), body.clone());
    let Some(total) = listing_total(&query, api.brand_total) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    };
    Json(listing_page(total, &body, |i| {
        json!({
            "id": 1000 + i,
            "name": format!("brand item {}", i),
            "sales": i * 3,
            "graph": [1, 2, 3],
            "price_graph": [4],
            "subject_group": "misc"
        })
    }))
    .into_response()
}

async fn items_batch(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    api.record("items/batch", HashMap::new(), body.clone());
    let ids: Vec<u64> = body["ids"]
        .as_array()
        .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    let items: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "name": format!("card {}", id),
                "photos": [{ "f": format!("//img/{}/1.jpg", id) }, { "f": "//img/other.jpg" }]
            })
        })
        .collect();
    Json(Value::Array(items)).into_response()
}

async fn item_sales(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Path(sku): Path<u64>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    api.record("item/sales", query.clone(), json!({ "sku": sku }));
    Json(json!([
        { "data": query.get("d1").cloned().unwrap_or_default(), "sales": 1, "balance": 10 },
        { "data": query.get("d2").cloned().unwrap_or_default(), "sales": 2, "balance": 8 }
    ]))
    .into_response()
}
