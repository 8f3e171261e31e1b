//! Marketplace API access.
//!
//! [`MarketSource`] is the seam between the pagination/accumulation logic
//! and the wire. [`HttpSource`] talks to the real HTTP API; tests plug in
//! in-memory sources to observe exactly which windows are requested.
//!
//! # Endpoints
//!
//! | Method | Path | Body / query |
//! |--------|------|--------------|
//! | `POST` | `<mp>/get/category` | `?d1&d2&path`, `{startRow, endRow, filterModel, sortModel}` |
//! | `POST` | `<mp>/get/brand` | `?d1&d2&path`, `{startRow, endRow, filterModel}` |
//! | `POST` | `<mp>/get/items/batch` | `{ids: [...]}` |
//! | `GET`  | `<mp>/get/item/<sku>/sales` | `?d1&d2` |
//!
//! Every request carries the API token header read once at startup.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::models::{DateRange, FetchRequest, ListingQuery, Page, Sku};
use crate::normalize::into_records;

#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch one window of a paginated category/brand listing.
    async fn listing_page(&self, request: &FetchRequest) -> Result<Page, FetchError>;

    /// Fetch current item cards for up to 200 SKUs.
    async fn items_batch(&self, skus: &[Sku]) -> Result<Vec<Value>, FetchError>;

    /// Fetch the daily sales of one SKU over `range`.
    async fn item_sales(&self, sku: Sku, range: &DateRange) -> Result<Vec<Value>, FetchError>;
}

/// HTTP implementation of [`MarketSource`].
pub struct HttpSource {
    client: reqwest::Client,
    /// `<base_url>/<marketplace>/`
    root: String,
    token_header: String,
    token: String,
}

impl HttpSource {
    pub fn new(api: &ApiConfig, token: String) -> Self {
        Self::with_root(
            format!(
                "{}/{}/",
                api.base_url.trim_end_matches('/'),
                api.marketplace
            ),
            api.token_header.clone(),
            token,
        )
    }

    pub fn with_root(root: String, token_header: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            root,
            token_header,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}get/{}", self.root, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, FetchError> {
        let response = request
            .header(self.token_header.as_str(), self.token.as_str())
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), url = %response.url(), "marketplace response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Request body of a listing window.
pub fn listing_body(request: &FetchRequest) -> Value {
    let mut body = json!({
        "startRow": request.window.offset,
        "endRow": request.window.end_row(),
        "filterModel": filter_model(&request.query),
    });
    if let Some(sort) = &request.query.sort_by {
        body["sortModel"] = json!([{ "colId": sort, "sort": "desc" }]);
    }
    body
}

fn filter_model(query: &ListingQuery) -> Value {
    json!({
        "sales": {
            "filterType": "number",
            "type": "greaterThanOrEqual",
            "filter": query.min_sales,
            "filterTo": null,
        }
    })
}

/// Split a listing response into its rows and the server-side total.
pub fn parse_page(value: Value) -> Result<Page, FetchError> {
    let Value::Object(mut obj) = value else {
        return Err(FetchError::Decode("listing response is not an object".into()));
    };
    let total = obj
        .get("total")
        .and_then(Value::as_u64)
        .ok_or_else(|| FetchError::Decode("listing response has no numeric 'total'".into()))?;
    let rows = match obj.remove("data") {
        Some(Value::Array(rows)) => rows,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(FetchError::Decode("'data' is not an array".into())),
    };
    Ok(Page { rows, total })
}

fn date_params(range: &DateRange) -> [(&'static str, String); 2] {
    [
        ("d1", range.start().format("%Y-%m-%d").to_string()),
        ("d2", range.end().format("%Y-%m-%d").to_string()),
    ]
}

#[async_trait]
impl MarketSource for HttpSource {
    async fn listing_page(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        let [d1, d2] = date_params(&request.range);
        let http = self
            .client
            .post(self.url(request.kind.endpoint()))
            .query(&[d1, d2, ("path", request.path.clone())])
            .json(&listing_body(request));
        parse_page(self.send(http).await?)
    }

    async fn items_batch(&self, skus: &[Sku]) -> Result<Vec<Value>, FetchError> {
        let http = self
            .client
            .post(self.url("items/batch"))
            .json(&json!({ "ids": skus }));
        Ok(into_records(self.send(http).await?))
    }

    async fn item_sales(&self, sku: Sku, range: &DateRange) -> Result<Vec<Value>, FetchError> {
        let http = self
            .client
            .get(self.url(&format!("item/{}/sales", sku)))
            .query(&date_params(range));
        Ok(into_records(self.send(http).await?))
    }
}
