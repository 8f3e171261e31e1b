//! Paginated fetching.
//!
//! Drives a [`MarketSource`] until a whole sub-range has been read:
//!
//! - **Listings** (category, brand) are requested in fixed windows of
//!   `page_size` rows. The loop stops once `offset + page_size >= total`,
//!   so a listing of 12,000 rows with 5,000-row pages takes three requests
//!   at offsets 0, 5,000 and 10,000. A `max_pages` cap stops a server that
//!   keeps reporting a larger total.
//! - **Item batches** are requested `batch_size` SKUs at a time.
//! - **Item sales** are one request per SKU and range.
//!
//! Requests run strictly one after another.

use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::models::{
    DateRange, FetchRequest, ListingKind, ListingQuery, PageWindow, ResultTable, Scalar, Sku,
};
use crate::normalize::{collapse_photos, records_to_table, stamp_date, tidy_brand_rows};
use crate::source::MarketSource;

/// Paging limits and pacing.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub page_size: u64,
    pub max_pages: usize,
    pub batch_size: usize,
    /// Sleep before every listing request.
    pub request_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: 5000,
            max_pages: 500,
            batch_size: 200,
            request_delay: Duration::from_secs(1),
        }
    }
}

impl From<&ApiConfig> for FetchOptions {
    fn from(api: &ApiConfig) -> Self {
        Self {
            page_size: api.page_size,
            max_pages: api.max_pages,
            batch_size: api.batch_size,
            request_delay: api.request_delay(),
        }
    }
}

/// Read every page of a listing for one sub-range.
///
/// Rows keep page order. Listing rows are stamped with the sub-range end
/// date; brand rows are additionally tidied (see
/// [`tidy_brand_rows`](crate::normalize::tidy_brand_rows)).
pub async fn fetch_listing(
    source: &dyn MarketSource,
    kind: ListingKind,
    path: &str,
    range: &DateRange,
    query: &ListingQuery,
    options: &FetchOptions,
) -> Result<ResultTable, FetchError> {
    let mut rows = Vec::new();
    let mut offset = 0u64;
    let mut pages = 0usize;
    let mut total = 0u64;

    loop {
        if pages >= options.max_pages {
            return Err(FetchError::PageLimit { pages, total });
        }
        if !options.request_delay.is_zero() {
            tokio::time::sleep(options.request_delay).await;
        }

        let request = FetchRequest {
            kind,
            path: path.to_string(),
            range: *range,
            window: PageWindow {
                offset,
                limit: options.page_size,
            },
            query: query.clone(),
        };
        let page = source.listing_page(&request).await?;
        pages += 1;
        total = page.total;
        tracing::debug!(
            kind = kind.endpoint(),
            %range,
            offset,
            rows = page.rows.len(),
            total,
            "page received"
        );
        rows.extend(page.rows);

        if request.window.end_row() >= total {
            break;
        }
        offset += options.page_size;
    }

    let mut table = records_to_table(rows);
    stamp_date(&mut table, range.end());
    if kind == ListingKind::Brand {
        tidy_brand_rows(&mut table);
    }
    Ok(table)
}

/// Read item cards for `skus`, `batch_size` at a time.
///
/// A failing batch is logged and left out; the other batches still
/// contribute their rows in batch order.
pub async fn fetch_item_info(
    source: &dyn MarketSource,
    skus: &[Sku],
    options: &FetchOptions,
) -> ResultTable {
    let mut table = ResultTable::default();
    let batch_size = options.batch_size.max(1);

    for (n, batch) in skus.chunks(batch_size).enumerate() {
        match source.items_batch(batch).await {
            Ok(mut records) => {
                collapse_photos(&mut records);
                table.append(records_to_table(records));
            }
            Err(e) => {
                tracing::warn!(batch = n + 1, size = batch.len(), error = %e, "item batch failed");
            }
        }
    }

    table
}

/// Read the sales history of a single SKU. Rows carry a `sku` column.
pub async fn fetch_item_sales(
    source: &dyn MarketSource,
    sku: Sku,
    range: &DateRange,
) -> Result<ResultTable, FetchError> {
    let records = source.item_sales(sku, range).await?;
    let mut table = records_to_table(records);
    let sku = i64::try_from(sku)
        .map(Scalar::Int)
        .unwrap_or_else(|_| Scalar::Text(sku.to_string()));
    table.set_column("sku", sku);
    Ok(table)
}
