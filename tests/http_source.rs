mod support;

use chrono::NaiveDate;
use std::time::Duration;
use tempfile::TempDir;

use market_harvest::config::ApiConfig;
use market_harvest::error::FetchError;
use market_harvest::fetch::FetchOptions;
use market_harvest::materialize::TableMaterializer;
use market_harvest::models::{DateRange, FetchRequest, ListingKind, ListingQuery, PageWindow};
use market_harvest::pipeline::{HarvestSettings, Harvester};
use market_harvest::sink::SinkMode;
use market_harvest::source::{HttpSource, MarketSource};

use support::{FakeApi, TOKEN, TOKEN_HEADER};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn api_config(base_url: &str) -> ApiConfig {
    let cfg: market_harvest::config::Config = toml::from_str(&format!(
        "[api]\nbase_url = \"{}\"\nrequest_delay_ms = 0\n",
        base_url
    ))
    .unwrap();
    cfg.api
}

fn settings() -> HarvestSettings {
    HarvestSettings {
        fetch: FetchOptions {
            request_delay: Duration::ZERO,
            ..FetchOptions::default()
        },
        ..HarvestSettings::default()
    }
}

fn request(path: &str) -> FetchRequest {
    FetchRequest {
        kind: ListingKind::Category,
        path: path.to_string(),
        range: DateRange::new(d(2023, 3, 1), d(2023, 3, 31)).unwrap(),
        window: PageWindow {
            offset: 0,
            limit: 5000,
        },
        query: ListingQuery {
            min_sales: 10,
            sort_by: Some("revenue".into()),
        },
    }
}

#[tokio::test]
async fn listing_page_reports_total_and_rows() {
    let api = FakeApi::new(7, 0);
    let base = api.clone().spawn().await;
    let source = HttpSource::new(&api_config(&base), TOKEN.to_string());

    let page = source.listing_page(&request("Pets/Dogs")).await.unwrap();
    assert_eq!(page.total, 7);
    assert_eq!(page.rows.len(), 7);
    assert_eq!(api.recorded("category")[0].query.get("path").unwrap(), "Pets/Dogs");
}

#[tokio::test]
async fn wrong_token_maps_to_status_error() {
    let api = FakeApi::new(7, 0);
    let base = api.clone().spawn().await;
    let source = HttpSource::with_root(
        format!("{}/wb/", base),
        TOKEN_HEADER.to_string(),
        "wrong".to_string(),
    );

    let err = source.listing_page(&request("Pets")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 401, .. }), "{:?}", err);
}

#[tokio::test]
async fn server_error_maps_to_status_error() {
    let api = FakeApi::new(7, 0);
    let base = api.clone().spawn().await;
    let source = HttpSource::new(&api_config(&base), TOKEN.to_string());

    let err = source.listing_page(&request("Broken")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 500, .. }), "{:?}", err);
}

#[tokio::test]
async fn item_sales_sends_date_bounds() {
    let api = FakeApi::new(0, 0);
    let base = api.clone().spawn().await;
    let source = HttpSource::new(&api_config(&base), TOKEN.to_string());

    let range = DateRange::new(d(2023, 3, 1), d(2023, 3, 7)).unwrap();
    let rows = source.item_sales(51450143, &range).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["data"], "2023-03-01");
    assert_eq!(rows[1]["data"], "2023-03-07");
}

#[tokio::test]
async fn category_months_over_http_accumulate_in_order() {
    let api = FakeApi::new(3, 0);
    let base = api.clone().spawn().await;
    let source = HttpSource::new(&api_config(&base), TOKEN.to_string());
    let harvester = Harvester::new(source, settings());

    let report = harvester
        .fetch_category_range("Toys", d(2023, 1, 20), d(2023, 3, 5), None, SinkMode::Database)
        .await
        .unwrap();
    assert_eq!(report.sub_ranges, 3);
    let table = report.table.unwrap();
    assert_eq!(table.len(), 9);

    let months: Vec<(String, String)> = api
        .recorded("category")
        .iter()
        .map(|r| (r.query["d1"].clone(), r.query["d2"].clone()))
        .collect();
    assert_eq!(
        months,
        vec![
            ("2023-01-20".to_string(), "2023-01-31".to_string()),
            ("2023-02-01".to_string(), "2023-02-28".to_string()),
            ("2023-03-01".to_string(), "2023-03-05".to_string()),
        ]
    );
}

#[tokio::test]
async fn brand_reload_appends_rows_with_fresh_ids() {
    let api = FakeApi::new(0, 2);
    let base = api.clone().spawn().await;
    let source = HttpSource::new(&api_config(&base), TOKEN.to_string());
    let harvester = Harvester::new(source, settings());

    let tmp = TempDir::new().unwrap();
    let url = format!("sqlite:{}", tmp.path().join("brands.sqlite").display());
    let pool = market_harvest::db::connect_url(&url).await.unwrap();
    let materializer = TableMaterializer::new(pool, 1000);

    let (_, first) = harvester
        .load_brand_to_db(&materializer, "ACME", d(2023, 3, 6), d(2023, 3, 12))
        .await
        .unwrap();
    let first = first.unwrap();
    assert!(first.created);
    assert_eq!(first.inserted, 2);

    let (_, second) = harvester
        .load_brand_to_db(&materializer, "ACME", d(2023, 3, 6), d(2023, 3, 12))
        .await
        .unwrap();
    let second = second.unwrap();
    assert!(!second.created);
    assert_eq!(second.inserted, 2);
    assert!(second.new_columns.is_empty());

    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM \"brand_ACME\" ORDER BY id")
        .fetch_all(materializer.pool())
        .await
        .unwrap();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}
