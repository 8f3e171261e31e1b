use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ListingQuery;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub db: Option<DbConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_marketplace")]
    pub marketplace: String,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_token_header")]
    pub token_header: String,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_category_listing")]
    pub category: ListingConfig,
    #[serde(default = "default_brand_listing")]
    pub brand: ListingConfig,
}

fn default_base_url() -> String {
    "https://mpstats.io/api/".to_string()
}
fn default_marketplace() -> String {
    "wb".to_string()
}
fn default_token_file() -> PathBuf {
    PathBuf::from("token.txt")
}
fn default_token_header() -> String {
    "X-Mpstats-TOKEN".to_string()
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_page_size() -> u64 {
    5000
}
fn default_max_pages() -> usize {
    500
}
fn default_batch_size() -> usize {
    200
}

/// Filter/sort settings for one listing endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct ListingConfig {
    pub min_sales: i64,
    #[serde(default)]
    pub sort_by: Option<String>,
}

fn default_category_listing() -> ListingConfig {
    ListingConfig {
        min_sales: 10,
        sort_by: Some("revenue".to_string()),
    }
}
fn default_brand_listing() -> ListingConfig {
    ListingConfig {
        min_sales: 1,
        sort_by: None,
    }
}

impl ListingConfig {
    pub fn query(&self) -> ListingQuery {
        ListingQuery {
            min_sales: self.min_sales,
            sort_by: self.sort_by.clone(),
        }
    }
}

impl ApiConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_spreadsheet_max_rows")]
    pub spreadsheet_max_rows: usize,
    #[serde(default = "default_flush_rows")]
    pub flush_rows: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            spreadsheet_max_rows: default_spreadsheet_max_rows(),
            flush_rows: default_flush_rows(),
        }
    }
}

fn default_spreadsheet_max_rows() -> usize {
    250_000
}
fn default_flush_rows() -> usize {
    1_000_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_credential_file")]
    pub credential_file: PathBuf,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

fn default_credential_file() -> PathBuf {
    PathBuf::from("database.txt")
}
fn default_sample_rows() -> usize {
    1000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate api
    match config.api.marketplace.as_str() {
        "wb" | "oz" => {}
        other => anyhow::bail!(
            "Unknown marketplace: '{}'. Must be wb or oz.",
            other
        ),
    }
    if config.api.page_size == 0 {
        anyhow::bail!("api.page_size must be > 0");
    }
    if config.api.max_pages == 0 {
        anyhow::bail!("api.max_pages must be > 0");
    }
    if !(1..=200).contains(&config.api.batch_size) {
        anyhow::bail!("api.batch_size must be in [1, 200]");
    }

    // Validate output
    if config.output.flush_rows <= config.output.spreadsheet_max_rows {
        anyhow::bail!("output.flush_rows must be greater than output.spreadsheet_max_rows");
    }

    // Validate db
    if let Some(db) = &config.db {
        if db.sample_rows == 0 {
            anyhow::bail!("db.sample_rows must be > 0");
        }
    }

    Ok(())
}

/// Read a single-line credential (API token, connection string).
pub fn read_credential(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credential file: {}", path.display()))?;
    let value = content.lines().next().unwrap_or("").trim().to_string();
    if value.is_empty() {
        anyhow::bail!("credential file is empty: {}", path.display());
    }
    Ok(value)
}
