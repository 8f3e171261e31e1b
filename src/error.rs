//! Typed errors raised by the library layers.
//!
//! Application flow (CLI, pipeline orchestration) uses `anyhow`; these enums
//! exist where callers need to branch on the failure kind: the pipeline
//! tolerates a [`FetchError`] for one sub-range, the materializer records a
//! [`CoerceError`] per row, and the CLI reports an [`InputError`] verbatim.

use thiserror::Error;

/// Failure of a single outbound marketplace call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("marketplace API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("pagination did not finish after {pages} pages (server total {total})")]
    PageLimit { pages: usize, total: u64 },
}

/// Problems with user-supplied input files.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("unsupported input format: '{0}' (expected .csv or .xlsx)")]
    UnsupportedFormat(String),

    #[error("input file has no 'sku' column: {0}")]
    MissingSkuColumn(String),

    #[error("invalid SKU '{value}' in {source_name}")]
    InvalidSku { value: String, source_name: String },
}

/// A value that cannot be stored in a column of the target type.
#[derive(Debug, Error)]
#[error("cannot store {value} in {column} ({target})")]
pub struct CoerceError {
    pub column: String,
    pub value: String,
    pub target: &'static str,
}

/// Spreadsheet encode/decode failure.
#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip container: {0}")]
    Zip(String),

    #[error("xml: {0}")]
    Xml(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
