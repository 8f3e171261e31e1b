//! # Market Harvest
//!
//! Date-partitioned bulk export of marketplace analytics.
//!
//! Market Harvest reads category, brand and SKU-level data from a paginated
//! marketplace analytics API, splits long date ranges into calendar months
//! or weeks, consolidates the per-range results and writes them to
//! spreadsheets, CSV files, or SQLite tables created from the shape of the
//! data.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Partition │──▶│   Fetch      │──▶│ Accumulate  │──▶│ Sink         │
//! │ months/wk │   │ pages/batch │   │ schema+split│   │ xlsx / csv   │
//! └───────────┘   └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                                            │
//!                                                            ▼
//!                                                     ┌──────────────┐
//!                                                     │ Materialize  │
//!                                                     │ SQLite upsert│
//!                                                     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest category "Home/Kitchen/Pans" --from 2023-01-01 --to 2023-06-30
//! harvest brand ACME --from 2023-03-01 --to 2023-03-31 --separate-files
//! harvest brand ACME --from 2023-03-01 --to 2023-03-31 --to-db
//! harvest sku skus.xlsx --from 2023-03-01 --to 2023-03-31 --info --sales
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Date ranges, requests, dynamic tables |
//! | [`partition`] | Calendar month/week sub-ranges |
//! | [`source`] | Marketplace API seam and HTTP client |
//! | [`normalize`] | JSON records → tables |
//! | [`fetch`] | Pagination and batching |
//! | [`accumulate`] | Folding sub-range tables, thresholds |
//! | [`sink`] | File naming and CSV/xlsx output |
//! | [`xlsx`] | Minimal OOXML reader/writer |
//! | [`sku_list`] | SKU argument and list files |
//! | [`schema`] | Column type inference and coercion |
//! | [`materialize`] | SQLite table creation and upsert |
//! | [`db`] | Database connection |
//! | [`pipeline`] | Entry operations per request kind |
//! | [`progress`] | Progress reporting on stderr |
//! | [`logging`] | Tracing subscriber setup |

pub mod accumulate;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod materialize;
pub mod models;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod schema;
pub mod sink;
pub mod sku_list;
pub mod source;
pub mod xlsx;
