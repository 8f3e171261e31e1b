//! Harvest orchestration.
//!
//! One entry operation per request kind:
//!
//! | Operation | Sub-ranges | Output |
//! |-----------|-----------|--------|
//! | [`Harvester::fetch_category_range`] | calendar months | `<last two path segments> <range>[_n].xlsx\|csv` |
//! | [`Harvester::fetch_brand_range`] | calendar weeks | `<brand> <range>[_n].xlsx\|csv` |
//! | [`Harvester::fetch_sku_info`] | none | `SKU's info.xlsx` |
//! | [`Harvester::fetch_sku_sales`] | none | `sales/<sku>_sale.xlsx` per SKU |
//! | [`Harvester::load_brand_to_db`] | calendar weeks | table `brand_<brand>` |
//!
//! Sub-ranges are fetched one after another in calendar order. A sub-range
//! whose fetch fails is logged and folded as empty; the run continues.

use anyhow::Result;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::accumulate::{Accumulator, FoldStep, Part, Thresholds};
use crate::config::Config;
use crate::fetch::{fetch_item_info, fetch_item_sales, fetch_listing, FetchOptions};
use crate::materialize::{MaterializeReport, TableMaterializer};
use crate::models::{DateRange, ListingKind, ListingQuery, ResourceKind, ResultTable, Sku};
use crate::partition::{partition, Granularity};
use crate::progress::{HarvestEvent, NoProgress, ProgressReporter};
use crate::sink::{category_entity, write_part, write_table, Destination, OutputFormat, SinkMode};
use crate::source::MarketSource;

pub const SKU_INFO_FILE: &str = "SKU's info";
pub const SALES_DIR: &str = "sales";

/// Everything a run needs besides the source and the request itself.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub fetch: FetchOptions,
    pub thresholds: Thresholds,
    pub category: ListingQuery,
    pub brand: ListingQuery,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            thresholds: Thresholds::default(),
            category: ListingQuery {
                min_sales: 10,
                sort_by: Some("revenue".to_string()),
            },
            brand: ListingQuery {
                min_sales: 1,
                sort_by: None,
            },
        }
    }
}

impl From<&Config> for HarvestSettings {
    fn from(config: &Config) -> Self {
        Self {
            fetch: FetchOptions::from(&config.api),
            thresholds: Thresholds::from(&config.output),
            category: config.api.category.query(),
            brand: config.api.brand.query(),
        }
    }
}

/// Summary of one entry operation.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Sub-ranges (or SKUs / batches) processed.
    pub sub_ranges: usize,
    pub rows: usize,
    pub empty: usize,
    pub failed: usize,
    pub files: Vec<PathBuf>,
    /// Accumulated result in [`SinkMode::Database`]; `None` otherwise or when nothing was fetched.
    pub table: Option<ResultTable>,
}

pub struct Harvester<S: MarketSource> {
    source: S,
    settings: HarvestSettings,
    progress: Box<dyn ProgressReporter>,
}

impl<S: MarketSource> Harvester<S> {
    pub fn new(source: S, settings: HarvestSettings) -> Self {
        Self {
            source,
            settings,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Category listing over `[from, to]`, one request series per calendar month.
    pub async fn fetch_category_range(
        &self,
        path: &str,
        from: NaiveDate,
        to: NaiveDate,
        out_dir: Option<&Path>,
        mode: SinkMode,
    ) -> Result<RunReport> {
        self.run_listing(
            ListingKind::Category,
            path,
            &category_entity(path),
            from,
            to,
            Granularity::Monthly,
            out_dir,
            mode,
        )
        .await
    }

    /// Brand listing over `[from, to]`, one request series per calendar week.
    pub async fn fetch_brand_range(
        &self,
        brand: &str,
        from: NaiveDate,
        to: NaiveDate,
        out_dir: Option<&Path>,
        mode: SinkMode,
    ) -> Result<RunReport> {
        self.run_listing(
            ListingKind::Brand,
            brand,
            brand,
            from,
            to,
            Granularity::Weekly,
            out_dir,
            mode,
        )
        .await
    }

    /// Fetch a brand range and merge it into the `brand_<brand>` table.
    ///
    /// Returns `None` for the materialize report when no rows were fetched.
    pub async fn load_brand_to_db(
        &self,
        materializer: &TableMaterializer,
        brand: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(RunReport, Option<MaterializeReport>)> {
        let mut run = self
            .fetch_brand_range(brand, from, to, None, SinkMode::Database)
            .await?;
        let materialized = match run.table.take() {
            Some(table) => Some(materializer.upsert(&brand_table(brand), &table).await?),
            None => None,
        };
        Ok((run, materialized))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_listing(
        &self,
        kind: ListingKind,
        path: &str,
        entity: &str,
        from: NaiveDate,
        to: NaiveDate,
        granularity: Granularity,
        out_dir: Option<&Path>,
        mode: SinkMode,
    ) -> Result<RunReport> {
        let ranges = partition(from, to, granularity);
        let mut report = RunReport::default();
        let Some(whole) = DateRange::new(from, to) else {
            tracing::warn!(%from, %to, "start date is after end date; nothing to fetch");
            return Ok(report);
        };

        let dest = Destination::new(out_dir.map(Path::to_path_buf), entity, whole.label());
        let thresholds = match mode {
            SinkMode::Database => self.settings.thresholds.without_flush(),
            _ => self.settings.thresholds,
        };
        let query = match kind {
            ListingKind::Category => &self.settings.category,
            ListingKind::Brand => &self.settings.brand,
        };
        let resource = kind.resource().as_str();
        let total = ranges.len() as u64;
        let mut acc = Accumulator::new(thresholds);

        tracing::info!(resource, path, range = %whole, sub_ranges = total, "harvest started");

        for (i, range) in ranges.iter().enumerate() {
            let n = i as u64 + 1;
            report.sub_ranges += 1;

            let (table, failed) = match fetch_listing(
                &self.source,
                kind,
                path,
                range,
                query,
                &self.settings.fetch,
            )
            .await
            {
                Ok(table) => (table, false),
                Err(e) => {
                    tracing::warn!(resource, %range, error = %e, "sub-range failed; treated as empty");
                    report.failed += 1;
                    self.progress.report(HarvestEvent::Failed {
                        resource: resource.to_string(),
                        n,
                        total,
                        label: range.label(),
                    });
                    (ResultTable::default(), true)
                }
            };

            if table.is_empty() {
                report.empty += 1;
                tracing::info!(resource, %range, "sub-range returned no rows");
            }
            report.rows += table.len();
            if !failed {
                self.progress.report(HarvestEvent::SubRange {
                    resource: resource.to_string(),
                    n,
                    total,
                    label: range.label(),
                    rows: table.len() as u64,
                });
            }

            match mode {
                SinkMode::SeparateFiles => {
                    if table.is_empty() {
                        continue;
                    }
                    let mut table = table;
                    table.dedup_columns_keep_last();
                    let format = format_for(table.len(), &thresholds);
                    let path = dest.relabel(range.label()).path(None, format);
                    write_table(&path, &table, format)?;
                    report.files.push(path);
                }
                SinkMode::Accumulate | SinkMode::Database => {
                    if let FoldStep::Flushed(part) = acc.fold(table) {
                        self.write_flushed(&dest, &part, &mut report)?;
                    }
                }
            }
        }

        match mode {
            SinkMode::SeparateFiles => {}
            SinkMode::Accumulate => {
                if let Some(part) = acc.finish() {
                    let path = write_part(&dest, &part)?;
                    report.files.push(path);
                }
            }
            SinkMode::Database => report.table = acc.finish().map(|part| part.table),
        }

        tracing::info!(
            resource,
            rows = report.rows,
            empty = report.empty,
            failed = report.failed,
            files = report.files.len(),
            "harvest finished"
        );
        Ok(report)
    }

    fn write_flushed(&self, dest: &Destination, part: &Part, report: &mut RunReport) -> Result<()> {
        let path = write_part(dest, part)?;
        self.progress.report(HarvestEvent::Flushed {
            part: part.index.unwrap_or(0) as u64,
            rows: part.table.len() as u64,
        });
        report.files.push(path);
        Ok(())
    }

    /// Current item cards for `skus`, fetched in batches.
    ///
    /// Writes `SKU's info.<ext>` into `out_dir` unless `mode` is
    /// [`SinkMode::Database`], in which case the table is returned instead.
    pub async fn fetch_sku_info(
        &self,
        skus: &[Sku],
        out_dir: Option<&Path>,
        mode: SinkMode,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();
        let batch_size = self.settings.fetch.batch_size.max(1);
        report.sub_ranges = skus.len().div_ceil(batch_size);

        let mut table = fetch_item_info(&self.source, skus, &self.settings.fetch).await;
        table.dedup_columns_keep_last();
        report.rows = table.len();
        self.progress.report(HarvestEvent::Item {
            resource: ResourceKind::ItemBatch.as_str().to_string(),
            n: report.sub_ranges as u64,
            total: report.sub_ranges as u64,
        });

        if table.is_empty() {
            report.empty = 1;
            tracing::warn!(skus = skus.len(), "no item cards returned");
            return Ok(report);
        }

        if mode == SinkMode::Database {
            report.table = Some(table);
            return Ok(report);
        }

        let format = format_for(table.len(), &self.settings.thresholds);
        let path = join_out(out_dir, &format!("{}.{}", SKU_INFO_FILE, format.extension()));
        write_table(&path, &table, format)?;
        report.files.push(path);
        Ok(report)
    }

    /// Daily sales of each SKU over `[from, to]`.
    ///
    /// Writes `sales/<sku>_sale.<ext>` per SKU unless `mode` is
    /// [`SinkMode::Database`], in which case all SKUs are concatenated into
    /// the returned table. A SKU whose request fails is logged and skipped.
    pub async fn fetch_sku_sales(
        &self,
        skus: &[Sku],
        from: NaiveDate,
        to: NaiveDate,
        out_dir: Option<&Path>,
        mode: SinkMode,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();
        let Some(range) = DateRange::new(from, to) else {
            tracing::warn!(%from, %to, "start date is after end date; nothing to fetch");
            return Ok(report);
        };
        let sales_dir = join_out(out_dir, SALES_DIR);
        let mut combined = ResultTable::default();
        let total = skus.len() as u64;

        for (i, &sku) in skus.iter().enumerate() {
            report.sub_ranges += 1;
            let table = match fetch_item_sales(&self.source, sku, &range).await {
                Ok(table) => table,
                Err(e) => {
                    tracing::warn!(sku, error = %e, "sales request failed; skipped");
                    report.failed += 1;
                    continue;
                }
            };
            self.progress.report(HarvestEvent::Item {
                resource: ResourceKind::ItemSales.as_str().to_string(),
                n: i as u64 + 1,
                total,
            });

            if table.is_empty() {
                report.empty += 1;
                continue;
            }
            report.rows += table.len();

            if mode == SinkMode::Database {
                combined.append(table);
                continue;
            }
            let format = format_for(table.len(), &self.settings.thresholds);
            let path = sales_dir.join(format!("{}_sale.{}", sku, format.extension()));
            write_table(&path, &table, format)?;
            report.files.push(path);
        }

        if mode == SinkMode::Database && !combined.is_empty() {
            report.table = Some(combined);
        }
        Ok(report)
    }
}

/// Table name a brand is materialized into.
pub fn brand_table(brand: &str) -> String {
    format!("brand_{}", brand)
}

fn format_for(rows: usize, thresholds: &Thresholds) -> OutputFormat {
    if rows > thresholds.spreadsheet_max_rows {
        OutputFormat::Csv
    } else {
        OutputFormat::Spreadsheet
    }
}

fn join_out(out_dir: Option<&Path>, name: &str) -> PathBuf {
    match out_dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
