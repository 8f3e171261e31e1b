//! # Market Harvest CLI (`harvest`)
//!
//! Thin command-line adapter over the [`market_harvest::pipeline`] entry
//! operations.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest category <PATH>` | Category listing, month by month |
//! | `harvest brand <NAME>` | Brand listing, week by week (optionally into SQLite) |
//! | `harvest sku <SKU\|FILE>` | Item cards and/or daily sales for one SKU or a list file |
//!
//! Dates accept `YYYY-MM-DD` or `dd.mm.yyyy`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use market_harvest::config::{self, Config};
use market_harvest::db;
use market_harvest::logging::{init_tracing, DEFAULT_FILTER};
use market_harvest::materialize::{MaterializeReport, TableMaterializer};
use market_harvest::pipeline::{brand_table, HarvestSettings, Harvester, RunReport};
use market_harvest::progress::ProgressMode;
use market_harvest::sink::SinkMode;
use market_harvest::sku_list;
use market_harvest::source::HttpSource;

const SKU_OUTPUT_DIR: &str = "SKU_list";
const SKU_INFO_TABLE: &str = "sku_info";
const SKU_SALES_TABLE: &str = "sku_sales";

/// Market Harvest: bulk export of marketplace analytics.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Date-partitioned bulk export of marketplace analytics to xlsx, CSV, and SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Override `[api].marketplace`.
    #[arg(long, global = true, value_parser = ["wb", "oz"])]
    marketplace: Option<String>,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Args)]
struct RangeArgs {
    /// First day of the range.
    #[arg(long, value_parser = parse_date)]
    from: NaiveDate,

    /// Last day of the range (inclusive).
    #[arg(long, value_parser = parse_date)]
    to: NaiveDate,

    /// Directory for output files. Overrides `[output].dir`.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a category listing, one request series per calendar month.
    Category {
        /// Category path, e.g. `Home/Kitchen/Pans`.
        path: String,

        #[command(flatten)]
        range: RangeArgs,

        /// Write one file per month instead of one combined file.
        #[arg(long)]
        separate_files: bool,
    },

    /// Export a brand listing, one request series per calendar week.
    Brand {
        /// Brand name.
        name: String,

        #[command(flatten)]
        range: RangeArgs,

        /// Write one file per week instead of one combined file.
        #[arg(long)]
        separate_files: bool,

        /// Merge the result into the `brand_<name>` table instead of writing files.
        #[arg(long, conflicts_with = "separate_files")]
        to_db: bool,
    },

    /// Export item cards and/or daily sales for SKUs.
    ///
    /// Without `--info` or `--sales` both are exported.
    Sku {
        /// A single SKU, or a `.csv`/`.xlsx` file with a `sku` column.
        target: String,

        #[command(flatten)]
        range: RangeArgs,

        /// Export current item cards (`SKU's info`).
        #[arg(long)]
        info: bool,

        /// Export daily sales per SKU (`sales/<sku>_sale`).
        #[arg(long)]
        sales: bool,

        /// Merge into the `sku_info` / `sku_sales` tables instead of writing files.
        #[arg(long)]
        to_db: bool,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .map_err(|_| format!("invalid date '{}': expected YYYY-MM-DD or dd.mm.yyyy", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(DEFAULT_FILTER)?;

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(mp) = cli.marketplace {
        cfg.api.marketplace = mp;
    }

    let token = config::read_credential(&cfg.api.token_file).context("Failed to load API token")?;
    let source = HttpSource::new(&cfg.api, token);
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);
    let harvester =
        Harvester::new(source, HarvestSettings::from(&cfg)).with_progress(progress.reporter());

    match cli.command {
        Commands::Category {
            path,
            range,
            separate_files,
        } => {
            let out = out_dir(&cfg, range.out.as_deref());
            let mode = if separate_files {
                SinkMode::SeparateFiles
            } else {
                SinkMode::Accumulate
            };
            let report = harvester
                .fetch_category_range(&path, range.from, range.to, out.as_deref(), mode)
                .await?;
            println!("category {}", path);
            print_run(&report);
        }
        Commands::Brand {
            name,
            range,
            separate_files,
            to_db,
        } => {
            if to_db {
                let materializer = open_materializer(&cfg).await?;
                let (report, loaded) = harvester
                    .load_brand_to_db(&materializer, &name, range.from, range.to)
                    .await?;
                println!("brand {}", name);
                print_run(&report);
                match loaded {
                    Some(loaded) => print_materialized(&loaded),
                    None => println!("  table: {} (nothing to load)", brand_table(&name)),
                }
            } else {
                let out = out_dir(&cfg, range.out.as_deref());
                let mode = if separate_files {
                    SinkMode::SeparateFiles
                } else {
                    SinkMode::Accumulate
                };
                let report = harvester
                    .fetch_brand_range(&name, range.from, range.to, out.as_deref(), mode)
                    .await?;
                println!("brand {}", name);
                print_run(&report);
            }
        }
        Commands::Sku {
            target,
            range,
            info,
            sales,
            to_db,
        } => {
            let skus = sku_list::resolve(&target)?;
            let (info, sales) = if info || sales { (info, sales) } else { (true, true) };
            let out = out_dir(&cfg, range.out.as_deref())
                .map(|dir| dir.join(SKU_OUTPUT_DIR))
                .unwrap_or_else(|| PathBuf::from(SKU_OUTPUT_DIR));
            let mode = if to_db {
                SinkMode::Database
            } else {
                SinkMode::Accumulate
            };
            let materializer = if to_db {
                Some(open_materializer(&cfg).await?)
            } else {
                None
            };

            println!("sku {} ({} SKUs)", target, skus.len());
            if info {
                let mut report = harvester.fetch_sku_info(&skus, Some(out.as_path()), mode).await?;
                println!("info");
                print_run(&report);
                if let (Some(m), Some(table)) = (&materializer, report.table.take()) {
                    print_materialized(&m.upsert(SKU_INFO_TABLE, &table).await?);
                }
            }
            if sales {
                let mut report = harvester
                    .fetch_sku_sales(&skus, range.from, range.to, Some(out.as_path()), mode)
                    .await?;
                println!("sales");
                print_run(&report);
                if let (Some(m), Some(table)) = (&materializer, report.table.take()) {
                    print_materialized(&m.upsert(SKU_SALES_TABLE, &table).await?);
                }
            }
        }
    }

    println!("ok");
    Ok(())
}

fn out_dir(cfg: &Config, flag: Option<&Path>) -> Option<PathBuf> {
    flag.map(Path::to_path_buf).or_else(|| cfg.output.dir.clone())
}

async fn open_materializer(cfg: &Config) -> Result<TableMaterializer> {
    let db_cfg = cfg
        .db
        .as_ref()
        .context("--to-db requires a [db] section in the config file")?;
    let pool = db::connect(db_cfg).await?;
    Ok(TableMaterializer::new(pool, db_cfg.sample_rows))
}

fn print_run(report: &RunReport) {
    println!("  sub-ranges: {}", report.sub_ranges);
    println!("  rows: {}", report.rows);
    println!("  empty: {}", report.empty);
    println!("  failed: {}", report.failed);
    for file in &report.files {
        println!("  file: {}", file.display());
    }
}

fn print_materialized(report: &MaterializeReport) {
    println!("  table: {}{}", report.table, if report.created { " (created)" } else { "" });
    println!("  inserted: {}", report.inserted);
    println!("  updated: {}", report.updated);
    if !report.new_columns.is_empty() {
        println!("  skipped columns: {}", report.new_columns.join(", "));
    }
    println!("  row errors: {}", report.errors.len());
    for err in &report.errors {
        println!("    {}: {}", err.key, err.error);
    }
}
