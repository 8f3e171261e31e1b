//! Resolving the SKU argument.
//!
//! The argument is either a single SKU or a path to a list file. A list
//! file is a `.csv` (`;`-separated, optional byte-order mark) or `.xlsx`
//! (first sheet) with a header row containing a `sku` column. Blank cells
//! are skipped; duplicates are kept in file order.

use anyhow::{Context, Result};
use std::path::Path;

use crate::error::InputError;
use crate::models::Sku;
use crate::xlsx;

/// Turn the CLI argument into a list of SKUs.
pub fn resolve(arg: &str) -> Result<Vec<Sku>> {
    let path = Path::new(arg);
    if path.is_file() {
        return read_file(path);
    }
    let sku = parse_sku(arg).ok_or_else(|| InputError::InvalidSku {
        value: arg.to_string(),
        source_name: "command line".to_string(),
    })?;
    Ok(vec![sku])
}

/// Read SKUs from a `.csv` or `.xlsx` list file.
pub fn read_file(path: &Path) -> Result<Vec<Sku>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let rows = match ext.as_str() {
        "csv" => read_csv_rows(path)?,
        "xlsx" => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            xlsx::read_first_sheet(&bytes)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        _ => return Err(InputError::UnsupportedFormat(path.display().to_string()).into()),
    };

    skus_from_rows(rows, &path.display().to_string())
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(body);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to parse {}", path.display()))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

fn skus_from_rows(rows: Vec<Vec<String>>, source_name: &str) -> Result<Vec<Sku>> {
    let mut rows = rows.into_iter();
    let header = rows.next().unwrap_or_default();
    let column = header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("sku"))
        .ok_or_else(|| InputError::MissingSkuColumn(source_name.to_string()))?;

    let mut skus = Vec::new();
    for row in rows {
        let Some(cell) = row.get(column) else {
            continue;
        };
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        let sku = parse_sku(cell).ok_or_else(|| InputError::InvalidSku {
            value: cell.to_string(),
            source_name: source_name.to_string(),
        })?;
        skus.push(sku);
    }
    Ok(skus)
}

/// Parse a SKU. Spreadsheet numbers may arrive as `123.0`.
fn parse_sku(text: &str) -> Option<Sku> {
    let text = text.trim();
    if let Ok(sku) = text.parse::<Sku>() {
        return Some(sku);
    }
    let float: f64 = text.parse().ok()?;
    if float.is_finite() && float >= 0.0 && float.fract() == 0.0 && float < u64::MAX as f64 {
        Some(float as Sku)
    } else {
        None
    }
}
