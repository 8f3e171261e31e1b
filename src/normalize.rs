//! JSON → table normalization.
//!
//! Marketplace responses are arrays of nested JSON objects. Each object is
//! flattened into one row: nested object keys are joined with `.`, arrays
//! are kept as their JSON text, booleans become `0`/`1`.

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::{display_date, ResultTable, Scalar};

/// Columns the brand endpoint returns that only hold chart series.
const BRAND_GRAPH_COLUMNS: &[&str] = &[
    "category_graph",
    "graph",
    "stocks_graph",
    "product_visibility_graph",
    "price_graph",
];

/// Flatten a list of JSON records into a table.
pub fn records_to_table(records: Vec<Value>) -> ResultTable {
    let rows = records
        .into_iter()
        .map(|record| {
            let mut out = Vec::new();
            match record {
                Value::Object(_) => flatten_into("", record, &mut out),
                other => out.push(("value".to_string(), leaf(other))),
            }
            out
        })
        .collect();
    ResultTable::from_records(rows)
}

/// Accept either an array of records or a single record.
pub fn into_records(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn flatten_into(prefix: &str, value: Value, out: &mut Vec<(String, Scalar)>) {
    match value {
        Value::Object(map) => {
            if map.is_empty() && !prefix.is_empty() {
                out.push((prefix.to_string(), Scalar::Null));
            }
            for (key, nested) in map {
                let name = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&name, nested, out);
            }
        }
        other => out.push((prefix.to_string(), leaf(other))),
    }
}

fn leaf(value: Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Int(i64::from(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Scalar::Int(i),
            None => n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
        },
        Value::String(s) => Scalar::Text(s),
        other => Scalar::Text(other.to_string()),
    }
}

/// Stamp every row with the sub-range end date (`dd.mm.yyyy`).
pub fn stamp_date(table: &mut ResultTable, end: NaiveDate) {
    table.set_column("date", Scalar::Text(display_date(end)));
}

/// Brand rows: `id` becomes `sku`, chart and grouping columns are removed.
pub fn tidy_brand_rows(table: &mut ResultTable) {
    table.rename_column("id", "sku");
    table.drop_columns(|name| BRAND_GRAPH_COLUMNS.contains(&name) || name.contains("group"));
}

/// Item-batch records: replace the `photos` array by the first photo's URL.
pub fn collapse_photos(records: &mut [Value]) {
    for record in records.iter_mut() {
        let Some(obj) = record.as_object_mut() else {
            continue;
        };
        if let Some(photos) = obj.get("photos") {
            let first = photos
                .as_array()
                .and_then(|list| list.first())
                .and_then(|photo| photo.get("f"))
                .cloned()
                .unwrap_or(Value::Null);
            obj.insert("photos".to_string(), first);
        }
    }
}
