//! Core data models used throughout the harvester.
//!
//! These types represent the date ranges, requests, and tables that flow
//! through the fetch → accumulate → sink pipeline.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

/// Inclusive calendar date range. Always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if start > end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// `dd.mm.yyyy-dd.mm.yyyy`, used in output file names.
    pub fn label(&self) -> String {
        format!("{}-{}", display_date(self.start), display_date(self.end))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Date format used in file names and the `date` column.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Marketplace SKU (article number).
pub type Sku = u64;

/// The four marketplace resources the harvester knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Category,
    Brand,
    ItemBatch,
    ItemSales,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Category => "category",
            ResourceKind::Brand => "brand",
            ResourceKind::ItemBatch => "item-batch",
            ResourceKind::ItemSales => "item-sales",
        }
    }
}

/// Paginated listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Category,
    Brand,
}

impl ListingKind {
    pub fn resource(&self) -> ResourceKind {
        match self {
            ListingKind::Category => ResourceKind::Category,
            ListingKind::Brand => ResourceKind::Brand,
        }
    }

    /// Path segment below `<marketplace>/get/`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ListingKind::Category => "category",
            ListingKind::Brand => "brand",
        }
    }
}

/// Row window of one page: `startRow = offset`, `endRow = offset + limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

impl PageWindow {
    pub fn end_row(&self) -> u64 {
        self.offset + self.limit
    }
}

/// Filter and sort model sent with listing requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub min_sales: i64,
    pub sort_by: Option<String>,
}

/// One listing page request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub kind: ListingKind,
    pub path: String,
    pub range: DateRange,
    pub window: PageWindow,
    pub query: ListingQuery,
}

/// One page of a listing response.
#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Vec<serde_json::Value>,
    pub total: u64,
}

/// A dynamically typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Text form used for CSV fields and row keys. Null renders empty.
    pub fn render(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

/// An ordered table of scalar rows.
///
/// Column names may repeat until [`ResultTable::dedup_columns_keep_last`]
/// is applied; every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from ordered key/value records. Columns appear in order
    /// of first sighting; a key repeated inside one record keeps its last value.
    pub fn from_records(records: Vec<Vec<(String, Scalar)>>) -> Self {
        let mut table = ResultTable::default();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in records {
            let mut row = vec![Scalar::Null; table.columns.len()];
            for (name, value) in record {
                let pos = match index.get(&name) {
                    Some(&pos) => pos,
                    None => {
                        let pos = table.columns.len();
                        index.insert(name.clone(), pos);
                        table.columns.push(name);
                        for existing in &mut table.rows {
                            existing.push(Scalar::Null);
                        }
                        row.push(Scalar::Null);
                        pos
                    }
                };
                row[pos] = value;
            }
            table.rows.push(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of the last column with this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().rposition(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Scalar> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Append a row. Short rows are padded with nulls, long rows truncated.
    pub fn push_row(&mut self, mut row: Vec<Scalar>) {
        row.resize(self.columns.len(), Scalar::Null);
        self.rows.push(row);
    }

    /// Set every row's value for `name`, adding the column if missing.
    pub fn set_column(&mut self, name: &str, value: Scalar) {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Rename every column called `from`.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        for column in &mut self.columns {
            if column == from {
                *column = to.to_string();
            }
        }
    }

    /// Remove every column for which `drop` returns true.
    pub fn drop_columns<F: Fn(&str) -> bool>(&mut self, drop: F) {
        let keep: Vec<bool> = self.columns.iter().map(|c| !drop(c)).collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        self.retain_positions(&keep);
    }

    /// Collapse repeated column names, keeping the last occurrence.
    pub fn dedup_columns_keep_last(&mut self) {
        let keep: Vec<bool> = (0..self.columns.len())
            .map(|i| !self.columns[i + 1..].contains(&self.columns[i]))
            .collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        self.retain_positions(&keep);
    }

    fn retain_positions(&mut self, keep: &[bool]) {
        self.columns = self
            .columns
            .drain(..)
            .zip(keep)
            .filter_map(|(c, k)| k.then_some(c))
            .collect();
        for row in &mut self.rows {
            *row = row
                .drain(..)
                .zip(keep)
                .filter_map(|(v, k)| k.then_some(v))
                .collect();
        }
    }

    /// Append `other`'s rows, aligning cells by column name.
    ///
    /// Columns unknown to `self` are added at the end and back-filled with
    /// nulls; columns `other` lacks are null in its rows. Expects `self` to
    /// have unique column names; a repeated name in `other` resolves to the
    /// last occurrence.
    pub fn append(&mut self, other: ResultTable) {
        let mut mapping = Vec::with_capacity(other.columns.len());
        for name in &other.columns {
            let pos = match self.columns.iter().position(|c| c == name) {
                Some(pos) => pos,
                None => {
                    self.columns.push(name.clone());
                    for row in &mut self.rows {
                        row.push(Scalar::Null);
                    }
                    self.columns.len() - 1
                }
            };
            mapping.push(pos);
        }

        let width = self.columns.len();
        self.rows.reserve(other.rows.len());
        for source in other.rows {
            let mut row = vec![Scalar::Null; width];
            for (value, &pos) in source.into_iter().zip(&mapping) {
                row[pos] = value;
            }
            self.rows.push(row);
        }
    }
}
