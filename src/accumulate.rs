//! Folding per-sub-range tables into one result.
//!
//! The caller owns an [`Accumulator`] and feeds it the sub-range tables in
//! the order they were fetched. The first non-empty table fixes the
//! reference column set; later tables are reconciled against it (repeated
//! columns collapse to the last occurrence, new columns go to the end,
//! missing ones become null).
//!
//! Row-count thresholds decide what the sink does with the result:
//!
//! | Accumulated rows | Effect |
//! |------------------|--------|
//! | `> spreadsheet_max_rows` | every later write uses CSV (latched) |
//! | `> flush_rows` | the running table is handed out as a numbered part and reset |
//!
//! Parts plus the final remainder always add up to every folded row.

use crate::config::OutputConfig;
use crate::models::ResultTable;
use crate::sink::OutputFormat;

/// Row-count limits that steer format selection and flushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub spreadsheet_max_rows: usize,
    /// `None` keeps everything in memory (database hand-off).
    pub flush_rows: Option<usize>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            spreadsheet_max_rows: 250_000,
            flush_rows: Some(1_000_000),
        }
    }
}

impl From<&OutputConfig> for Thresholds {
    fn from(output: &OutputConfig) -> Self {
        Self {
            spreadsheet_max_rows: output.spreadsheet_max_rows,
            flush_rows: Some(output.flush_rows),
        }
    }
}

impl Thresholds {
    pub fn without_flush(self) -> Self {
        Self {
            flush_rows: None,
            ..self
        }
    }
}

/// A table ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Split-file suffix; `None` for an unsplit result.
    pub index: Option<usize>,
    pub format: OutputFormat,
    pub table: ResultTable,
}

/// Outcome of folding one sub-range table.
#[derive(Debug)]
pub enum FoldStep {
    /// The table had no rows.
    Skipped,
    /// Rows were added; `rows` is the running total held in memory.
    Appended { rows: usize },
    /// The flush threshold was crossed; the running table was handed out.
    Flushed(Part),
}

#[derive(Debug)]
pub struct Accumulator {
    thresholds: Thresholds,
    reference: Option<Vec<String>>,
    table: Option<ResultTable>,
    format: OutputFormat,
    parts: usize,
    folded_rows: usize,
}

impl Accumulator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            reference: None,
            table: None,
            format: OutputFormat::Spreadsheet,
            parts: 0,
            folded_rows: 0,
        }
    }

    /// Columns of the first non-empty table, once seen.
    pub fn reference_columns(&self) -> Option<&[String]> {
        self.reference.as_deref()
    }

    /// Format the next write will use.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Rows folded so far, including flushed parts.
    pub fn folded_rows(&self) -> usize {
        self.folded_rows
    }

    pub fn parts_flushed(&self) -> usize {
        self.parts
    }

    pub fn fold(&mut self, mut table: ResultTable) -> FoldStep {
        if table.is_empty() {
            return FoldStep::Skipped;
        }
        table.dedup_columns_keep_last();
        self.folded_rows += table.len();

        let running = match self.table.take() {
            Some(mut running) => {
                running.append(table);
                running
            }
            None => match &self.reference {
                None => {
                    self.reference = Some(table.columns().to_vec());
                    table
                }
                Some(reference) => {
                    // Restart after a flush: keep the reference layout
                    let mut running = ResultTable::new(reference.clone());
                    running.append(table);
                    running
                }
            },
        };

        let rows = running.len();
        if rows > self.thresholds.spreadsheet_max_rows {
            self.format = OutputFormat::Csv;
        }

        match self.thresholds.flush_rows {
            Some(limit) if rows > limit => {
                self.parts += 1;
                tracing::info!(part = self.parts, rows, "flushing accumulated rows");
                FoldStep::Flushed(Part {
                    index: Some(self.parts),
                    format: self.format,
                    table: running,
                })
            }
            _ => {
                self.table = Some(running);
                FoldStep::Appended { rows }
            }
        }
    }

    /// Hand out whatever is still held. Numbered after the last flushed
    /// part when a split already happened.
    pub fn finish(self) -> Option<Part> {
        let table = self.table?;
        let index = (self.parts > 0).then_some(self.parts + 1);
        Some(Part {
            index,
            format: self.format,
            table,
        })
    }
}
