//! Writing result tables to disk.
//!
//! A [`Destination`] names the files of one run:
//! `<entity> <dd.mm.yyyy>-<dd.mm.yyyy>[_<part>].<ext>` inside the save
//! directory (or the working directory when none is configured).
//!
//! Two encodings are supported:
//!
//! - **Spreadsheet** (`.xlsx`): single sheet, header row. The default.
//! - **CSV** (`.csv`): `;`-separated, UTF-8 with a byte-order mark so
//!   spreadsheet applications detect the encoding. Used once a result
//!   outgrows what a spreadsheet comfortably holds.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::accumulate::Part;
use crate::models::ResultTable;
use crate::xlsx;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Spreadsheet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Spreadsheet => "xlsx",
            OutputFormat::Csv => "csv",
        }
    }
}

/// What the pipeline does with fetched sub-ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// Fold everything into one result (split into parts when it grows too large).
    Accumulate,
    /// One file per non-empty sub-range.
    SeparateFiles,
    /// Keep the whole result in memory for the table materializer.
    Database,
}

/// Directory, entity name and date label shared by every file of one run.
#[derive(Debug, Clone)]
pub struct Destination {
    pub dir: Option<PathBuf>,
    pub entity: String,
    pub label: String,
}

impl Destination {
    pub fn new(dir: Option<PathBuf>, entity: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            dir,
            entity: entity.into(),
            label: label.into(),
        }
    }

    /// Same directory and entity, different date label.
    pub fn relabel(&self, label: impl Into<String>) -> Self {
        Self {
            dir: self.dir.clone(),
            entity: self.entity.clone(),
            label: label.into(),
        }
    }

    pub fn file_name(&self, index: Option<usize>, format: OutputFormat) -> String {
        match index {
            Some(n) => format!("{} {}_{}.{}", self.entity, self.label, n, format.extension()),
            None => format!("{} {}.{}", self.entity, self.label, format.extension()),
        }
    }

    pub fn path(&self, index: Option<usize>, format: OutputFormat) -> PathBuf {
        let name = self.file_name(index, format);
        match &self.dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// File-name entity for a category path: the last two `/`-separated
/// segments joined by a space, or the path itself when it has no `/`.
pub fn category_entity(path: &str) -> String {
    if !path.contains('/') {
        return path.to_string();
    }
    let segments: Vec<&str> = path.split('/').collect();
    let tail = &segments[segments.len().saturating_sub(2)..];
    tail.join(" ")
}

/// Write a part to its numbered file under `dest`. Returns the path written.
pub fn write_part(dest: &Destination, part: &Part) -> Result<PathBuf> {
    let path = dest.path(part.index, part.format);
    write_table(&path, &part.table, part.format)?;
    Ok(path)
}

/// Write `table` to `path` in `format`, creating parent directories.
pub fn write_table(path: &Path, table: &ResultTable, format: OutputFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    match format {
        OutputFormat::Csv => write_csv(path, table),
        OutputFormat::Spreadsheet => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            xlsx::write_workbook(file, table)
                .with_context(|| format!("Failed to write {}", path.display()))
        }
    }?;

    tracing::info!(path = %path.display(), rows = table.len(), "wrote table");
    Ok(())
}

fn write_csv(path: &Path, table: &ResultTable) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(file);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|v| v.render()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
