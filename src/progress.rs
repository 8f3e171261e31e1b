//! Harvest progress reporting.
//!
//! Reports observable progress while sub-ranges, batches and SKUs are
//! fetched so users see how much is left. Progress is emitted on **stderr**
//! so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum HarvestEvent {
    /// Sub-range `n` of `total` finished with `rows` rows.
    SubRange {
        resource: String,
        n: u64,
        total: u64,
        label: String,
        rows: u64,
    },
    /// Sub-range `n` of `total` failed; it is treated as empty.
    Failed {
        resource: String,
        n: u64,
        total: u64,
        label: String,
    },
    /// The running result was written out as part `part`.
    Flushed { part: u64, rows: u64 },
    /// Item `n` of `total` (SKU batches, per-SKU sales) done.
    Item {
        resource: String,
        n: u64,
        total: u64,
    },
}

/// Reports harvest progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: HarvestEvent);
}

/// Human-friendly progress on stderr: "category  #3/12 done  01.03.2023-31.03.2023  12,000 rows".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: HarvestEvent) {
        let line = match &event {
            HarvestEvent::SubRange {
                resource,
                n,
                total,
                label,
                rows,
            } => format!(
                "{}  #{}/{} done  {}  {} rows\n",
                resource,
                n,
                total,
                label,
                format_number(*rows)
            ),
            HarvestEvent::Failed {
                resource,
                n,
                total,
                label,
            } => format!("{}  #{}/{} failed  {}\n", resource, n, total, label),
            HarvestEvent::Flushed { part, rows } => {
                format!("wrote part {}  {} rows\n", part, format_number(*rows))
            }
            HarvestEvent::Item { resource, n, total } => {
                format!("{}  {} / {}\n", resource, format_number(*n), format_number(*total))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: HarvestEvent) {
        let obj = match &event {
            HarvestEvent::SubRange {
                resource,
                n,
                total,
                label,
                rows,
            } => serde_json::json!({
                "event": "sub_range",
                "resource": resource,
                "n": n,
                "total": total,
                "range": label,
                "rows": rows
            }),
            HarvestEvent::Failed {
                resource,
                n,
                total,
                label,
            } => serde_json::json!({
                "event": "sub_range_failed",
                "resource": resource,
                "n": n,
                "total": total,
                "range": label
            }),
            HarvestEvent::Flushed { part, rows } => serde_json::json!({
                "event": "flushed",
                "part": part,
                "rows": rows
            }),
            HarvestEvent::Item { resource, n, total } => serde_json::json!({
                "event": "item",
                "resource": resource,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: HarvestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
