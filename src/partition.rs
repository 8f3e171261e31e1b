//! Date range partitioning.
//!
//! Splits a requested `[start, end]` window into calendar-aligned
//! sub-ranges so that each API call stays inside the marketplace's
//! time-window limits. Categories are fetched month by month, brands
//! week by week (Monday to Sunday).

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::DateRange;

/// Sub-range alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Monthly,
    Weekly,
}

/// Split `[start, end]` into contiguous, non-overlapping, ascending ranges.
///
/// Interior ranges are whole calendar months (or Monday–Sunday weeks); the
/// first range starts at `start` and the last is truncated to `end`.
/// Returns an empty vector when `start > end`.
pub fn partition(start: NaiveDate, end: NaiveDate, granularity: Granularity) -> Vec<DateRange> {
    let mut ranges = Vec::new();
    let mut cursor = start;

    while cursor <= end {
        let boundary = match granularity {
            Granularity::Monthly => last_day_of_month(cursor),
            Granularity::Weekly => end_of_week(cursor),
        }
        .unwrap_or(end);
        let stop = boundary.min(end);

        // cursor <= stop holds here, so the range is always valid
        if let Some(range) = DateRange::new(cursor, stop) {
            ranges.push(range);
        }

        match stop.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    ranges
}

fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}

fn end_of_week(date: NaiveDate) -> Option<NaiveDate> {
    let remaining = 6 - i64::from(date.weekday().num_days_from_monday());
    date.checked_add_signed(Duration::days(remaining))
}
