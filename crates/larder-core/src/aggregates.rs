//! Aggregate window lookup for a partition.

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::model::AggregatedRecord;
use crate::partition::PartitionKey;
use crate::store::HotStore;

/// Inclusive `[start, end]` bounds of a calendar month in UTC.
///
/// `end` is the last microsecond before the following month starts. Returns
/// `None` for a month outside `1..=12` or a year chrono cannot represent.
#[must_use]
pub fn month_window(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    let next = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).single()?;
    Some((start, next - Duration::microseconds(1)))
}

/// Fetch the aggregates covering the same location and month as `key`.
///
/// The result may be empty. The aggregates are read, never modified.
///
/// # Errors
///
/// Returns an error if the month is not representable or the store query
/// fails.
pub fn fetch_aggregate_window(
    store: &dyn HotStore,
    key: &PartitionKey,
) -> Result<Vec<AggregatedRecord>> {
    let (start, end) = month_window(key.year, key.month)
        .ok_or_else(|| anyhow::anyhow!("invalid partition month {}-{}", key.year, key.month))?;
    store.find_aggregates(key.provider, &key.location, start, end)
}
