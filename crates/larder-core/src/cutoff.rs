//! Retention window arithmetic.

use chrono::{DateTime, Months, Utc};

/// Default retention window in months.
pub const DEFAULT_MONTHS_TO_KEEP: u32 = 1;

/// Compute the archival cutoff: `now` minus `months_to_keep` calendar months.
///
/// Days past the end of a shorter target month clamp to its last day, so
/// `2026-03-31` minus one month is `2026-02-28`. Zero months returns `now`.
#[must_use]
pub fn cutoff_from(now: DateTime<Utc>, months_to_keep: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months_to_keep))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
