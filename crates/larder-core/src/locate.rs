//! Stale-record location.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::model::{Provider, RawRecord};
use crate::store::HotStore;

/// All raw records of `provider` strictly older than `cutoff`.
///
/// The full set is loaded into memory; there is no paging, so the size of
/// one provider's backlog bounds a single run.
///
/// # Errors
///
/// Returns an error if the hot store cannot be queried.
pub fn locate_stale(
    store: &dyn HotStore,
    provider: Provider,
    cutoff: DateTime<Utc>,
) -> Result<Vec<RawRecord>> {
    store
        .find_stale(provider, cutoff)
        .with_context(|| format!("locate stale {provider} records before {cutoff}"))
}

/// Summed footprint of `records`, in bytes.
#[must_use]
pub fn footprint(records: &[RawRecord]) -> u64 {
    records.iter().map(RawRecord::footprint).sum()
}
