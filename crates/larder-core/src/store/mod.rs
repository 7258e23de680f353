//! Hot-store access for the archiver.
//!
//! The pipeline talks to the hot store only through [`HotStore`], which
//! exposes the three operations it needs: locate stale raw records, read an
//! aggregate window, and delete raw records by id. [`SqliteHotStore`] is the
//! production implementation.
//!
//! Runtime defaults follow the usual projection-database settings:
//! - `journal_mode = WAL` so dashboard readers are not blocked by a prune
//! - `busy_timeout = 5s` to ride out short write contention from ingestion

pub mod migrations;
pub mod schema;
mod sqlite;

pub use sqlite::SqliteHotStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::model::{AggregatedRecord, Provider, RawRecord, RecordId};

/// Busy timeout used for hot-store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The operations the archival pipeline performs against the hot store.
pub trait HotStore {
    /// Raw records of `provider` with `timestamp < cutoff`, ordered by
    /// timestamp then id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn find_stale(&self, provider: Provider, cutoff: DateTime<Utc>) -> Result<Vec<RawRecord>>;

    /// Aggregates of `provider` for `location` whose date lies in
    /// `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn find_aggregates(
        &self,
        provider: Provider,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregatedRecord>>;

    /// Delete the raw records with the given ids and return how many rows
    /// were actually removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails; no rows are removed in that case.
    fn delete_raw(&self, provider: Provider, ids: &[RecordId]) -> Result<usize>;
}
