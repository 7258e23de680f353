//! Run orchestration: one sequential sub-run per provider.
//!
//! Per provider the run is linear:
//!
//! ```text
//! LOCATE → GROUP → dry run?  ── yes ─→ SIMULATE ───────────────────────┐
//!                            └─ no ──→ per partition:                  │
//!                                        FETCH_AGGREGATES              │
//!                                        → WRITE_ARCHIVE               │
//!                                        → PRUNE                       │
//!                                      ACCUMULATE → re-LOCATE ─────────┴→ FINALIZE
//! ```
//!
//! # Failure isolation
//!
//! - A partition failure is recorded in that provider's `errors` and the run
//!   moves on to the next partition.
//! - A failure before partitioning (the locator) fails only that provider;
//!   the other providers still run.
//! - Within a partition the archive is persisted before any delete is
//!   issued. A failed write therefore never loses raw data.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregates::fetch_aggregate_window;
use crate::archive::{ArchiveSink, WrittenArchive, write_partition_archive};
use crate::cutoff::{DEFAULT_MONTHS_TO_KEEP, cutoff_from};
use crate::error::{ArchiveError, ErrorCode};
use crate::locate::{footprint, locate_stale};
use crate::model::{Provider, ProviderSelection, RawRecord, RecordId};
use crate::partition::{PartitionKey, group_into_partitions};
use crate::prune::prune_partition;
use crate::store::HotStore;

/// Partition key recorded for errors that are not tied to one partition.
pub const PROVIDER_SCOPE: &str = "*";

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Parameters of one archival invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub months_to_keep: u32,
    pub dry_run: bool,
    pub provider: ProviderSelection,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            months_to_keep: DEFAULT_MONTHS_TO_KEEP,
            dry_run: false,
            provider: ProviderSelection::All,
        }
    }
}

/// A failure scoped to one partition (or to the whole provider, keyed
/// [`PROVIDER_SCOPE`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionError {
    pub partition_key: String,
    pub message: String,
}

/// Statistics for one provider sub-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStats {
    pub provider: Provider,
    pub records_found: usize,
    pub partitions: usize,
    pub records_archived: usize,
    pub records_deleted: usize,
    pub total_size_before: u64,
    pub total_size_after: u64,
    pub archive_files: Vec<String>,
    pub errors: Vec<PartitionError>,
}

impl ArchiveStats {
    #[must_use]
    pub const fn new(provider: Provider) -> Self {
        Self {
            provider,
            records_found: 0,
            partitions: 0,
            records_archived: 0,
            records_deleted: 0,
            total_size_before: 0,
            total_size_after: 0,
            archive_files: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Bytes of stale data no longer in the hot store after the run.
    #[must_use]
    pub const fn space_freed(&self) -> u64 {
        self.total_size_before.saturating_sub(self.total_size_after)
    }

    fn record_error(&mut self, partition_key: impl Into<String>, err: &ArchiveError) {
        let partition_key = partition_key.into();
        warn!(
            provider = %self.provider,
            partition = %partition_key,
            code = err.code().code(),
            error = %err,
            "archival step failed"
        );
        self.errors.push(PartitionError {
            partition_key,
            message: err.to_string(),
        });
    }
}

/// Combined result of a run over one or more providers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    pub dry_run: bool,
    pub months_to_keep: u32,
    pub cutoff_date: DateTime<Utc>,
    pub stats: Vec<ArchiveStats>,
    #[serde(rename = "totalSpaceFreedMB")]
    pub total_space_freed_mb: f64,
    pub message: String,
}

impl RunReport {
    /// Total partition and provider errors across all providers.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.stats.iter().map(|s| s.errors.len()).sum()
    }
}

/// Run the pipeline for every provider in `request`.
///
/// `now` is the reference instant for the cutoff and the `archivedAt` stamp.
/// Provider failures are folded into the report; this function itself does
/// not fail.
pub fn run_archive(
    store: &dyn HotStore,
    sink: &dyn ArchiveSink,
    request: &RunRequest,
    now: DateTime<Utc>,
) -> RunReport {
    let cutoff = cutoff_from(now, request.months_to_keep);
    info!(
        months_to_keep = request.months_to_keep,
        dry_run = request.dry_run,
        %cutoff,
        "starting archive run"
    );

    let mut stats = Vec::new();
    for &provider in request.provider.providers() {
        match run_provider(store, sink, provider, cutoff, request.dry_run, now) {
            Ok(provider_stats) => stats.push(provider_stats),
            Err(err) => {
                let mut failed = ArchiveStats::new(provider);
                failed.record_error(PROVIDER_SCOPE, &err);
                stats.push(failed);
            }
        }
    }

    let freed: u64 = stats.iter().map(ArchiveStats::space_freed).sum();
    let message = summary_message(&stats, request.dry_run);
    info!(%message, "archive run finished");

    RunReport {
        success: true,
        dry_run: request.dry_run,
        months_to_keep: request.months_to_keep,
        cutoff_date: cutoff,
        stats,
        total_space_freed_mb: to_megabytes(freed),
        message,
    }
}

/// Run the pipeline for a single provider.
///
/// # Errors
///
/// Returns an error only when the stale records cannot be located. Every
/// later failure is recorded in the returned stats.
pub fn run_provider(
    store: &dyn HotStore,
    sink: &dyn ArchiveSink,
    provider: Provider,
    cutoff: DateTime<Utc>,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<ArchiveStats, ArchiveError> {
    let stale = locate_stale(store, provider, cutoff).map_err(|err| {
        ArchiveError::store(ErrorCode::StaleQueryFailed, "locate stale records", err)
    })?;

    let mut stats = ArchiveStats::new(provider);
    stats.records_found = stale.len();
    stats.total_size_before = footprint(&stale);

    let partitions = group_into_partitions(stale);
    stats.partitions = partitions.len();
    info!(
        %provider,
        records = stats.records_found,
        partitions = stats.partitions,
        bytes = stats.total_size_before,
        "located stale records"
    );

    if dry_run {
        stats.total_size_after = stats.total_size_before;
        return Ok(stats);
    }

    for (key, records) in &partitions {
        let written = match fetch_and_write(store, sink, key, records, now) {
            Ok(written) => written,
            Err(err) => {
                stats.record_error(key.to_string(), &err);
                continue;
            }
        };

        stats.records_archived += records.len();
        stats.archive_files.push(written.file_name.clone());

        let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
        match prune_partition(store, provider, &ids) {
            Ok(deleted) => {
                stats.records_deleted += deleted;
                info!(
                    partition = %key,
                    file = %written.file_name,
                    archived = records.len(),
                    in_file = written.raw_in_file,
                    carried_over = written.carried_over,
                    deleted,
                    bytes = written.bytes_written,
                    "partition archived"
                );
            }
            Err(err) => {
                let err = ArchiveError::store(ErrorCode::PruneFailed, "prune archived records", err);
                stats.record_error(key.to_string(), &err);
            }
        }
    }

    stats.total_size_after = match locate_stale(store, provider, cutoff) {
        Ok(remaining) => footprint(&remaining),
        Err(err) => {
            let err = ArchiveError::store(ErrorCode::StaleQueryFailed, "re-measure stale records", err);
            stats.record_error(PROVIDER_SCOPE, &err);
            stats.total_size_before
        }
    };

    Ok(stats)
}

fn fetch_and_write(
    store: &dyn HotStore,
    sink: &dyn ArchiveSink,
    key: &PartitionKey,
    records: &[RawRecord],
    now: DateTime<Utc>,
) -> Result<WrittenArchive, ArchiveError> {
    let aggregates = fetch_aggregate_window(store, key).map_err(|err| {
        ArchiveError::store(ErrorCode::AggregateQueryFailed, "fetch aggregate window", err)
    })?;
    write_partition_archive(sink, key, records, aggregates, now)
}

fn summary_message(stats: &[ArchiveStats], dry_run: bool) -> String {
    let found: usize = stats.iter().map(|s| s.records_found).sum();
    let partitions: usize = stats.iter().map(|s| s.partitions).sum();
    let errors: usize = stats.iter().map(|s| s.errors.len()).sum();

    if dry_run {
        return format!(
            "Dry run: {found} stale records in {partitions} partitions would be archived; nothing was written or deleted"
        );
    }

    let archived: usize = stats.iter().map(|s| s.records_archived).sum();
    let deleted: usize = stats.iter().map(|s| s.records_deleted).sum();
    let files: usize = stats.iter().map(|s| s.archive_files.len()).sum();
    let mut message = format!(
        "Archived {archived} of {found} stale records into {files} files and deleted {deleted} from the hot store"
    );
    if errors > 0 {
        message.push_str(&format!(" ({errors} errors)"));
    }
    message
}

#[allow(clippy::cast_precision_loss)]
fn to_megabytes(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}
