//! `larder archive`: the archival trigger.
//!
//! Resolves config, opens the hot store, takes the archive-directory lock,
//! and runs the pipeline. Partition and provider failures are part of the
//! report and do not change the exit status; only failures before any
//! provider work (config, store, lock) exit non-zero.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::warn;

use larder_core::archive::FsArchiveSink;
use larder_core::config::resolve_config;
use larder_core::error::ErrorCode;
use larder_core::lock::ArchiveLock;
use larder_core::model::ProviderSelection;
use larder_core::store::SqliteHotStore;
use larder_core::{ArchiveStats, RunReport, RunRequest};

use crate::cmd::fail;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Full months of raw data to keep. Defaults to [archive].months_to_keep
    /// in larder.toml, or 1 when not configured.
    #[arg(long)]
    pub months: Option<u32>,

    /// Locate and group stale records without writing or deleting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Provider to archive: bork, eitje, or all.
    #[arg(long, default_value = "all")]
    pub provider: ProviderSelection,
}

#[derive(Debug, Serialize)]
struct FailedRun {
    success: bool,
    error: String,
    stats: Vec<ArchiveStats>,
}

/// Execute `larder archive`.
///
/// # Errors
///
/// Returns an error for top-level failures: config, store open, or lock.
pub fn run_archive(
    args: &ArchiveArgs,
    config_path: Option<&Path>,
    output: OutputMode,
    working_dir: &Path,
) -> Result<()> {
    let config = match resolve_config(config_path, working_dir) {
        Ok(config) => config,
        Err(err) => return top_level_failure(output, ErrorCode::ConfigParseError, err),
    };

    // A dry run must leave the store file as found: no pragmas, no migrations.
    let opened = if args.dry_run {
        SqliteHotStore::open_read_only(&config.store.path)
    } else {
        SqliteHotStore::open_existing(&config.store.path)
    };
    let store = match opened {
        Ok(store) => store,
        Err(err) => return top_level_failure(output, ErrorCode::StoreUnavailable, err),
    };

    // A dry run writes nothing, so it never contends for the lock.
    let lock = if args.dry_run {
        None
    } else {
        match ArchiveLock::acquire(&config.archive.dir, config.archive.lock_timeout()) {
            Ok(lock) => Some(lock),
            Err(err) => {
                let code = err.code();
                return top_level_failure(output, code, err.into());
            }
        }
    };

    let request = RunRequest {
        months_to_keep: args.months.unwrap_or(config.archive.months_to_keep),
        dry_run: args.dry_run,
        provider: args.provider,
    };
    let sink = FsArchiveSink::new(&config.archive.dir);
    let now = Utc::now();
    let report = larder_core::run_archive(&store, &sink, &request, now);

    if !request.dry_run
        && let Err(err) = store.record_run(now)
    {
        warn!(error = %format!("{err:#}"), "failed to record run timestamp");
    }
    if let Some(lock) = lock {
        lock.release();
    }

    render_mode(output, &report, render_text, render_pretty)
}

fn top_level_failure(output: OutputMode, code: ErrorCode, err: anyhow::Error) -> Result<()> {
    let message = format!("{err:#}");
    if output.is_json() {
        let body = FailedRun {
            success: false,
            error: format!("{code}: {message}"),
            stats: Vec::new(),
        };
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &body)?;
        writeln!(out)?;
    } else {
        fail(output, code, &message)?;
    }
    Err(err)
}

fn render_text(report: &RunReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "success={}", report.success)?;
    writeln!(w, "dry_run={}", report.dry_run)?;
    writeln!(w, "months_to_keep={}", report.months_to_keep)?;
    writeln!(w, "cutoff={}", report.cutoff_date.to_rfc3339())?;
    for stats in &report.stats {
        writeln!(
            w,
            "provider={} found={} partitions={} archived={} deleted={} size_before={} size_after={} files={} errors={}",
            stats.provider,
            stats.records_found,
            stats.partitions,
            stats.records_archived,
            stats.records_deleted,
            stats.total_size_before,
            stats.total_size_after,
            stats.archive_files.len(),
            stats.errors.len(),
        )?;
        for error in &stats.errors {
            writeln!(
                w,
                "error provider={} partition={} message={}",
                stats.provider, error.partition_key, error.message
            )?;
        }
    }
    writeln!(w, "space_freed_mb={:.2}", report.total_space_freed_mb)?;
    writeln!(w, "message={}", report.message)
}

fn render_pretty(report: &RunReport, w: &mut dyn Write) -> std::io::Result<()> {
    let heading = if report.dry_run {
        "Archive run (dry run)"
    } else {
        "Archive run"
    };
    pretty_section(w, heading)?;
    pretty_kv(w, "Cutoff", report.cutoff_date.format("%Y-%m-%d %H:%M UTC").to_string())?;
    pretty_kv(w, "Months kept", report.months_to_keep.to_string())?;
    pretty_kv(w, "Space freed", format!("{:.2} MB", report.total_space_freed_mb))?;
    pretty_kv(w, "Errors", report.error_count().to_string())?;

    for stats in &report.stats {
        writeln!(w)?;
        pretty_section(w, stats.provider.as_str())?;
        pretty_kv(
            w,
            "Found",
            format!("{} records in {} partitions", stats.records_found, stats.partitions),
        )?;
        pretty_kv(w, "Archived", stats.records_archived.to_string())?;
        pretty_kv(w, "Deleted", stats.records_deleted.to_string())?;
        pretty_kv(
            w,
            "Size",
            format!("{} -> {} bytes", stats.total_size_before, stats.total_size_after),
        )?;
        for file in &stats.archive_files {
            writeln!(w, "  + {file}")?;
        }
        for error in &stats.errors {
            writeln!(w, "  ! {}: {}", error.partition_key, error.message)?;
        }
    }

    writeln!(w)?;
    writeln!(w, "{}", report.message)
}
