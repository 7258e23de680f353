//! `larder stale`: read-only preview of what the next run would archive.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use larder_core::cutoff::cutoff_from;
use larder_core::error::ErrorCode;
use larder_core::locate::{footprint, locate_stale};
use larder_core::model::{Provider, ProviderSelection};
use larder_core::partition::group_into_partitions;
use larder_core::store::{HotStore, SqliteHotStore};

use crate::cmd::{fail, load_config};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct StaleArgs {
    /// Full months of raw data to keep. Defaults to [archive].months_to_keep.
    #[arg(long)]
    pub months: Option<u32>,

    /// Provider to inspect: bork, eitje, or all.
    #[arg(long, default_value = "all")]
    pub provider: ProviderSelection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StaleReport {
    months_to_keep: u32,
    cutoff_date: DateTime<Utc>,
    providers: Vec<StaleSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StaleSummary {
    provider: Provider,
    records: usize,
    partitions: Vec<String>,
    bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    oldest: Option<DateTime<Utc>>,
}

/// Execute `larder stale`.
///
/// # Errors
///
/// Returns an error if the config or store cannot be opened, or a stale
/// query fails.
pub fn run_stale(
    args: &StaleArgs,
    config_path: Option<&Path>,
    output: OutputMode,
    working_dir: &Path,
) -> Result<()> {
    let config = load_config(config_path, working_dir, output)?;
    let store = match SqliteHotStore::open_read_only(&config.store.path) {
        Ok(store) => store,
        Err(err) => {
            fail(output, ErrorCode::StoreUnavailable, &format!("{err:#}"))?;
            return Err(err);
        }
    };

    let months_to_keep = args.months.unwrap_or(config.archive.months_to_keep);
    let cutoff = cutoff_from(Utc::now(), months_to_keep);

    let mut providers = Vec::new();
    for &provider in args.provider.providers() {
        match summarize(&store, provider, cutoff) {
            Ok(summary) => providers.push(summary),
            Err(err) => {
                fail(output, ErrorCode::StaleQueryFailed, &format!("{err:#}"))?;
                return Err(err);
            }
        }
    }

    let report = StaleReport {
        months_to_keep,
        cutoff_date: cutoff,
        providers,
    };
    render_mode(output, &report, render_text, render_pretty)
}

fn summarize(store: &dyn HotStore, provider: Provider, cutoff: DateTime<Utc>) -> Result<StaleSummary> {
    let stale = locate_stale(store, provider, cutoff)?;
    let records = stale.len();
    let bytes = footprint(&stale);
    let oldest = stale.iter().map(|r| r.timestamp).min();
    let partitions = group_into_partitions(stale)
        .into_keys()
        .map(|key| key.to_string())
        .collect();

    Ok(StaleSummary {
        provider,
        records,
        partitions,
        bytes,
        oldest,
    })
}

fn render_text(report: &StaleReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "cutoff={}", report.cutoff_date.to_rfc3339())?;
    for summary in &report.providers {
        writeln!(
            w,
            "provider={} records={} partitions={} bytes={}",
            summary.provider,
            summary.records,
            summary.partitions.len(),
            summary.bytes
        )?;
    }
    Ok(())
}

fn render_pretty(report: &StaleReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Stale records")?;
    pretty_kv(w, "Cutoff", report.cutoff_date.format("%Y-%m-%d %H:%M UTC").to_string())?;
    pretty_kv(w, "Months kept", report.months_to_keep.to_string())?;

    for summary in &report.providers {
        writeln!(w)?;
        pretty_section(w, summary.provider.as_str())?;
        if summary.records == 0 {
            writeln!(w, "Nothing to archive")?;
            continue;
        }
        pretty_kv(w, "Records", summary.records.to_string())?;
        pretty_kv(w, "Bytes", summary.bytes.to_string())?;
        if let Some(oldest) = summary.oldest {
            pretty_kv(w, "Oldest", oldest.format("%Y-%m-%d").to_string())?;
        }
        for key in &summary.partitions {
            writeln!(w, "  - {key}")?;
        }
    }
    Ok(())
}
