//! larder-core library.
//!
//! Moves aging raw provider records out of the hot store into compressed,
//! per-partition archive files, keeping derived aggregates in place.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at the store and config layer,
//!   [`error::ArchiveError`] inside the pipeline.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod aggregates;
pub mod archive;
pub mod config;
pub mod cutoff;
pub mod error;
pub mod locate;
pub mod lock;
pub mod model;
pub mod partition;
pub mod prune;
pub mod run;
pub mod store;

pub use run::{ArchiveStats, PartitionError, RunReport, RunRequest, run_archive, run_provider};
