//! Typed records, providers, and identifiers shared across the pipeline.

pub mod provider;
pub mod record;

pub use provider::{Provider, ProviderSelection, ProviderTables};
pub use record::{AggregatedRecord, RawRecord, RecordId};
