//! Grouping stale records into archive partitions.
//!
//! A partition is the unit of archival work and maps to exactly one archive
//! file. Bork partitions by `(location, year, month)`; Eitje adds the API
//! endpoint in front of the location.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::model::{Provider, RawRecord};

/// Placeholder for a missing location or endpoint.
pub const UNKNOWN: &str = "unknown";

/// Structural key of one archive partition.
///
/// Field order drives the derived `Ord`, which fixes the order partitions
/// are processed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub location: String,
    pub year: i32,
    pub month: u32,
}

impl PartitionKey {
    /// Derive the partition key for one record.
    #[must_use]
    pub fn for_record(record: &RawRecord) -> Self {
        let provider = record.provider;
        let endpoint = provider
            .tables()
            .partition_by_endpoint
            .then(|| or_unknown(record.endpoint.as_deref()));

        Self {
            provider,
            endpoint,
            location: or_unknown(record.location.as_deref()),
            year: record.timestamp.year(),
            month: record.timestamp.month(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.provider)?;
        if let Some(endpoint) = &self.endpoint {
            write!(f, "{endpoint}/")?;
        }
        write!(f, "{}/{:04}-{:02}", self.location, self.year, self.month)
    }
}

/// Missing and whitespace-only values become [`UNKNOWN`]. Anything else is
/// kept verbatim: the key's location is also the aggregate lookup value, so
/// it must match what the hot store holds.
fn or_unknown(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Group `records` by partition key.
///
/// Every input record lands in exactly one partition; none are dropped.
#[must_use]
pub fn group_into_partitions(records: Vec<RawRecord>) -> BTreeMap<PartitionKey, Vec<RawRecord>> {
    let mut partitions: BTreeMap<PartitionKey, Vec<RawRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(PartitionKey::for_record(&record))
            .or_default()
            .push(record);
    }
    partitions
}
