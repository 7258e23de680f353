//! Archive file format: compact JSON wrapped in a maximum-level gzip stream.
//!
//! ```text
//! {provider}-[{endpoint}-]{location}-{YYYY}-{MM}.json.gz
//!   └─ gzip(best) ─ {"metadata":{...},"rawData":[...],"aggregatedData":[...]}
//! ```
//!
//! The JSON is never pretty-printed: indentation costs more bytes after
//! compression than it saves in readability for a cold file.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;
use crate::model::{AggregatedRecord, Provider, RawRecord, RecordId};
use crate::partition::PartitionKey;

/// Extension shared by every archive file.
pub const ARCHIVE_EXTENSION: &str = "json.gz";

/// Partition identity and counts stored at the head of every archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub location: String,
    pub year: i32,
    pub month: u32,
    pub archived_at: DateTime<Utc>,
    pub raw_count: usize,
    pub aggregate_count: usize,
}

impl ArchiveMetadata {
    /// The partition this archive was written for.
    #[must_use]
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey {
            provider: self.provider,
            endpoint: self.endpoint.clone(),
            location: self.location.clone(),
            year: self.year,
            month: self.month,
        }
    }
}

/// Self-contained snapshot of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDocument {
    pub metadata: ArchiveMetadata,
    pub raw_data: Vec<RawRecord>,
    pub aggregated_data: Vec<AggregatedRecord>,
}

impl ArchiveDocument {
    #[must_use]
    pub fn new(
        key: &PartitionKey,
        raw_data: Vec<RawRecord>,
        aggregated_data: Vec<AggregatedRecord>,
        archived_at: DateTime<Utc>,
    ) -> Self {
        Self {
            metadata: ArchiveMetadata {
                provider: key.provider,
                endpoint: key.endpoint.clone(),
                location: key.location.clone(),
                year: key.year,
                month: key.month,
                archived_at,
                raw_count: raw_data.len(),
                aggregate_count: aggregated_data.len(),
            },
            raw_data,
            aggregated_data,
        }
    }

    /// Fold raw records from an earlier archive of the same partition into
    /// this one.
    ///
    /// Records are matched by id and the fresh copy wins. Records only present
    /// in `previous` are kept, so a partition rewritten after a partial prune
    /// never loses what was archived and deleted before. Aggregates are not
    /// merged: the fresh window replaces the old one.
    ///
    /// Returns how many records were carried over from `previous`.
    pub fn absorb_previous(&mut self, previous: Self) -> usize {
        let mut by_id: BTreeMap<RecordId, RawRecord> = previous
            .raw_data
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        for record in &self.raw_data {
            by_id.remove(&record.id);
        }
        let carried = by_id.len();

        self.raw_data.extend(by_id.into_values());
        self.raw_data
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        self.metadata.raw_count = self.raw_data.len();
        carried
    }
}

/// Deterministic archive file name for a partition.
#[must_use]
pub fn archive_file_name(key: &PartitionKey) -> String {
    let mut name = String::from(key.provider.as_str());
    name.push('-');
    if let Some(endpoint) = &key.endpoint {
        name.push_str(&file_safe(endpoint));
        name.push('-');
    }
    name.push_str(&file_safe(&key.location));
    name.push_str(&format!("-{:04}-{:02}.{ARCHIVE_EXTENSION}", key.year, key.month));
    name
}

fn file_safe(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Serialize `doc` to compact JSON and gzip it at the best compression level.
///
/// # Errors
///
/// Returns [`ArchiveError::Serialize`] or [`ArchiveError::Io`] on failure.
pub fn encode_archive(doc: &ArchiveDocument) -> Result<Vec<u8>, ArchiveError> {
    let json = serde_json::to_vec(doc)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::best());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decode an archive produced by [`encode_archive`].
///
/// # Errors
///
/// Returns [`ArchiveError::Corrupt`] if the bytes are not a valid gzip stream
/// of an archive document.
pub fn decode_archive(name: &str, bytes: &[u8]) -> Result<ArchiveDocument, ArchiveError> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|err| ArchiveError::Corrupt {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
    serde_json::from_slice(&json).map_err(|err| ArchiveError::Corrupt {
        name: name.to_string(),
        reason: err.to_string(),
    })
}
