//! Archive writing: encode a partition, merge with any earlier archive of
//! the same partition, and persist it durably.

mod document;
mod sink;

pub use document::{
    ARCHIVE_EXTENSION, ArchiveDocument, ArchiveMetadata, archive_file_name, decode_archive,
    encode_archive,
};
pub use sink::{ArchiveSink, FsArchiveSink};

use chrono::{DateTime, Utc};

use crate::error::ArchiveError;
use crate::model::{AggregatedRecord, RawRecord};
use crate::partition::PartitionKey;

/// Outcome of a successful partition write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArchive {
    pub file_name: String,
    pub bytes_written: u64,
    /// Raw records in the persisted file, including carried-over ones.
    pub raw_in_file: usize,
    /// Raw records kept from an earlier archive of the same partition.
    pub carried_over: usize,
}

/// Encode and durably persist the archive for one partition.
///
/// If an archive for the partition already exists, its raw records are
/// carried into the new file (see [`ArchiveDocument::absorb_previous`]). A
/// corrupt existing archive fails the write instead of being replaced, and so
/// does an archive whose metadata names a different partition: sanitised file
/// names are not unique, and the file on disk is never merged across
/// partitions.
///
/// # Errors
///
/// Returns an [`ArchiveError`] if reading the previous archive, encoding, or
/// persisting fails. Nothing has been written when an error is returned.
pub fn write_partition_archive(
    sink: &dyn ArchiveSink,
    key: &PartitionKey,
    raw: &[RawRecord],
    aggregates: Vec<AggregatedRecord>,
    archived_at: DateTime<Utc>,
) -> Result<WrittenArchive, ArchiveError> {
    let file_name = archive_file_name(key);
    let mut doc = ArchiveDocument::new(key, raw.to_vec(), aggregates, archived_at);

    let carried_over = match sink.read_existing(&file_name)? {
        Some(bytes) => {
            let previous = decode_archive(&file_name, &bytes)?;
            let holds = previous.metadata.partition_key();
            if holds != *key {
                return Err(ArchiveError::NameCollision {
                    name: file_name,
                    holds: holds.to_string(),
                });
            }
            doc.absorb_previous(previous)
        }
        None => 0,
    };

    let bytes = encode_archive(&doc)?;
    let bytes_written = sink.persist(&file_name, &bytes)?;

    Ok(WrittenArchive {
        file_name,
        bytes_written,
        raw_in_file: doc.metadata.raw_count,
        carried_over,
    })
}
