//! Hot-store pruning of archived raw records.

use anyhow::{Context, Result};
use tracing::warn;

use crate::model::{Provider, RecordId};
use crate::store::HotStore;

/// Delete exactly `ids` from the provider's raw table.
///
/// Must only be called once the archive holding these records has been
/// persisted. Returns the number of rows actually deleted; a short delete
/// (rows removed concurrently) is logged but not reconciled.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn prune_partition(store: &dyn HotStore, provider: Provider, ids: &[RecordId]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let deleted = store
        .delete_raw(provider, ids)
        .with_context(|| format!("delete {} archived {provider} records", ids.len()))?;

    if deleted != ids.len() {
        warn!(
            %provider,
            requested = ids.len(),
            deleted,
            "short delete: some archived records were already gone"
        );
    }
    Ok(deleted)
}
