//! Bulk protection removal.
//!
//! Purges stream the live store row-at-a-time, evict the cache inline with
//! the scan, and delete in fixed-size chunks so no statement or buffer grows
//! with the world. Pending queued saves are flushed before the scan starts
//! so the read reflects every prior in-memory mutation.

use std::collections::HashSet;

use tracing::info;

use crate::cache::ProtectionCache;
use crate::config::PurgeConfig;
use crate::error::Result;
use crate::queue::SaveQueue;
use crate::store::{ProtectionFilter, SqliteStore};
use crate::types::{Flag, ProtectionId};

/// Outcome of a purge pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PurgeReport {
    /// Rows the scan visited.
    pub scanned: usize,
    /// Rows skipped because they could not be decoded.
    pub malformed: usize,
    /// Rows spared by the exemption flag or an exempt block type.
    pub exempted: usize,
    /// Rows actually deleted.
    pub removed: usize,
}

/// Remove every protection matching `filter`, sparing records that carry the
/// exemption flag or an exempt block-type id. `progress` is called with
/// (rows scanned, total rows) every `config.progress_interval` rows.
///
/// # Errors
/// Returns [`WardenError::Database`](crate::WardenError::Database) if the
/// pre-scan flush, the scan, or the chunked delete fails.
pub fn purge_matching(
    store: &mut SqliteStore,
    cache: &mut ProtectionCache,
    queue: &mut SaveQueue,
    filter: &ProtectionFilter,
    config: &PurgeConfig,
    mut progress: impl FnMut(usize, u64),
) -> Result<PurgeReport> {
    // The scan reads the live database; queued writes must land first.
    queue.flush(store)?;

    let total = store.count()?;
    let exempt_types: HashSet<i32> = config.exempt_block_ids.iter().copied().collect();
    let interval = config.progress_interval.max(1);

    let mut to_remove: Vec<ProtectionId> = Vec::new();
    let mut exempted = 0_usize;
    let mut scanned = 0_usize;

    let (visited, malformed) = store.scan(filter, |protection| {
        scanned += 1;
        if scanned % interval == 0 || scanned == 1 {
            progress(scanned, total);
        }

        if protection.has_flag(Flag::Exemption)
            || exempt_types.contains(&protection.block_type_id)
        {
            exempted += 1;
            return Ok(());
        }

        // Evict inline with the scan: no window where a removed row is
        // still served from cache.
        queue.discard(protection.id);
        cache.remove(&protection);
        to_remove.push(protection.id);
        Ok(())
    })?;

    let removed = store.delete_by_ids(&to_remove, config.batch_size)?;

    let report = PurgeReport {
        scanned: visited,
        malformed,
        exempted,
        removed,
    };
    info!(
        scanned = report.scanned,
        malformed = report.malformed,
        exempted = report.exempted,
        removed = report.removed,
        "bulk protection purge finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
