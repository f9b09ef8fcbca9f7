//! Write-behind queue for protection saves.
//!
//! Timestamp touches and small membership edits are frequent; the queue
//! coalesces them by id and writes everything in one transaction when
//! flushed. Bulk operations that read the live store MUST flush first so the
//! scan reflects prior in-memory mutations (see
//! [`purge_matching`](crate::purge::purge_matching)).

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::protection::Protection;
use crate::store::SqliteStore;
use crate::types::ProtectionId;

/// Coalescing save queue. Not a background worker: the owning thread decides
/// when to flush, typically when [`SaveQueue::needs_flush`] reports pressure.
#[derive(Debug, Default)]
pub struct SaveQueue {
    pending: HashMap<ProtectionId, Protection>,
    flush_threshold: usize,
}

impl SaveQueue {
    /// Create a queue that reports pressure at `flush_threshold` pending
    /// saves.
    #[must_use]
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            pending: HashMap::new(),
            flush_threshold: flush_threshold.max(1),
        }
    }

    /// Queue a save. A newer record for the same id replaces the older one.
    pub fn push(&mut self, protection: Protection) {
        self.pending.insert(protection.id, protection);
    }

    /// Drop a pending save (the record is being removed).
    pub fn discard(&mut self, id: ProtectionId) {
        self.pending.remove(&id);
    }

    /// Number of pending saves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the queue has reached its flush threshold.
    #[must_use]
    pub fn needs_flush(&self) -> bool {
        self.pending.len() >= self.flush_threshold
    }

    /// Write every pending save in one transaction. On failure the batch is
    /// re-queued so nothing is silently lost. Returns rows written.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) on
    /// SQLite failures.
    pub fn flush(&mut self, store: &mut SqliteStore) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let batch: Vec<Protection> = self.pending.drain().map(|(_, p)| p).collect();
        match store.save_batch(&batch) {
            Ok(written) => {
                debug!(written, "flushed queued protection saves");
                Ok(written)
            }
            Err(err) => {
                for protection in batch {
                    self.pending.insert(protection.id, protection);
                }
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewProtection;
    use crate::types::ProtectionType;

    fn registered(store: &SqliteStore, x: i32) -> Protection {
        store
            .register(NewProtection {
                kind: ProtectionType::Private,
                owner: "owner".to_string(),
                world: "world".to_string(),
                x,
                y: 64,
                z: 0,
                block_type_id: 1,
                password: None,
                created: 100,
            })
            .expect("register")
    }

    #[test]
    fn pushes_coalesce_by_id() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut p = registered(&store, 1);
        let mut queue = SaveQueue::new(64);

        p.touch(200);
        queue.push(p.clone());
        p.touch(300);
        queue.push(p.clone());

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn threshold_reports_pressure() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut queue = SaveQueue::new(2);
        queue.push(registered(&store, 1));
        assert!(!queue.needs_flush());
        queue.push(registered(&store, 2));
        assert!(queue.needs_flush());
    }

    #[test]
    fn flush_writes_and_empties() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let mut p = registered(&store, 1);
        let mut queue = SaveQueue::new(64);

        p.touch(999);
        queue.push(p.clone());
        let written = queue.flush(&mut store).expect("flush");
        assert_eq!(written, 1);
        assert!(queue.is_empty());

        let reloaded = store.load_by_id(p.id).expect("load").expect("found");
        assert_eq!(reloaded.last_accessed, 999);

        // flushing an empty queue is a no-op
        assert_eq!(queue.flush(&mut store).expect("flush"), 0);
    }

    #[test]
    fn discard_drops_a_pending_save() {
        let store = SqliteStore::open_in_memory().expect("open");
        let p = registered(&store, 1);
        let mut queue = SaveQueue::new(64);
        queue.push(p.clone());
        queue.discard(p.id);
        assert!(queue.is_empty());
    }
}
