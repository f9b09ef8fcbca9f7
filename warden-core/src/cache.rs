//! Multi-index protection cache with adaptive sizing.
//!
//! Layout is arena+index: `by_id` owns the records and governs capacity
//! (classic LRU); every other structure stores ids or sentinels only.
//!
//! ```text
//! by_id    : ProtectionId -> Protection      (owning, LRU, capacity-governing)
//! by_key   : LocationKey  -> ProtectionId    (positive index, id only)
//! keys_of  : ProtectionId -> [LocationKey]   (reverse map for exact removal)
//! negative : LocationKey  -> ()              (known-absent, independent bound)
//! ```
//!
//! Index hits are validated against `by_id` before being trusted: an id that
//! has been evicted makes the index entry a miss, and the stale mapping is
//! dropped on the spot. The negative cache has its own capacity so positive
//! growth can never starve it.
//!
//! Capacity is base + adaptive. Hot lookup paths call
//! [`ProtectionCache::grow_if_pressured`]; a full primary store grows the
//! adaptive component by a fixed increment up to a hard ceiling, and never
//! shrinks back.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::config::CacheConfig;
use crate::counter::OperationCounter;
use crate::protection::Protection;
use crate::types::{LocationKey, ProtectionId};

/// Adaptive multi-index LRU cache for protection records.
pub struct ProtectionCache {
    by_id: LruCache<ProtectionId, Protection>,
    by_key: HashMap<LocationKey, ProtectionId>,
    keys_of: HashMap<ProtectionId, Vec<LocationKey>>,
    negative: LruCache<LocationKey, ()>,
    capacity: usize,
    adaptive_capacity: usize,
    adaptive_increment: usize,
    adaptive_max: usize,
    negative_floor: usize,
    counter: OperationCounter,
}

impl std::fmt::Debug for ProtectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectionCache")
            .field("len", &self.by_id.len())
            .field("capacity", &self.capacity)
            .field("adaptive_capacity", &self.adaptive_capacity)
            .field("negative_len", &self.negative.len())
            .finish_non_exhaustive()
    }
}

impl ProtectionCache {
    /// Create a cache sized from configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = config.capacity.max(1);
        let negative_floor = config.negative_floor.max(1);
        Self {
            by_id: LruCache::new(nonzero(capacity)),
            by_key: HashMap::new(),
            keys_of: HashMap::new(),
            negative: LruCache::new(nonzero(negative_floor)),
            capacity,
            adaptive_capacity: 0,
            adaptive_increment: config.adaptive_increment,
            adaptive_max: config.adaptive_max,
            negative_floor,
            counter: OperationCounter::new(),
        }
    }

    // ------------------------------------------------------------------
    // Capacity
    // ------------------------------------------------------------------

    /// Base configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Capacity added in response to observed pressure.
    #[must_use]
    pub fn adaptive_capacity(&self) -> usize {
        self.adaptive_capacity
    }

    /// Base plus adaptive capacity: the bound on `by_id`.
    #[must_use]
    pub fn total_capacity(&self) -> usize {
        self.capacity + self.adaptive_capacity
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Whether the primary store is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.by_id.len() >= self.total_capacity()
    }

    /// Called from hot lookup paths that badly want free space. If the
    /// primary store is full, grows adaptive capacity by the configured
    /// increment, capped at the hard ceiling. Never shrinks.
    pub fn grow_if_pressured(&mut self) {
        if !self.is_full() || self.adaptive_capacity >= self.adaptive_max {
            return;
        }
        self.adaptive_capacity =
            (self.adaptive_capacity + self.adaptive_increment).min(self.adaptive_max);
        self.by_id.resize(nonzero(self.total_capacity()));
        self.negative
            .resize(nonzero(self.negative_floor + self.adaptive_capacity));
        debug!(
            adaptive = self.adaptive_capacity,
            total = self.total_capacity(),
            "protection cache grew under pressure"
        );
    }

    // ------------------------------------------------------------------
    // Positive cache
    // ------------------------------------------------------------------

    /// Insert or overwrite a protection, indexing every key it occupies and
    /// clearing each key's negative entry immediately after mapping it.
    ///
    /// If the primary store overflows, the least-recently-used record is
    /// evicted and its keys unmapped; the negative cache is not touched by
    /// eviction.
    pub fn put(&mut self, protection: Protection) {
        self.counter.increment("put");

        let id = protection.id;
        let keys = protection.keys();

        // Overwrites may carry a different key set; drop the old mappings.
        if self.by_id.contains(&id) {
            self.unmap(id);
        }

        if let Some((evicted_id, _)) = self.by_id.push(id, protection) {
            if evicted_id != id {
                self.counter.increment("evict");
                self.unmap(evicted_id);
            }
        }

        for key in &keys {
            self.by_key.insert(key.clone(), id);
            self.negative.pop(key);
        }
        self.keys_of.insert(id, keys);
    }

    /// Remove a protection: drops the id entry and every key it occupies.
    /// Negative entries are the caller's concern when repopulating.
    pub fn remove(&mut self, protection: &Protection) {
        self.counter.increment("remove");
        self.by_id.pop(&protection.id);
        self.unmap(protection.id);
    }

    /// Remove a protection that is known only by id.
    pub fn remove_id(&mut self, id: ProtectionId) {
        self.counter.increment("remove");
        self.by_id.pop(&id);
        self.unmap(id);
    }

    /// Unmap a single key from the positive index and drop any negative
    /// entry for it. Used when one physical block changes underneath a
    /// multi-block protection.
    pub fn remove_key(&mut self, key: &LocationKey) {
        if let Some(id) = self.by_key.remove(key) {
            if let Some(keys) = self.keys_of.get_mut(&id) {
                keys.retain(|k| k != key);
            }
        }
        self.negative.pop(key);
    }

    /// Look up the live protection occupying a key.
    ///
    /// A key whose id is no longer live is a miss; the stale index entries
    /// are dropped rather than surfacing a dead record.
    pub fn get(&mut self, key: &LocationKey) -> Option<&Protection> {
        self.counter.increment("get");
        let id = *self.by_key.get(key)?;
        if self.by_id.contains(&id) {
            return self.by_id.get(&id);
        }
        self.counter.increment("stale");
        self.unmap(id);
        None
    }

    /// Look up a live protection by id, promoting its recency.
    pub fn get_by_id(&mut self, id: ProtectionId) -> Option<&Protection> {
        self.counter.increment("get_by_id");
        self.by_id.get(&id)
    }

    // ------------------------------------------------------------------
    // Negative cache
    // ------------------------------------------------------------------

    /// Memoize "confirmed no protection here". Refused (at debug level) if a
    /// live positive entry occupies the key: a key is never both present
    /// and known-absent.
    pub fn mark_absent(&mut self, key: LocationKey) {
        self.counter.increment("mark_absent");
        if let Some(id) = self.by_key.get(&key) {
            if self.by_id.contains(id) {
                debug!(%key, "refusing to mark a live key absent");
                return;
            }
            let id = *id;
            self.unmap(id);
        }
        self.negative.push(key, ());
    }

    /// Whether a key is memoized as absent.
    pub fn is_known_absent(&mut self, key: &LocationKey) -> bool {
        self.counter.increment("is_known_absent");
        self.negative.get(key).is_some()
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Empty every structure. Used on reload. Counters survive.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_key.clear();
        self.keys_of.clear();
        self.negative.clear();
    }

    /// Diagnostic counters for the cache's operations.
    #[must_use]
    pub fn counter(&self) -> &OperationCounter {
        &self.counter
    }

    /// Drop every positive index entry belonging to `id`.
    fn unmap(&mut self, id: ProtectionId) {
        if let Some(keys) = self.keys_of.remove(&id) {
            for key in keys {
                if self.by_key.get(&key) == Some(&id) {
                    self.by_key.remove(&key);
                }
            }
        }
    }
}

fn nonzero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n.max(1)).unwrap_or(NonZeroUsize::MIN)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
