//! The warden context: one explicitly-owned object wiring the store, cache,
//! registry, save queue, and evaluator together.
//!
//! There is no global instance. Construct a [`Warden`] once and pass it to
//! whatever drives the simulation tick. Mutation is `&mut self`; wrap the
//! context in a mutex if more than one thread must reach it.
//!
//! Lookup flow: cache hit → done; negative hit → `None`; miss → grow the
//! cache if pressured, ask the store, then either insert the result or
//! memoize the confirmed absence.

use chrono::Utc;
use tracing::{debug, warn};

use crate::access::{AccessEvaluator, Actor, Identity, Notifier, Site};
use crate::cache::ProtectionCache;
use crate::config::WardenConfig;
use crate::error::Result;
use crate::protection::Protection;
use crate::purge::{self, PurgeReport};
use crate::queue::SaveQueue;
use crate::registry::BlockTypeRegistry;
use crate::store::{NewProtection, ProtectionFilter, SqliteStore};
use crate::types::{AccessLevel, LocationKey, PrincipalType, ProtectionId};

/// Result of an enforced access check.
#[derive(Debug, Clone, Copy)]
pub struct EnforceOutcome {
    /// The level the evaluator computed (after hooks).
    pub level: AccessLevel,
    /// Whether the level satisfied the required one.
    pub granted: bool,
    /// Whether legacy fields were corrected and persisted.
    pub healed: bool,
}

/// The protection system's context object.
#[derive(Debug)]
pub struct Warden {
    config: WardenConfig,
    store: SqliteStore,
    cache: ProtectionCache,
    registry: BlockTypeRegistry,
    queue: SaveQueue,
    evaluator: AccessEvaluator,
}

impl Warden {
    /// Open a file-backed context.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) if the
    /// store cannot be opened.
    pub fn open<P: AsRef<std::path::Path>>(path: P, config: WardenConfig) -> Result<Self> {
        let store = SqliteStore::open(path, &config.persistence)?;
        Ok(Self::assemble(store, config))
    }

    /// Open an in-memory context (tests, tooling).
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) on
    /// SQLite failures.
    pub fn open_in_memory(config: WardenConfig) -> Result<Self> {
        let store = SqliteStore::open_in_memory()?;
        Ok(Self::assemble(store, config))
    }

    fn assemble(store: SqliteStore, config: WardenConfig) -> Self {
        let mut registry = BlockTypeRegistry::new();
        let loaded = registry.load(&store);
        debug!(block_types = loaded, "warden context assembled");
        Self {
            cache: ProtectionCache::new(&config.cache),
            queue: SaveQueue::new(config.persistence.flush_threshold),
            evaluator: AccessEvaluator::new(config.access.clone()),
            registry,
            store,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Component access
    // ------------------------------------------------------------------

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// The protection cache.
    #[must_use]
    pub fn cache(&self) -> &ProtectionCache {
        &self.cache
    }

    /// The protection cache, mutably.
    pub fn cache_mut(&mut self) -> &mut ProtectionCache {
        &mut self.cache
    }

    /// The block-type registry.
    #[must_use]
    pub fn registry(&self) -> &BlockTypeRegistry {
        &self.registry
    }

    /// The block-type registry, mutably (allocation needs the store; see
    /// [`Warden::block_type_id`]).
    pub fn registry_mut(&mut self) -> &mut BlockTypeRegistry {
        &mut self.registry
    }

    /// The persistent store.
    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// The access evaluator, mutably (hook registration).
    pub fn evaluator_mut(&mut self) -> &mut AccessEvaluator {
        &mut self.evaluator
    }

    /// Existing or freshly allocated id for a block type name.
    pub fn block_type_id(&mut self, name: &str) -> i32 {
        self.registry.get_or_create_id(&self.store, name)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// The protection occupying a key, consulting cache, negative cache, and
    /// store in that order. Store failures degrade to `None` with a logged
    /// warning.
    pub fn find_protection(&mut self, key: &LocationKey) -> Option<Protection> {
        if self.cache.is_known_absent(key) {
            return None;
        }
        if let Some(found) = self.cache.get(key) {
            return Some(found.clone());
        }

        // A miss is about to insert; make sure there is room to breathe.
        self.cache.grow_if_pressured();

        match self.store.load_by_key(key) {
            Ok(Some(protection)) => {
                self.cache.put(protection.clone());
                Some(protection)
            }
            Ok(None) => {
                self.cache.mark_absent(key.clone());
                None
            }
            Err(err) => {
                warn!(%key, error = %err, "protection lookup failed");
                None
            }
        }
    }

    /// A protection by id, cache first. Store failures degrade to `None`.
    pub fn find_by_id(&mut self, id: ProtectionId) -> Option<Protection> {
        if let Some(found) = self.cache.get_by_id(id) {
            return Some(found.clone());
        }

        self.cache.grow_if_pressured();

        match self.store.load_by_id(id) {
            Ok(Some(protection)) => {
                self.cache.put(protection.clone());
                Some(protection)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(%id, error = %err, "protection lookup by id failed");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Register a protection and insert it into the cache. Inserting clears
    /// any known-absent memo for the keys it occupies.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) if the
    /// insert fails.
    pub fn create_protection(&mut self, new: NewProtection) -> Result<Protection> {
        let protection = self.store.register(new)?;
        self.cache.put(protection.clone());
        Ok(protection)
    }

    /// Delete a protection from the store and drop every cache entry it
    /// occupies.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) if the
    /// delete fails.
    pub fn remove_protection(&mut self, protection: &Protection) -> Result<()> {
        self.queue.discard(protection.id);
        self.store
            .delete_by_ids(&[protection.id], self.config.purge.batch_size)?;
        self.cache.remove(protection);
        Ok(())
    }

    /// Persist immediately and re-index the cache entry (location or type
    /// may have changed).
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) /
    /// [`WardenError::Serialization`](crate::WardenError::Serialization) on
    /// failure.
    pub fn save_now(&mut self, protection: &Protection) -> Result<()> {
        self.store.save(protection)?;
        self.cache.put(protection.clone());
        Ok(())
    }

    /// Queue a save for the next flush and re-index the cache entry. Flushes
    /// inline once the queue reports pressure; a failed inline flush is
    /// logged and retried on the next flush.
    pub fn save_later(&mut self, protection: Protection) {
        self.cache.put(protection.clone());
        self.queue.push(protection);
        if self.queue.needs_flush() {
            if let Err(err) = self.queue.flush(&mut self.store) {
                warn!(error = %err, "inline save-queue flush failed; will retry");
            }
        }
    }

    /// Flush every queued save. Returns rows written.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) on
    /// SQLite failures; the batch stays queued.
    pub fn flush(&mut self) -> Result<usize> {
        self.queue.flush(&mut self.store)
    }

    /// Flush pending saves and empty the cache. Used on world reload.
    pub fn reload(&mut self) {
        if let Err(err) = self.queue.flush(&mut self.store) {
            warn!(error = %err, "flush on reload failed; queued saves kept");
        }
        self.cache.clear();
    }

    // ------------------------------------------------------------------
    // Bulk removal
    // ------------------------------------------------------------------

    /// Purge every matching protection. See
    /// [`purge_matching`](crate::purge::purge_matching) for semantics.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`](crate::WardenError::Database) on
    /// SQLite failures.
    pub fn purge_matching(
        &mut self,
        filter: &ProtectionFilter,
        progress: impl FnMut(usize, u64),
    ) -> Result<PurgeReport> {
        purge::purge_matching(
            &mut self.store,
            &mut self.cache,
            &mut self.queue,
            filter,
            &self.config.purge,
            progress,
        )
    }

    /// Purge every protection owned by a principal. The display name is
    /// resolved to a unique id when the identity collaborator knows it, so
    /// modern and legacy owner forms both match.
    ///
    /// # Errors
    /// See [`Warden::purge_matching`].
    pub fn purge_owner(
        &mut self,
        principal: &str,
        identity: &dyn Identity,
        progress: impl FnMut(usize, u64),
    ) -> Result<PurgeReport> {
        let resolved = identity
            .lookup_name(principal)
            .map_or_else(|| principal.to_string(), |id| id.to_string());
        self.purge_matching(&ProtectionFilter::Owner(resolved), progress)
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    /// Pure access query; see
    /// [`AccessEvaluator::compute_access`](crate::access::AccessEvaluator::compute_access).
    #[must_use]
    pub fn compute_access(
        &self,
        actor: Option<&Actor>,
        protection: Option<&Protection>,
        identity: &dyn Identity,
    ) -> AccessLevel {
        self.evaluator
            .compute_access(actor, protection, identity, &self.registry)
    }

    /// Whether `actor` may use the protection.
    #[must_use]
    pub fn can_access(
        &self,
        actor: Option<&Actor>,
        protection: Option<&Protection>,
        identity: &dyn Identity,
    ) -> bool {
        self.compute_access(actor, protection, identity) >= AccessLevel::Player
    }

    /// Whether `actor` may administer the protection.
    #[must_use]
    pub fn can_admin(
        &self,
        actor: Option<&Actor>,
        protection: Option<&Protection>,
        identity: &dyn Identity,
    ) -> bool {
        self.compute_access(actor, protection, identity) >= AccessLevel::Admin
    }

    /// Enforce an access check against a physical site, with side effects:
    ///
    /// - legacy records are healed first (missing block type, wrong world,
    ///   display-name owner) and persisted;
    /// - a permitted access by the owner or an explicitly granted principal
    ///   updates `last_accessed` through the save queue;
    /// - the outcome is reported through `notifier` unless the site's block
    ///   type is configured quiet.
    pub fn enforce_access(
        &mut self,
        actor: &Actor,
        protection: &mut Protection,
        site: &Site,
        required: AccessLevel,
        identity: &dyn Identity,
        notifier: Option<&mut dyn Notifier>,
    ) -> EnforceOutcome {
        let healed = self.heal(protection, site, identity);

        let level = self
            .evaluator
            .compute_access(Some(actor), Some(protection), identity, &self.registry);
        let granted = level >= required;

        if granted && self.earns_timestamp(actor, protection) {
            protection.touch(Utc::now().timestamp());
            self.save_later(protection.clone());
        }

        if let Some(notifier) = notifier {
            self.emit_notice(actor, protection, site, granted, notifier);
        }

        EnforceOutcome {
            level,
            granted,
            healed,
        }
    }

    /// Correct legacy fields against the current physical site. Returns true
    /// if anything changed (and was persisted).
    fn heal(&mut self, protection: &mut Protection, site: &Site, identity: &dyn Identity) -> bool {
        let mut healed = false;

        // Old rows predate block-type tracking.
        if protection.block_type_id <= 0 {
            if let Some(name) = site.block_type.as_deref() {
                let id = self.registry.get_or_create_id(&self.store, name);
                if id > 0 {
                    protection.block_type_id = id;
                    healed = true;
                }
            }
        }

        // Worlds were once implicit; reanchor to where the block really is.
        if protection.world.is_empty() || protection.world != site.key.world {
            protection.world = site.key.world.clone();
            healed = true;
        }

        // Display-name owners normalize to the unique id once resolvable.
        if protection.owner_uuid().is_none() {
            if let Some(id) = identity.lookup_name(&protection.owner) {
                protection.owner = id.to_string();
                healed = true;
            }
        }

        if healed {
            debug!(id = %protection.id, "healed legacy protection record");
            if let Err(err) = self.save_now(protection) {
                warn!(id = %protection.id, error = %err, "unable to persist healed record");
            }
        }
        healed
    }

    /// Owners and explicitly granted principals earn a timestamp update.
    fn earns_timestamp(&self, actor: &Actor, protection: &Protection) -> bool {
        protection.is_owner(actor.id, &actor.name)
            || protection.access_for(&actor.id.to_string(), PrincipalType::Player)
                != AccessLevel::None
            || protection.access_for(&actor.name, PrincipalType::Player) != AccessLevel::None
    }

    fn emit_notice(
        &self,
        actor: &Actor,
        protection: &Protection,
        site: &Site,
        granted: bool,
        notifier: &mut dyn Notifier,
    ) {
        let access = &self.config.access;
        if !access.show_notices {
            return;
        }
        if let Some(block_type) = site.block_type.as_deref() {
            if access
                .quiet_types
                .iter()
                .any(|quiet| quiet.eq_ignore_ascii_case(block_type))
            {
                return;
            }
        }
        if granted && !access.show_own_notices && protection.is_owner(actor.id, &actor.name) {
            return;
        }
        notifier.notify_access(actor, protection, site, granted);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
