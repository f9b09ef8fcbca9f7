//! Block-type registry: bidirectional name ↔ id table.
//!
//! Ids are small persisted integers allocated monotonically
//! (`max(existing) + 1`, starting at 1) the first time a type name is seen.
//! Store failures degrade to the [`UNKNOWN_BLOCK_TYPE`] sentinel with a
//! logged warning; callers treat the sentinel as "unavailable", never as an
//! error.

use std::collections::HashMap;

use tracing::warn;

use crate::store::SqliteStore;

/// Sentinel id returned when a type cannot be resolved or persisted.
pub const UNKNOWN_BLOCK_TYPE: i32 = -1;

/// Conventional id for air. The allocator starts at 1, so 0 is never handed
/// out; `<= 0` on a record always means "no real block type recorded".
pub const AIR_BLOCK_TYPE: i32 = 0;

/// Bidirectional block-type mapping with monotonic id allocation.
///
/// Names are canonicalized to upper case, matching the convention of
/// environment material names; lookups are therefore case-insensitive.
#[derive(Debug, Default)]
pub struct BlockTypeRegistry {
    by_id: HashMap<i32, String>,
    by_name: HashMap<String, i32>,
    next_id: i32,
    legacy: HashMap<i32, String>,
}

impl BlockTypeRegistry {
    /// Create an empty registry; ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            next_id: 1,
            legacy: HashMap::new(),
        }
    }

    /// Create a registry with a legacy-id table: numeric ids from older
    /// worlds mapped to the type names they meant.
    #[must_use]
    pub fn with_legacy_table(legacy: HashMap<i32, String>) -> Self {
        let legacy = legacy
            .into_iter()
            .map(|(id, name)| (id, name.to_ascii_uppercase()))
            .collect();
        Self {
            legacy,
            ..Self::new()
        }
    }

    /// Seed both directions from the store and position the id counter at
    /// `max(existing id) + 1`. Store failures are logged; the registry stays
    /// usable (empty). Returns how many mappings were loaded.
    pub fn load(&mut self, store: &SqliteStore) -> usize {
        let rows = match store.load_block_rows() {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "unable to load block-type mappings");
                return 0;
            }
        };

        for (id, name) in &rows {
            self.add_mapping(*id, name.to_ascii_uppercase());
        }
        self.next_id = rows.iter().map(|(id, _)| *id).max().unwrap_or(0).max(0) + 1;
        rows.len()
    }

    /// Existing id for a type name, or allocate-and-persist a new one.
    /// Idempotent: repeated calls with the same name return the same id and
    /// create at most one row. Returns [`UNKNOWN_BLOCK_TYPE`] if the store
    /// rejects the insert.
    pub fn get_or_create_id(&mut self, store: &SqliteStore, name: &str) -> i32 {
        let canonical = name.to_ascii_uppercase();
        if let Some(&id) = self.by_name.get(&canonical) {
            return id;
        }

        let id = self.next_id;
        if let Err(err) = store.insert_block(id, &canonical) {
            warn!(name = %canonical, error = %err, "unable to persist block-type mapping");
            return UNKNOWN_BLOCK_TYPE;
        }
        self.add_mapping(id, canonical);
        self.next_id += 1;
        id
    }

    /// Id for a name, if already known. Does not allocate.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    /// Name for an id, if already known. Does not consult the legacy table.
    #[must_use]
    pub fn type_name(&self, id: i32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Resolve an id to a type name, falling back to the legacy-id table.
    /// A legacy hit is adopted into the registry (allocating a fresh id for
    /// the name if needed) so the next lookup is direct. `None` only after
    /// both tables miss.
    pub fn resolve_type(&mut self, store: &SqliteStore, id: i32) -> Option<String> {
        if let Some(name) = self.by_id.get(&id) {
            return Some(name.clone());
        }
        let name = self.legacy.get(&id)?.clone();
        self.get_or_create_id(store, &name);
        Some(name)
    }

    /// Remove a mapping by id: deletes the persisted row and both in-memory
    /// directions. A store failure leaves the mapping in place.
    pub fn remove(&mut self, store: &SqliteStore, id: i32) {
        let Some(name) = self.by_id.get(&id).cloned() else {
            return;
        };
        if let Err(err) = store.delete_block(id) {
            warn!(id, error = %err, "unable to delete block-type mapping");
            return;
        }
        self.by_id.remove(&id);
        self.by_name.remove(&name);
    }

    /// Remove a mapping by name.
    pub fn remove_name(&mut self, store: &SqliteStore, name: &str) {
        if let Some(id) = self.id_of(name) {
            self.remove(store, id);
        }
    }

    /// Number of known mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no mappings are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn add_mapping(&mut self, id: i32, canonical: String) {
        self.by_id.insert(id, canonical.clone());
        self.by_name.insert(canonical, id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
