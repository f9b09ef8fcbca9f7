//! The environment seam.
//!
//! Warden only ever consumes identity and coordinate data from the world:
//! where something is, what type of block sits there, which entity is being
//! touched. The server implements [`Environment`] over whatever its real
//! world representation is.

use uuid::Uuid;
use warden_core::Site;
use warden_core::types::LocationKey;

/// What the protection layer is allowed to ask the world.
pub trait Environment {
    /// Type name of the block at a location, if the position is loaded and
    /// holds a block.
    fn block_type_name(&self, key: &LocationKey) -> Option<String>;

    /// Whether a world with this identifier currently exists.
    fn world_exists(&self, world: &str) -> bool;
}

/// Build the enforcement [`Site`] for a block position, resolving its
/// current type through the environment.
#[must_use]
pub fn block_site(environment: &dyn Environment, key: LocationKey) -> Site {
    let block_type = environment.block_type_name(&key);
    Site { key, block_type }
}

/// Build the enforcement [`Site`] for an entity-backed protection.
///
/// The entity's UUID becomes a synthetic [`LocationKey`] so entity
/// protections ride the same cache and store paths as blocks; the entity's
/// type name stands in for the block type.
#[must_use]
pub fn entity_site(world: impl Into<String>, entity: Uuid, entity_type: impl Into<String>) -> Site {
    Site {
        key: LocationKey::entity(world, entity),
        block_type: Some(entity_type.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
