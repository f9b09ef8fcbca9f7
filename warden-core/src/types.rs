//! Core type definitions for the warden protection system.
//!
//! Everything here is a small value type: identities, coordinates, and the
//! closed enumerations that are persisted by ordinal and must stay stable.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a protection record, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectionId(pub i64);

impl fmt::Display for ProtectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// Coordinate offset applied to synthetic entity-backed locations so they can
/// never collide with real block coordinates.
pub const ENTITY_POSITION_OFFSET: i32 = 50_000;

/// Canonical identity of a protectable position: world name plus integer
/// block coordinates.
///
/// Entity-backed protections are given a synthetic key derived from the
/// entity's UUID (see [`LocationKey::entity`]) so they flow through the same
/// cache and store paths as block protections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    /// World identifier.
    pub world: String,
    /// Block X coordinate.
    pub x: i32,
    /// Block Y coordinate.
    pub y: i32,
    /// Block Z coordinate.
    pub z: i32,
}

impl LocationKey {
    /// Key for a physical block position.
    #[must_use]
    pub fn block(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Synthetic key for an entity-backed protection.
    ///
    /// All three coordinates are `ENTITY_POSITION_OFFSET + fold(uuid)`, where
    /// `fold` is a stable 32-bit fold of the UUID bytes. The offset keeps
    /// synthetic keys out of the coordinate range of real blocks.
    #[must_use]
    pub fn entity(world: impl Into<String>, entity: Uuid) -> Self {
        let folded = fold_uuid(entity);
        let coord = ENTITY_POSITION_OFFSET.wrapping_add(folded);
        Self {
            world: world.into(),
            x: coord,
            y: coord,
            z: coord,
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.world, self.x, self.y, self.z)
    }
}

/// Fold a UUID into a stable i32 by xor-ing its four 32-bit words.
fn fold_uuid(id: Uuid) -> i32 {
    let b = id.as_bytes();
    let mut folded: u32 = 0;
    for chunk in b.chunks_exact(4) {
        folded ^= u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    folded as i32
}

// ---------------------------------------------------------------------------
// Access levels
// ---------------------------------------------------------------------------

/// What an actor may do to a protection. Ordered: `None < Player < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum AccessLevel {
    /// No access.
    #[default]
    None,
    /// May use the protection (open, take, activate).
    Player,
    /// May administer the protection (modify grants, remove).
    Admin,
}

impl From<AccessLevel> for u8 {
    fn from(level: AccessLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for AccessLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Player),
            2 => Ok(Self::Admin),
            other => Err(format!("invalid access level ordinal {other}")),
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Player => write!(f, "player"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

// ---------------------------------------------------------------------------
// Protection types
// ---------------------------------------------------------------------------

/// The protection mode of a record. Closed enumeration, persisted by ordinal
/// in its own store column; variants must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ProtectionType {
    /// Anyone may use; only the owner administers.
    Public,
    /// Use requires a per-session unlock credential.
    Password,
    /// Use restricted to the owner and explicit grants.
    Private,
    /// Anyone may deposit; removal restricted.
    Donation,
    /// Contents visible to anyone; mutation restricted.
    Display,
}

impl ProtectionType {
    /// Stable persisted ordinal.
    #[must_use]
    pub fn ordinal(self) -> i64 {
        self as i64
    }

    /// Decode a persisted ordinal; `None` for unknown values.
    #[must_use]
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Public),
            1 => Some(Self::Password),
            2 => Some(Self::Private),
            3 => Some(Self::Donation),
            4 => Some(Self::Display),
            _ => None,
        }
    }
}

impl From<ProtectionType> for u8 {
    fn from(ty: ProtectionType) -> Self {
        ty as u8
    }
}

impl TryFrom<u8> for ProtectionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ProtectionType::from_ordinal(i64::from(value))
            .ok_or_else(|| format!("invalid protection type ordinal {value}"))
    }
}

impl fmt::Display for ProtectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Password => write!(f, "password"),
            Self::Private => write!(f, "private"),
            Self::Donation => write!(f, "donation"),
            Self::Display => write!(f, "display"),
        }
    }
}

// ---------------------------------------------------------------------------
// Principal types
// ---------------------------------------------------------------------------

/// What kind of principal a permission entry names. Persisted by ordinal
/// inside the JSON data payload; variants must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PrincipalType {
    /// A player, by UUID or (legacy) display name.
    Player,
    /// A permission group name.
    Group,
    /// A held-item type; the entry name is a block-type id.
    Item,
    /// A town name.
    Town,
    /// A world region name.
    Region,
}

impl From<PrincipalType> for u8 {
    fn from(ty: PrincipalType) -> Self {
        ty as u8
    }
}

impl TryFrom<u8> for PrincipalType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Player),
            1 => Ok(Self::Group),
            2 => Ok(Self::Item),
            3 => Ok(Self::Town),
            4 => Ok(Self::Region),
            other => Err(format!("invalid principal type ordinal {other}")),
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => write!(f, "player"),
            Self::Group => write!(f, "group"),
            Self::Item => write!(f, "item"),
            Self::Town => write!(f, "town"),
            Self::Region => write!(f, "region"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Capability markers attached to a protection. Persisted by name in the
/// JSON data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Redstone interaction is allowed through the protection.
    Redstone,
    /// Nearby dropped items are pulled into the container.
    Magnet,
    /// Doors re-close automatically after use.
    AutoClose,
    /// The protection survives explosions.
    AllowExplosions,
    /// Hoppers may move items in and out.
    Hopper,
    /// The protection is exempt from bulk removal.
    Exemption,
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redstone => write!(f, "redstone"),
            Self::Magnet => write!(f, "magnet"),
            Self::AutoClose => write!(f, "autoclose"),
            Self::AllowExplosions => write!(f, "allowexplosions"),
            Self::Hopper => write!(f, "hopper"),
            Self::Exemption => write!(f, "exemption"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels_are_ordered() {
        assert!(AccessLevel::None < AccessLevel::Player);
        assert!(AccessLevel::Player < AccessLevel::Admin);
        assert_eq!(
            AccessLevel::Player.max(AccessLevel::Admin),
            AccessLevel::Admin
        );
    }

    #[test]
    fn protection_type_ordinals_are_stable() {
        assert_eq!(ProtectionType::Public.ordinal(), 0);
        assert_eq!(ProtectionType::Password.ordinal(), 1);
        assert_eq!(ProtectionType::Private.ordinal(), 2);
        assert_eq!(ProtectionType::Donation.ordinal(), 3);
        assert_eq!(ProtectionType::Display.ordinal(), 4);

        for ordinal in 0..5 {
            let ty = ProtectionType::from_ordinal(ordinal).expect("known ordinal");
            assert_eq!(ty.ordinal(), ordinal);
        }
        assert!(ProtectionType::from_ordinal(5).is_none());
        assert!(ProtectionType::from_ordinal(-1).is_none());
    }

    #[test]
    fn location_key_display_is_canonical() {
        let key = LocationKey::block("world", 1, -64, 200);
        assert_eq!(key.to_string(), "world:1:-64:200");
    }

    #[test]
    fn entity_keys_are_deterministic_and_offset() {
        let id = Uuid::new_v4();
        let a = LocationKey::entity("world", id);
        let b = LocationKey::entity("world", id);
        assert_eq!(a, b);
        assert_eq!(a.x, a.y);
        assert_eq!(a.y, a.z);
        assert_ne!(a, LocationKey::entity("world", Uuid::new_v4()));
    }

    #[test]
    fn access_level_round_trips_through_ordinal() {
        for level in [AccessLevel::None, AccessLevel::Player, AccessLevel::Admin] {
            let ordinal: u8 = level.into();
            assert_eq!(AccessLevel::try_from(ordinal).expect("valid"), level);
        }
        assert!(AccessLevel::try_from(3).is_err());
    }
}
