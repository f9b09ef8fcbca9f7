//! The protection record: ownership, type, grants, flags.
//!
//! Permission entries and flags travel in a single JSON `data` column so the
//! relational schema stays stable as grant shapes evolve (the same
//! forward-compatibility argument as serialising documents into a BLOB).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WardenError};
use crate::types::{AccessLevel, Flag, LocationKey, PrincipalType, ProtectionId, ProtectionType};

// ---------------------------------------------------------------------------
// Permission entries
// ---------------------------------------------------------------------------

/// A single (principal, principal-type, access-level) grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Principal identifier: UUID string, display name, group name, or a
    /// block-type id for [`PrincipalType::Item`] entries.
    pub name: String,
    /// What kind of principal this entry names.
    #[serde(rename = "type")]
    pub principal: PrincipalType,
    /// The level this entry grants.
    pub access: AccessLevel,
}

impl Permission {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, principal: PrincipalType, access: AccessLevel) -> Self {
        Self {
            name: name.into(),
            principal,
            access,
        }
    }
}

/// Wire shape of the JSON data column.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DataPayload {
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    flags: HashSet<Flag>,
}

// ---------------------------------------------------------------------------
// Protection
// ---------------------------------------------------------------------------

/// A protected location or entity: the persisted record plus the runtime
/// set of extra keys a finder contributed (e.g. the second half of a double
/// chest). Extra keys are never persisted; the finder rediscovers them.
#[derive(Debug, Clone, PartialEq)]
pub struct Protection {
    /// Store-assigned id.
    pub id: ProtectionId,
    /// World holding the primary block.
    pub world: String,
    /// Primary block X.
    pub x: i32,
    /// Primary block Y.
    pub y: i32,
    /// Primary block Z.
    pub z: i32,
    /// Additional keys the protection occupies beyond the primary block.
    pub extra_keys: Vec<LocationKey>,
    /// Protection mode.
    pub kind: ProtectionType,
    /// Owner principal: UUID string preferred, legacy display name accepted.
    pub owner: String,
    /// Block-type id; `<= 0` on legacy rows (see
    /// [`UNKNOWN_BLOCK_TYPE`](crate::registry::UNKNOWN_BLOCK_TYPE)).
    pub block_type_id: i32,
    /// Per-principal grants.
    pub permissions: Vec<Permission>,
    /// Capability markers.
    pub flags: HashSet<Flag>,
    /// Password digest; only meaningful for [`ProtectionType::Password`].
    pub password: Option<String>,
    /// Creation time, epoch seconds.
    pub created: i64,
    /// Last permitted access, epoch seconds.
    pub last_accessed: i64,
}

impl Protection {
    /// The canonical key of the primary block.
    #[must_use]
    pub fn primary_key(&self) -> LocationKey {
        LocationKey::block(self.world.clone(), self.x, self.y, self.z)
    }

    /// Every key this protection occupies: primary first, then finder keys.
    #[must_use]
    pub fn keys(&self) -> Vec<LocationKey> {
        let mut keys = Vec::with_capacity(1 + self.extra_keys.len());
        keys.push(self.primary_key());
        keys.extend(self.extra_keys.iter().cloned());
        keys
    }

    /// Record a finder-contributed key. The primary key and duplicates are
    /// ignored.
    pub fn add_extra_key(&mut self, key: LocationKey) {
        if key != self.primary_key() && !self.extra_keys.contains(&key) {
            self.extra_keys.push(key);
        }
    }

    /// Owner as a UUID, when the record holds the modern form.
    #[must_use]
    pub fn owner_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.owner).ok()
    }

    /// Whether the given actor owns this protection.
    ///
    /// UUID equality is preferred; a legacy display-name owner is matched
    /// case-insensitively as the documented fallback.
    #[must_use]
    pub fn is_owner(&self, id: Uuid, name: &str) -> bool {
        match self.owner_uuid() {
            Some(owner) => owner == id,
            None => self.owner.eq_ignore_ascii_case(name),
        }
    }

    /// Highest level granted to `name` among entries of the given principal
    /// type. Name comparison is case-insensitive.
    #[must_use]
    pub fn access_for(&self, name: &str, principal: PrincipalType) -> AccessLevel {
        self.permissions
            .iter()
            .filter(|p| p.principal == principal && p.name.eq_ignore_ascii_case(name))
            .map(|p| p.access)
            .max()
            .unwrap_or(AccessLevel::None)
    }

    /// Upsert a grant, replacing any existing entry for the same principal.
    pub fn set_access(&mut self, name: &str, principal: PrincipalType, access: AccessLevel) {
        self.remove_access(name, principal);
        self.permissions
            .push(Permission::new(name, principal, access));
    }

    /// Drop every grant for the given principal. Returns how many were
    /// removed.
    pub fn remove_access(&mut self, name: &str, principal: PrincipalType) -> usize {
        let before = self.permissions.len();
        self.permissions
            .retain(|p| !(p.principal == principal && p.name.eq_ignore_ascii_case(name)));
        before - self.permissions.len()
    }

    /// Whether the protection carries a flag.
    #[must_use]
    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    /// Set a flag. Returns false if it was already set.
    pub fn set_flag(&mut self, flag: Flag) -> bool {
        self.flags.insert(flag)
    }

    /// Remove a flag. Returns false if it was not set.
    pub fn remove_flag(&mut self, flag: Flag) -> bool {
        self.flags.remove(&flag)
    }

    /// Compare a presented password digest against the stored one.
    #[must_use]
    pub fn password_matches(&self, digest: &str) -> bool {
        self.password.as_deref() == Some(digest)
    }

    /// Update the last-accessed timestamp.
    pub fn touch(&mut self, now_epoch: i64) {
        self.last_accessed = now_epoch;
    }

    // ------------------------------------------------------------------
    // Data column codec
    // ------------------------------------------------------------------

    /// Encode permissions and flags for the JSON data column.
    ///
    /// # Errors
    /// Returns [`WardenError::Serialization`] if encoding fails.
    pub fn data_json(&self) -> Result<String> {
        let payload = DataPayload {
            permissions: self.permissions.clone(),
            flags: self.flags.clone(),
        };
        serde_json::to_string(&payload).map_err(|e| WardenError::Serialization(e.to_string()))
    }

    /// Decode a JSON data column into (permissions, flags). An empty or NULL
    /// column decodes to empty sets.
    ///
    /// # Errors
    /// Returns [`WardenError::Serialization`] if the payload is malformed.
    pub fn decode_data(data: Option<&str>) -> Result<(Vec<Permission>, HashSet<Flag>)> {
        let Some(raw) = data else {
            return Ok((Vec::new(), HashSet::new()));
        };
        if raw.trim().is_empty() {
            return Ok((Vec::new(), HashSet::new()));
        }
        let payload: DataPayload =
            serde_json::from_str(raw).map_err(|e| WardenError::Serialization(e.to_string()))?;
        Ok((payload.permissions, payload.flags))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
