//! Access evaluation: who may use or administer a protection.
//!
//! [`AccessEvaluator::compute_access`] is a pure query over an actor, a
//! protection, and the identity collaborator; enforcement side effects
//! (self-healing, timestamp updates, notices) live in
//! [`Warden::enforce_access`](crate::warden::Warden::enforce_access).
//!
//! Override hooks run synchronously after the type-based decision, in
//! registration order. A hook can only ever elevate the level; a failing
//! hook is logged and skipped without touching the other hooks or the
//! decision.

use std::collections::HashSet;

use tracing::warn;
use uuid::Uuid;

use crate::config::AccessConfig;
use crate::error::Result;
use crate::protection::Protection;
use crate::registry::BlockTypeRegistry;
use crate::types::{AccessLevel, LocationKey, PrincipalType, ProtectionId, ProtectionType};

// ---------------------------------------------------------------------------
// Actor descriptor
// ---------------------------------------------------------------------------

/// Everything the evaluator needs to know about the requesting actor.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Stable unique id.
    pub id: Uuid,
    /// Display name (legacy matching fallback).
    pub name: String,
    /// Environment operator flag; only honored when so configured.
    pub op: bool,
    /// Type name of the currently held item, if any.
    pub held_item: Option<String>,
    /// Protections this actor's session has unlocked (password type).
    pub unlocked: HashSet<ProtectionId>,
}

impl Actor {
    /// Plain actor with no operator flag, held item, or unlocks.
    #[must_use]
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            op: false,
            held_item: None,
            unlocked: HashSet::new(),
        }
    }

    /// Whether this session has unlocked the given protection.
    #[must_use]
    pub fn has_unlocked(&self, id: ProtectionId) -> bool {
        self.unlocked.contains(&id)
    }
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Identity/permission collaborator: operator status, permission nodes, and
/// group membership for arbitrary principals.
pub trait Identity {
    /// Whether the principal carries the environment operator flag.
    fn is_operator(&self, id: Uuid) -> bool;

    /// Whether the principal holds a permission node.
    fn has_node(&self, id: Uuid, node: &str) -> bool;

    /// Group names the principal belongs to.
    fn groups_of(&self, id: Uuid) -> Vec<String>;

    /// Resolve a display name to a unique id, when known.
    fn lookup_name(&self, name: &str) -> Option<Uuid>;
}

/// An access override hook. Hooks observe the computed level and may elevate
/// it; they can never demote.
pub trait AccessHook {
    /// Name used in diagnostics when the hook fails.
    fn name(&self) -> &'static str;

    /// Observe an access decision and optionally return a higher level.
    ///
    /// # Errors
    /// An error is caught by the evaluator: logged, and this hook's
    /// contribution is dropped. Other hooks still run.
    fn on_access_override(
        &self,
        actor: &Actor,
        protection: &Protection,
        current: AccessLevel,
    ) -> Result<Option<AccessLevel>>;
}

/// The physical site a check is being enforced against.
#[derive(Debug, Clone)]
pub struct Site {
    /// Where the actor is interacting.
    pub key: LocationKey,
    /// Current type name of the block there, when the environment knows it.
    pub block_type: Option<String>,
}

/// Sink for user-facing access notices.
pub trait Notifier {
    /// Report the outcome of an enforced access check to the actor.
    fn notify_access(&mut self, actor: &Actor, protection: &Protection, site: &Site, granted: bool);
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Computes access levels for (actor, protection) pairs.
pub struct AccessEvaluator {
    config: AccessConfig,
    hooks: Vec<Box<dyn AccessHook>>,
}

impl std::fmt::Debug for AccessEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEvaluator")
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl AccessEvaluator {
    /// Create an evaluator with no hooks registered.
    #[must_use]
    pub fn new(config: AccessConfig) -> Self {
        Self {
            config,
            hooks: Vec::new(),
        }
    }

    /// Append a hook; hooks run in registration order.
    pub fn register_hook(&mut self, hook: Box<dyn AccessHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the actor is a super-admin: operator flag (when configured to
    /// count) or the explicit admin node.
    #[must_use]
    pub fn is_admin(&self, actor: &Actor, identity: &dyn Identity) -> bool {
        (actor.op && self.config.op_is_admin)
            || identity.has_node(actor.id, &self.config.admin_node)
    }

    /// Whether the actor holds the weaker moderator override.
    #[must_use]
    pub fn is_moderator(&self, actor: &Actor, identity: &dyn Identity) -> bool {
        identity.has_node(actor.id, &self.config.mod_node)
    }

    /// Compute the access level for an actor on a protection.
    ///
    /// An absent actor or protection evaluates to [`AccessLevel::Admin`]:
    /// call sites pre-filter, and a missing input means "nothing to deny".
    /// This fail-open convention is deliberate; do not tighten it without
    /// auditing every caller.
    #[must_use]
    pub fn compute_access(
        &self,
        actor: Option<&Actor>,
        protection: Option<&Protection>,
        identity: &dyn Identity,
        registry: &BlockTypeRegistry,
    ) -> AccessLevel {
        let (Some(actor), Some(protection)) = (actor, protection) else {
            return AccessLevel::Admin;
        };

        if self.is_admin(actor, identity) {
            return AccessLevel::Admin;
        }

        // Moderators get full access, except against admin-owned records.
        if self.is_moderator(actor, identity) && !self.owner_is_admin(protection, identity) {
            return AccessLevel::Admin;
        }

        let computed = self.type_level(actor, protection, identity, registry);
        self.dispatch_hooks(actor, protection, computed)
    }

    /// Whether `actor` may use the protection.
    #[must_use]
    pub fn can_access(
        &self,
        actor: Option<&Actor>,
        protection: Option<&Protection>,
        identity: &dyn Identity,
        registry: &BlockTypeRegistry,
    ) -> bool {
        self.compute_access(actor, protection, identity, registry) >= AccessLevel::Player
    }

    /// Whether `actor` may administer the protection.
    #[must_use]
    pub fn can_admin(
        &self,
        actor: Option<&Actor>,
        protection: Option<&Protection>,
        identity: &dyn Identity,
        registry: &BlockTypeRegistry,
    ) -> bool {
        self.compute_access(actor, protection, identity, registry) >= AccessLevel::Admin
    }

    /// Access behavior configuration.
    #[must_use]
    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn type_level(
        &self,
        actor: &Actor,
        protection: &Protection,
        identity: &dyn Identity,
        registry: &BlockTypeRegistry,
    ) -> AccessLevel {
        let owner = protection.is_owner(actor.id, &actor.name);
        match protection.kind {
            ProtectionType::Public | ProtectionType::Donation | ProtectionType::Display => {
                if owner {
                    AccessLevel::Admin
                } else {
                    // Baseline use for everyone; an explicit ADMIN grant can
                    // still elevate.
                    AccessLevel::Player.max(self.granted_level(actor, protection, identity, registry))
                }
            }
            ProtectionType::Password => {
                if !actor.has_unlocked(protection.id) {
                    AccessLevel::None
                } else if owner {
                    AccessLevel::Admin
                } else {
                    AccessLevel::Player
                }
            }
            ProtectionType::Private => {
                if owner {
                    AccessLevel::Admin
                } else {
                    self.granted_level(actor, protection, identity, registry)
                }
            }
        }
    }

    /// Highest level among the actor's matching grants: unique id first,
    /// then display name, held item, and group membership.
    fn granted_level(
        &self,
        actor: &Actor,
        protection: &Protection,
        identity: &dyn Identity,
        registry: &BlockTypeRegistry,
    ) -> AccessLevel {
        let mut level = protection.access_for(&actor.id.to_string(), PrincipalType::Player);
        level = level.max(protection.access_for(&actor.name, PrincipalType::Player));
        level = level.max(self.held_item_level(actor, protection, registry));
        for group in identity.groups_of(actor.id) {
            level = level.max(protection.access_for(&group, PrincipalType::Group));
        }
        level
    }

    /// Item keys: an ITEM entry names a block-type id; it matches when the
    /// actor is holding that type.
    fn held_item_level(
        &self,
        actor: &Actor,
        protection: &Protection,
        registry: &BlockTypeRegistry,
    ) -> AccessLevel {
        let Some(held) = actor.held_item.as_deref() else {
            return AccessLevel::None;
        };
        let Some(held_id) = registry.id_of(held) else {
            return AccessLevel::None;
        };
        protection
            .permissions
            .iter()
            .filter(|p| p.principal == PrincipalType::Item)
            .filter(|p| p.name.parse::<i32>().ok() == Some(held_id))
            .map(|p| p.access)
            .max()
            .unwrap_or(AccessLevel::None)
    }

    /// Whether the protection's owner is itself an admin. An absent or
    /// unresolvable owner is not.
    fn owner_is_admin(&self, protection: &Protection, identity: &dyn Identity) -> bool {
        let owner = protection
            .owner_uuid()
            .or_else(|| identity.lookup_name(&protection.owner));
        let Some(owner) = owner else {
            return false;
        };
        (identity.is_operator(owner) && self.config.op_is_admin)
            || identity.has_node(owner, &self.config.admin_node)
    }

    /// Run every hook over the computed level. Elevation only; errors skip
    /// the failing hook.
    fn dispatch_hooks(
        &self,
        actor: &Actor,
        protection: &Protection,
        computed: AccessLevel,
    ) -> AccessLevel {
        let mut level = computed;
        for hook in &self.hooks {
            match hook.on_access_override(actor, protection, level) {
                Ok(Some(elevated)) => level = level.max(elevated),
                Ok(None) => {}
                Err(err) => {
                    warn!(hook = hook.name(), error = %err, "access hook failed; skipped");
                }
            }
        }
        level
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::Flag;
    use std::collections::HashMap;

    /// In-memory identity collaborator for tests.
    #[derive(Default)]
    struct StubIdentity {
        operators: HashSet<Uuid>,
        nodes: HashMap<Uuid, Vec<String>>,
        groups: HashMap<Uuid, Vec<String>>,
        names: HashMap<String, Uuid>,
    }

    impl StubIdentity {
        fn grant_node(&mut self, id: Uuid, node: &str) {
            self.nodes.entry(id).or_default().push(node.to_string());
        }
    }

    impl Identity for StubIdentity {
        fn is_operator(&self, id: Uuid) -> bool {
            self.operators.contains(&id)
        }

        fn has_node(&self, id: Uuid, node: &str) -> bool {
            self.nodes
                .get(&id)
                .is_some_and(|nodes| nodes.iter().any(|n| n == node))
        }

        fn groups_of(&self, id: Uuid) -> Vec<String> {
            self.groups.get(&id).cloned().unwrap_or_default()
        }

        fn lookup_name(&self, name: &str) -> Option<Uuid> {
            self.names.get(&name.to_lowercase()).copied()
        }
    }

    fn evaluator() -> AccessEvaluator {
        AccessEvaluator::new(AccessConfig::default())
    }

    fn protection(kind: ProtectionType, owner: &str) -> Protection {
        Protection {
            id: ProtectionId(1),
            world: "world".to_string(),
            x: 0,
            y: 64,
            z: 0,
            extra_keys: Vec::new(),
            kind,
            owner: owner.to_string(),
            block_type_id: 3,
            permissions: Vec::new(),
            flags: HashSet::new(),
            password: None,
            created: 0,
            last_accessed: 0,
        }
    }

    fn compute(
        evaluator: &AccessEvaluator,
        actor: &Actor,
        protection: &Protection,
        identity: &StubIdentity,
    ) -> AccessLevel {
        let registry = BlockTypeRegistry::new();
        evaluator.compute_access(Some(actor), Some(protection), identity, &registry)
    }

    #[test]
    fn absent_inputs_fail_open() {
        let evaluator = evaluator();
        let identity = StubIdentity::default();
        let registry = BlockTypeRegistry::new();
        let actor = Actor::new(Uuid::new_v4(), "player");
        let p = protection(ProtectionType::Private, "someone");

        assert_eq!(
            evaluator.compute_access(None, Some(&p), &identity, &registry),
            AccessLevel::Admin
        );
        assert_eq!(
            evaluator.compute_access(Some(&actor), None, &identity, &registry),
            AccessLevel::Admin
        );
    }

    #[test]
    fn operator_flag_is_config_gated() {
        let identity = StubIdentity::default();
        let mut actor = Actor::new(Uuid::new_v4(), "op");
        actor.op = true;
        let p = protection(ProtectionType::Private, "someone");

        assert_eq!(compute(&evaluator(), &actor, &p, &identity), AccessLevel::Admin);

        let strict = AccessEvaluator::new(AccessConfig {
            op_is_admin: false,
            ..AccessConfig::default()
        });
        assert_eq!(compute(&strict, &actor, &p, &identity), AccessLevel::None);
    }

    #[test]
    fn admin_node_grants_everything() {
        let mut identity = StubIdentity::default();
        let actor = Actor::new(Uuid::new_v4(), "staff");
        identity.grant_node(actor.id, "warden.admin");
        let p = protection(ProtectionType::Private, "someone");

        assert_eq!(compute(&evaluator(), &actor, &p, &identity), AccessLevel::Admin);
    }

    #[test]
    fn moderator_cannot_override_admin_owner() {
        let mut identity = StubIdentity::default();
        let moderator = Actor::new(Uuid::new_v4(), "mod");
        identity.grant_node(moderator.id, "warden.mod");

        let owner_id = Uuid::new_v4();
        let p = protection(ProtectionType::Private, &owner_id.to_string());

        // plain owner: the moderator walks in
        assert_eq!(
            compute(&evaluator(), &moderator, &p, &identity),
            AccessLevel::Admin
        );

        // admin owner: no override
        identity.grant_node(owner_id, "warden.admin");
        assert_eq!(
            compute(&evaluator(), &moderator, &p, &identity),
            AccessLevel::None
        );
    }

    #[test]
    fn moderator_override_resolves_legacy_owner_names() {
        let mut identity = StubIdentity::default();
        let moderator = Actor::new(Uuid::new_v4(), "mod");
        identity.grant_node(moderator.id, "warden.mod");

        let owner_id = Uuid::new_v4();
        identity.names.insert("notch".to_string(), owner_id);
        identity.grant_node(owner_id, "warden.admin");

        let p = protection(ProtectionType::Private, "Notch");
        assert_eq!(
            compute(&evaluator(), &moderator, &p, &identity),
            AccessLevel::None
        );
    }

    #[test]
    fn public_types_grant_baseline_use() {
        let identity = StubIdentity::default();
        let stranger = Actor::new(Uuid::new_v4(), "stranger");

        for kind in [
            ProtectionType::Public,
            ProtectionType::Donation,
            ProtectionType::Display,
        ] {
            let p = protection(kind, &Uuid::new_v4().to_string());
            assert_eq!(
                compute(&evaluator(), &stranger, &p, &identity),
                AccessLevel::Player,
                "{kind} should grant baseline use"
            );
        }
    }

    #[test]
    fn public_admin_needs_ownership_or_grant() {
        let identity = StubIdentity::default();
        let owner_id = Uuid::new_v4();
        let owner = Actor::new(owner_id, "owner");
        let friend = Actor::new(Uuid::new_v4(), "friend");

        let mut p = protection(ProtectionType::Public, &owner_id.to_string());
        assert_eq!(compute(&evaluator(), &owner, &p, &identity), AccessLevel::Admin);
        assert_eq!(compute(&evaluator(), &friend, &p, &identity), AccessLevel::Player);

        p.set_access(
            &friend.id.to_string(),
            PrincipalType::Player,
            AccessLevel::Admin,
        );
        assert_eq!(compute(&evaluator(), &friend, &p, &identity), AccessLevel::Admin);
    }

    #[test]
    fn password_requires_session_unlock() {
        let identity = StubIdentity::default();
        let owner_id = Uuid::new_v4();
        let p = protection(ProtectionType::Password, &owner_id.to_string());

        let mut visitor = Actor::new(Uuid::new_v4(), "visitor");
        assert_eq!(compute(&evaluator(), &visitor, &p, &identity), AccessLevel::None);

        visitor.unlocked.insert(p.id);
        assert_eq!(compute(&evaluator(), &visitor, &p, &identity), AccessLevel::Player);

        // the owner still has to unlock, and then gets admin
        let mut owner = Actor::new(owner_id, "owner");
        assert_eq!(compute(&evaluator(), &owner, &p, &identity), AccessLevel::None);
        owner.unlocked.insert(p.id);
        assert_eq!(compute(&evaluator(), &owner, &p, &identity), AccessLevel::Admin);
    }

    #[test]
    fn private_owner_is_admin_stranger_is_none() {
        let identity = StubIdentity::default();
        let owner_id = Uuid::new_v4();
        let p = protection(ProtectionType::Private, &owner_id.to_string());

        let owner = Actor::new(owner_id, "owner");
        let stranger = Actor::new(Uuid::new_v4(), "stranger");
        assert_eq!(compute(&evaluator(), &owner, &p, &identity), AccessLevel::Admin);
        assert_eq!(compute(&evaluator(), &stranger, &p, &identity), AccessLevel::None);
    }

    #[test]
    fn private_matches_uuid_name_and_group_grants() {
        let mut identity = StubIdentity::default();
        let p_owner = Uuid::new_v4().to_string();

        // uuid grant
        let by_id = Actor::new(Uuid::new_v4(), "ById");
        let mut p = protection(ProtectionType::Private, &p_owner);
        p.set_access(&by_id.id.to_string(), PrincipalType::Player, AccessLevel::Player);
        assert_eq!(compute(&evaluator(), &by_id, &p, &identity), AccessLevel::Player);

        // name grant, case-insensitive
        let by_name = Actor::new(Uuid::new_v4(), "ByName");
        let mut p = protection(ProtectionType::Private, &p_owner);
        p.set_access("byname", PrincipalType::Player, AccessLevel::Admin);
        assert_eq!(compute(&evaluator(), &by_name, &p, &identity), AccessLevel::Admin);

        // group grant
        let by_group = Actor::new(Uuid::new_v4(), "ByGroup");
        identity
            .groups
            .insert(by_group.id, vec!["builders".to_string()]);
        let mut p = protection(ProtectionType::Private, &p_owner);
        p.set_access("Builders", PrincipalType::Group, AccessLevel::Player);
        assert_eq!(compute(&evaluator(), &by_group, &p, &identity), AccessLevel::Player);
    }

    #[test]
    fn private_item_key_matches_held_type() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut registry = BlockTypeRegistry::new();
        let key_id = registry.get_or_create_id(&store, "TRIPWIRE_HOOK");

        let identity = StubIdentity::default();
        let mut holder = Actor::new(Uuid::new_v4(), "holder");
        holder.held_item = Some("tripwire_hook".to_string());

        let mut p = protection(ProtectionType::Private, &Uuid::new_v4().to_string());
        p.set_access(&key_id.to_string(), PrincipalType::Item, AccessLevel::Player);

        let evaluator = evaluator();
        assert_eq!(
            evaluator.compute_access(Some(&holder), Some(&p), &identity, &registry),
            AccessLevel::Player
        );

        // empty hands: no key, no access
        holder.held_item = None;
        assert_eq!(
            evaluator.compute_access(Some(&holder), Some(&p), &identity, &registry),
            AccessLevel::None
        );
    }

    // -- hooks ----------------------------------------------------------

    struct ElevatingHook(AccessLevel);

    impl AccessHook for ElevatingHook {
        fn name(&self) -> &'static str {
            "elevating"
        }

        fn on_access_override(
            &self,
            _actor: &Actor,
            _protection: &Protection,
            _current: AccessLevel,
        ) -> Result<Option<AccessLevel>> {
            Ok(Some(self.0))
        }
    }

    struct FailingHook;

    impl AccessHook for FailingHook {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn on_access_override(
            &self,
            _actor: &Actor,
            _protection: &Protection,
            _current: AccessLevel,
        ) -> Result<Option<AccessLevel>> {
            Err(crate::WardenError::Config("boom".to_string()))
        }
    }

    #[test]
    fn hooks_elevate_but_never_demote() {
        let identity = StubIdentity::default();
        let stranger = Actor::new(Uuid::new_v4(), "stranger");
        let p = protection(ProtectionType::Private, &Uuid::new_v4().to_string());

        let mut evaluator = evaluator();
        evaluator.register_hook(Box::new(ElevatingHook(AccessLevel::Player)));
        assert_eq!(compute(&evaluator, &stranger, &p, &identity), AccessLevel::Player);

        // a hook returning a lower level than another hook changes nothing
        evaluator.register_hook(Box::new(ElevatingHook(AccessLevel::None)));
        assert_eq!(compute(&evaluator, &stranger, &p, &identity), AccessLevel::Player);

        // owners are unaffected by low hook results
        let p_public = protection(ProtectionType::Public, &Uuid::new_v4().to_string());
        assert_eq!(
            compute(&evaluator, &stranger, &p_public, &identity),
            AccessLevel::Player
        );
    }

    #[test]
    fn failing_hook_skips_without_breaking_the_chain() {
        let identity = StubIdentity::default();
        let stranger = Actor::new(Uuid::new_v4(), "stranger");
        let p = protection(ProtectionType::Private, &Uuid::new_v4().to_string());

        let mut evaluator = evaluator();
        evaluator.register_hook(Box::new(FailingHook));
        evaluator.register_hook(Box::new(ElevatingHook(AccessLevel::Admin)));

        assert_eq!(compute(&evaluator, &stranger, &p, &identity), AccessLevel::Admin);
    }

    #[test]
    fn exemption_flag_does_not_affect_access() {
        let identity = StubIdentity::default();
        let stranger = Actor::new(Uuid::new_v4(), "stranger");
        let mut p = protection(ProtectionType::Public, &Uuid::new_v4().to_string());
        p.set_flag(Flag::Exemption);
        assert_eq!(compute(&evaluator(), &stranger, &p, &identity), AccessLevel::Player);
    }
}
