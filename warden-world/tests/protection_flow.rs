//! End-to-end flow across the integration layer: sessions feeding actor
//! descriptors into the core evaluator, and notices flowing back out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use uuid::Uuid;
use warden_core::config::WardenConfig;
use warden_core::store::NewProtection;
use warden_core::types::{AccessLevel, LocationKey, ProtectionType};
use warden_core::{Identity, Warden};
use warden_world::{ChannelNotifier, SessionMap, block_site, entity_site};
use warden_world::environment::Environment;

#[derive(Default)]
struct NobodySpecial;

impl Identity for NobodySpecial {
    fn is_operator(&self, _id: Uuid) -> bool {
        false
    }

    fn has_node(&self, _id: Uuid, _node: &str) -> bool {
        false
    }

    fn groups_of(&self, _id: Uuid) -> Vec<String> {
        Vec::new()
    }

    fn lookup_name(&self, _name: &str) -> Option<Uuid> {
        None
    }
}

struct MapWorld {
    blocks: HashMap<LocationKey, String>,
}

impl Environment for MapWorld {
    fn block_type_name(&self, key: &LocationKey) -> Option<String> {
        self.blocks.get(key).cloned()
    }

    fn world_exists(&self, world: &str) -> bool {
        world == "world"
    }
}

#[test]
fn password_chest_session_flow() {
    let mut warden = Warden::open_in_memory(WardenConfig::default()).expect("open");
    let mut sessions = SessionMap::new();
    let identity = NobodySpecial;

    let lines = Rc::new(RefCell::new(Vec::new()));
    let captured = Rc::clone(&lines);
    let mut notifier = ChannelNotifier::new(Box::new(move |_, line| {
        captured.borrow_mut().push(line);
    }));

    // the world has one password-locked chest
    let key = LocationKey::block("world", 3, 64, 3);
    let mut blocks = HashMap::new();
    blocks.insert(key.clone(), "CHEST".to_string());
    let world = MapWorld { blocks };

    let chest_type = warden.block_type_id("CHEST");
    let owner_id = Uuid::new_v4();
    let mut chest = warden
        .create_protection(NewProtection {
            kind: ProtectionType::Password,
            owner: owner_id.to_string(),
            world: "world".to_string(),
            x: 3,
            y: 64,
            z: 3,
            block_type_id: chest_type,
            password: Some("digest".to_string()),
            created: 1_700_000_000,
        })
        .expect("create");

    // a visitor connects and tries the chest: locked
    let visitor_id = Uuid::new_v4();
    sessions.begin(visitor_id, "Visitor", false);
    let visitor = sessions.actor(visitor_id).expect("actor");

    let site = block_site(&world, key.clone());
    let outcome = warden.enforce_access(
        &visitor,
        &mut chest,
        &site,
        AccessLevel::Player,
        &identity,
        Some(&mut notifier),
    );
    assert!(!outcome.granted);
    assert!(lines.borrow()[0].contains("password"), "{}", lines.borrow()[0]);

    // the right credential unlocks it for the rest of the session
    assert!(chest.password_matches("digest"));
    sessions.unlock(visitor_id, chest.id);
    let visitor = sessions.actor(visitor_id).expect("actor");

    let outcome = warden.enforce_access(
        &visitor,
        &mut chest,
        &site,
        AccessLevel::Player,
        &identity,
        Some(&mut notifier),
    );
    assert!(outcome.granted);
    assert_eq!(outcome.level, AccessLevel::Player);

    // session ends: the unlock dies with it
    sessions.end(visitor_id);
    sessions.begin(visitor_id, "Visitor", false);
    let visitor = sessions.actor(visitor_id).expect("actor");
    assert!(!warden.can_access(Some(&visitor), Some(&chest), &identity));
}

#[test]
fn entity_protections_use_synthetic_sites() {
    let mut warden = Warden::open_in_memory(WardenConfig::default()).expect("open");
    let identity = NobodySpecial;

    let horse = Uuid::new_v4();
    let site = entity_site("world", horse, "HORSE");
    let owner_id = Uuid::new_v4();

    let entity_type = warden.block_type_id("ENTITY");
    let protection = warden
        .create_protection(NewProtection {
            kind: ProtectionType::Private,
            owner: owner_id.to_string(),
            world: site.key.world.clone(),
            x: site.key.x,
            y: site.key.y,
            z: site.key.z,
            block_type_id: entity_type,
            password: None,
            created: 1_700_000_000,
        })
        .expect("create");

    // the same entity always resolves to the same protection
    let again = entity_site("world", horse, "HORSE");
    assert_eq!(
        warden.find_protection(&again.key).map(|p| p.id),
        Some(protection.id)
    );

    // and only the owner gets in
    let mut sessions = SessionMap::new();
    sessions.begin(owner_id, "Owner", false);
    let owner = sessions.actor(owner_id).expect("actor");
    assert!(warden.can_admin(Some(&owner), Some(&protection), &identity));

    let rando_id = Uuid::new_v4();
    sessions.begin(rando_id, "Rando", false);
    let rando = sessions.actor(rando_id).expect("actor");
    assert!(!warden.can_access(Some(&rando), Some(&protection), &identity));
}
