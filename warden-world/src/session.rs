//! Per-actor session state.
//!
//! Password protections are unlocked per session: an actor who presents the
//! right credential once keeps access to that specific protection until the
//! session ends. The map also carries the transient actor facts the
//! evaluator wants (held item, operator flag) so call sites can build an
//! [`Actor`] descriptor in one step.
//!
//! Sessions are owned by whoever owns the [`SessionMap`]; there is no
//! process-wide registry.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;
use warden_core::Actor;
use warden_core::types::ProtectionId;

/// One actor's session.
#[derive(Debug, Default, Clone)]
pub struct Session {
    /// Display name at login.
    pub name: String,
    /// Environment operator flag.
    pub op: bool,
    /// Type name of the currently held item.
    pub held_item: Option<String>,
    /// Password protections unlocked this session.
    pub unlocked: HashSet<ProtectionId>,
}

/// Session state for every connected actor.
#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: HashMap<Uuid, Session>,
}

impl SessionMap {
    /// Create an empty session map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or reset) a session for an actor.
    pub fn begin(&mut self, id: Uuid, name: impl Into<String>, op: bool) {
        let name = name.into();
        debug!(%id, %name, "session started");
        self.sessions.insert(
            id,
            Session {
                name,
                op,
                ..Session::default()
            },
        );
    }

    /// End an actor's session, dropping its unlocks.
    pub fn end(&mut self, id: Uuid) {
        if self.sessions.remove(&id).is_some() {
            debug!(%id, "session ended");
        }
    }

    /// The session for an actor, if one is active.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Record what the actor is holding right now.
    pub fn set_held_item(&mut self, id: Uuid, item: Option<String>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.held_item = item;
        }
    }

    /// Grant this session access to a password protection. Returns false if
    /// it was already unlocked or no session is active.
    pub fn unlock(&mut self, id: Uuid, protection: ProtectionId) -> bool {
        self.sessions
            .get_mut(&id)
            .is_some_and(|session| session.unlocked.insert(protection))
    }

    /// Revoke a previously granted unlock. Returns false if it was not held.
    pub fn lock(&mut self, id: Uuid, protection: ProtectionId) -> bool {
        self.sessions
            .get_mut(&id)
            .is_some_and(|session| session.unlocked.remove(&protection))
    }

    /// Whether the actor's session has unlocked a protection.
    #[must_use]
    pub fn is_unlocked(&self, id: Uuid, protection: ProtectionId) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|session| session.unlocked.contains(&protection))
    }

    /// Drop every unlock for one actor without ending the session (e.g. on
    /// world change).
    pub fn clear_unlocks(&mut self, id: Uuid) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.unlocked.clear();
        }
    }

    /// Number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Build the evaluator's [`Actor`] descriptor from an actor's session.
    /// Returns `None` when no session is active.
    #[must_use]
    pub fn actor(&self, id: Uuid) -> Option<Actor> {
        self.sessions.get(&id).map(|session| Actor {
            id,
            name: session.name.clone(),
            op: session.op,
            held_item: session.held_item.clone(),
            unlocked: session.unlocked.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
