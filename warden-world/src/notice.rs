//! User-facing access notices.
//!
//! The core reports enforcement outcomes through the
//! [`Notifier`] seam; this implementation renders them as chat lines and
//! hands them to a transport sink owned by the server (action bar, chat,
//! console). Message wording can be overridden per block type; everything
//! else falls back to the general templates.

use std::collections::HashMap;

use uuid::Uuid;
use warden_core::types::ProtectionType;
use warden_core::{Actor, Notifier, Protection, Site};

/// Renders access notices and pushes them into a transport sink.
pub struct ChannelNotifier {
    sink: Box<dyn FnMut(Uuid, String)>,
    /// Per-block-type wording for the "protected" notice. Keys are block
    /// type names, upper-cased.
    protected_overrides: HashMap<String, String>,
}

impl std::fmt::Debug for ChannelNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelNotifier")
            .field("protected_overrides", &self.protected_overrides.len())
            .finish_non_exhaustive()
    }
}

impl ChannelNotifier {
    /// Create a notifier that delivers lines through `sink`.
    #[must_use]
    pub fn new(sink: Box<dyn FnMut(Uuid, String)>) -> Self {
        Self {
            sink,
            protected_overrides: HashMap::new(),
        }
    }

    /// Override the "protected" notice wording for one block type. The
    /// placeholders `{type}` and `{owner}` are substituted.
    pub fn set_protected_message(&mut self, block_type: &str, template: impl Into<String>) {
        self.protected_overrides
            .insert(block_type.to_ascii_uppercase(), template.into());
    }

    fn protected_line(&self, actor: &Actor, protection: &Protection, site: &Site) -> String {
        let owner = if protection.is_owner(actor.id, &actor.name) {
            "you".to_string()
        } else {
            protection.owner.clone()
        };
        let block = site.block_type.as_deref().unwrap_or("block");

        let template = site
            .block_type
            .as_deref()
            .and_then(|ty| self.protected_overrides.get(&ty.to_ascii_uppercase()));
        match template {
            Some(template) => template
                .replace("{type}", &protection.kind.to_string())
                .replace("{owner}", &owner),
            None => format!(
                "{} is protected ({}) by {owner}",
                block.to_lowercase(),
                protection.kind
            ),
        }
    }

    fn locked_line(protection: &Protection, site: &Site) -> String {
        let block = site
            .block_type
            .as_deref()
            .unwrap_or("block")
            .to_lowercase();
        match protection.kind {
            ProtectionType::Password => {
                format!("this {block} is locked with a password")
            }
            _ => format!(
                "this {block} is locked by {owner}",
                owner = protection.owner
            ),
        }
    }
}

impl Notifier for ChannelNotifier {
    fn notify_access(&mut self, actor: &Actor, protection: &Protection, site: &Site, granted: bool) {
        let line = if granted {
            self.protected_line(actor, protection, site)
        } else {
            Self::locked_line(protection, site)
        };
        (self.sink)(actor.id, line);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
