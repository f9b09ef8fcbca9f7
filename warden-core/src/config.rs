//! Configuration for the warden protection system.
//!
//! Maps directly to `warden.toml`. Every section has serde defaults so a
//! partial (or empty) file yields a fully usable configuration.

use serde::{Deserialize, Serialize};

/// Top-level warden configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Protection cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Access evaluation and notice behavior.
    #[serde(default)]
    pub access: AccessConfig,
    /// SQLite store settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Bulk removal settings.
    #[serde(default)]
    pub purge: PurgeConfig,
}

impl WardenConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `WardenError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::WardenError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Protection cache sizing and growth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base capacity of the primary (id-keyed) cache.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// How much adaptive capacity is added per pressure event.
    #[serde(default = "default_adaptive_increment")]
    pub adaptive_increment: usize,
    /// Hard ceiling on adaptive capacity.
    #[serde(default = "default_adaptive_max")]
    pub adaptive_max: usize,
    /// Independent capacity of the known-absent (negative) cache.
    #[serde(default = "default_negative_floor")]
    pub negative_floor: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            adaptive_increment: 10,
            adaptive_max: 100_000,
            negative_floor: 10_000,
        }
    }
}

/// Access evaluation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Whether the environment's operator flag grants super-admin.
    #[serde(default = "default_true")]
    pub op_is_admin: bool,
    /// Permission node granting super-admin.
    #[serde(default = "default_admin_node")]
    pub admin_node: String,
    /// Permission node granting the weaker moderator override.
    #[serde(default = "default_mod_node")]
    pub mod_node: String,
    /// Whether access notices are emitted at all.
    #[serde(default = "default_true")]
    pub show_notices: bool,
    /// Whether owners see notices for their own protections.
    #[serde(default = "default_true")]
    pub show_own_notices: bool,
    /// Block type names whose notices are suppressed.
    #[serde(default)]
    pub quiet_types: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            op_is_admin: true,
            admin_node: "warden.admin".to_string(),
            mod_node: "warden.mod".to_string(),
            show_notices: true,
            show_own_notices: true,
            quiet_types: Vec::new(),
        }
    }
}

/// SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
    /// Queued saves are flushed once this many are pending.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5_000,
            flush_threshold: 64,
        }
    }
}

/// Bulk removal behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Ids deleted per SQL statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Rows scanned between progress reports.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    /// Block-type ids that bulk removal never touches.
    #[serde(default)]
    pub exempt_block_ids: Vec<i32>,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            progress_interval: 100_000,
            exempt_block_ids: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_admin_node() -> String {
    "warden.admin".to_string()
}
fn default_mod_node() -> String {
    "warden.mod".to_string()
}
fn default_capacity() -> usize {
    10_000
}
fn default_adaptive_increment() -> usize {
    10
}
fn default_adaptive_max() -> usize {
    100_000
}
fn default_negative_floor() -> usize {
    10_000
}
fn default_busy_timeout() -> u32 {
    5_000
}
fn default_flush_threshold() -> usize {
    64
}
fn default_batch_size() -> usize {
    10_000
}
fn default_progress_interval() -> usize {
    100_000
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = WardenConfig::from_toml("").expect("parse");
        assert_eq!(config.cache.capacity, 10_000);
        assert_eq!(config.cache.adaptive_increment, 10);
        assert_eq!(config.cache.adaptive_max, 100_000);
        assert!(config.access.op_is_admin);
        assert_eq!(config.purge.batch_size, 10_000);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = WardenConfig::from_toml(
            "[cache]\ncapacity = 2\nadaptive_increment = 10\n\n[access]\nquiet_types = [\"sign\"]\n",
        )
        .expect("parse");
        assert_eq!(config.cache.capacity, 2);
        assert_eq!(config.cache.negative_floor, 10_000);
        assert_eq!(config.access.quiet_types, vec!["sign".to_string()]);
        assert!(config.access.show_notices);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = WardenConfig::from_toml("cache = 3").expect_err("must fail");
        assert!(matches!(err, crate::WardenError::Config(_)));
    }
}
