//! SQLite persistence for protection records and the block-type table.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS protections (
//!     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//!     world         TEXT NOT NULL,
//!     x             INTEGER NOT NULL,
//!     y             INTEGER NOT NULL,
//!     z             INTEGER NOT NULL,
//!     type          INTEGER NOT NULL,
//!     owner         TEXT NOT NULL,
//!     block_id      INTEGER NOT NULL DEFAULT -1,
//!     data          TEXT,
//!     password      TEXT,
//!     created       INTEGER NOT NULL,
//!     last_accessed INTEGER NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS blocks (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);
//! ```
//!
//! Grants and flags ride in the JSON `data` column so the relational schema
//! stays stable across grant-shape changes. The protection type is persisted
//! by ordinal. WAL mode keeps reads cheap while the simulation is running.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{Result, WardenError};
use crate::protection::Protection;
use crate::registry::UNKNOWN_BLOCK_TYPE;
use crate::types::{LocationKey, ProtectionId, ProtectionType};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS protections (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    world         TEXT NOT NULL,
    x             INTEGER NOT NULL,
    y             INTEGER NOT NULL,
    z             INTEGER NOT NULL,
    type          INTEGER NOT NULL,
    owner         TEXT NOT NULL,
    block_id      INTEGER NOT NULL DEFAULT -1,
    data          TEXT,
    password      TEXT,
    created       INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_protections_location ON protections (world, x, y, z);
CREATE INDEX IF NOT EXISTS idx_protections_owner ON protections (owner);
CREATE TABLE IF NOT EXISTS blocks (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
";

const ROW_COLUMNS: &str = "id, world, x, y, z, type, owner, block_id, data, password, created, last_accessed";

/// Fields for a protection that has not been registered yet.
#[derive(Debug, Clone)]
pub struct NewProtection {
    /// Protection mode.
    pub kind: ProtectionType,
    /// Owner principal (UUID string preferred).
    pub owner: String,
    /// World of the primary block.
    pub world: String,
    /// Primary block X.
    pub x: i32,
    /// Primary block Y.
    pub y: i32,
    /// Primary block Z.
    pub z: i32,
    /// Block-type id, [`UNKNOWN_BLOCK_TYPE`] when not known yet.
    pub block_type_id: i32,
    /// Password digest for [`ProtectionType::Password`] records.
    pub password: Option<String>,
    /// Registration time, epoch seconds.
    pub created: i64,
}

/// Row filter for scans and purges.
#[derive(Debug, Clone)]
pub enum ProtectionFilter {
    /// Every row.
    All,
    /// Rows whose owner matches the principal, case-insensitively. The
    /// principal may be a UUID string or a legacy display name.
    Owner(String),
    /// Rows in one world.
    World(String),
}

impl ProtectionFilter {
    fn where_clause(&self) -> (&'static str, Vec<String>) {
        match self {
            Self::All => ("", Vec::new()),
            Self::Owner(principal) => (
                " WHERE LOWER(owner) = LOWER(?1)",
                vec![principal.clone()],
            ),
            Self::World(world) => (" WHERE world = ?1", vec![world.clone()]),
        }
    }
}

/// Handle to an open SQLite database holding protections and block mappings.
pub struct SqliteStore {
    conn: Connection,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`; the schema is created when
    /// missing and WAL mode is enabled when configured.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(&format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "protection store opened"
        );

        Ok(Self { conn, db_path })
    }

    /// Open an in-memory database (tests, tooling).
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ------------------------------------------------------------------
    // Protections
    // ------------------------------------------------------------------

    /// Load the protection at a location, if any.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures,
    /// [`WardenError::MalformedRow`] if the stored row cannot be decoded.
    pub fn load_by_location(&self, world: &str, x: i32, y: i32, z: i32) -> Result<Option<Protection>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ROW_COLUMNS} FROM protections WHERE world = ?1 AND x = ?2 AND y = ?3 AND z = ?4"
        ))?;
        let row = stmt
            .query_row(params![world, x, y, z], decode_row)
            .optional()?;
        row.transpose()
    }

    /// Load the protection occupying a [`LocationKey`], if any.
    ///
    /// # Errors
    /// See [`SqliteStore::load_by_location`].
    pub fn load_by_key(&self, key: &LocationKey) -> Result<Option<Protection>> {
        self.load_by_location(&key.world, key.x, key.y, key.z)
    }

    /// Load a protection by id, if it exists.
    ///
    /// # Errors
    /// See [`SqliteStore::load_by_location`].
    pub fn load_by_id(&self, id: ProtectionId) -> Result<Option<Protection>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {ROW_COLUMNS} FROM protections WHERE id = ?1"))?;
        let row = stmt.query_row(params![id.0], decode_row).optional()?;
        row.transpose()
    }

    /// Register a new protection and return it with its assigned id.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn register(&self, new: NewProtection) -> Result<Protection> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO protections (world, x, y, z, type, owner, block_id, data, password, created, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9, ?9)",
        )?;
        stmt.execute(params![
            new.world,
            new.x,
            new.y,
            new.z,
            new.kind.ordinal(),
            new.owner,
            new.block_type_id,
            new.password,
            new.created,
        ])?;
        let id = ProtectionId(self.conn.last_insert_rowid());

        debug!(%id, world = %new.world, x = new.x, y = new.y, z = new.z, kind = %new.kind, "registered protection");

        Ok(Protection {
            id,
            world: new.world,
            x: new.x,
            y: new.y,
            z: new.z,
            extra_keys: Vec::new(),
            kind: new.kind,
            owner: new.owner,
            block_type_id: new.block_type_id,
            permissions: Vec::new(),
            flags: std::collections::HashSet::new(),
            password: new.password,
            created: new.created,
            last_accessed: new.created,
        })
    }

    /// Persist every mutable field of a protection.
    ///
    /// # Errors
    /// Returns [`WardenError::Serialization`] if the data payload cannot be
    /// encoded, [`WardenError::Database`] on SQLite failures.
    pub fn save(&self, protection: &Protection) -> Result<()> {
        let data = protection.data_json()?;
        let mut stmt = self.conn.prepare_cached(
            "UPDATE protections
             SET world = ?2, x = ?3, y = ?4, z = ?5, type = ?6, owner = ?7,
                 block_id = ?8, data = ?9, password = ?10, created = ?11, last_accessed = ?12
             WHERE id = ?1",
        )?;
        let changed = stmt.execute(params![
            protection.id.0,
            protection.world,
            protection.x,
            protection.y,
            protection.z,
            protection.kind.ordinal(),
            protection.owner,
            protection.block_type_id,
            data,
            protection.password,
            protection.created,
            protection.last_accessed,
        ])?;
        if changed == 0 {
            return Err(WardenError::ProtectionNotFound(protection.id));
        }
        Ok(())
    }

    /// Persist a batch of protections in one transaction. Returns how many
    /// rows were written.
    ///
    /// # Errors
    /// See [`SqliteStore::save`]; the transaction rolls back on failure.
    pub fn save_batch(&mut self, protections: &[Protection]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE protections
                 SET world = ?2, x = ?3, y = ?4, z = ?5, type = ?6, owner = ?7,
                     block_id = ?8, data = ?9, password = ?10, created = ?11, last_accessed = ?12
                 WHERE id = ?1",
            )?;
            for protection in protections {
                let data = protection.data_json()?;
                written += stmt.execute(params![
                    protection.id.0,
                    protection.world,
                    protection.x,
                    protection.y,
                    protection.z,
                    protection.kind.ordinal(),
                    protection.owner,
                    protection.block_type_id,
                    data,
                    protection.password,
                    protection.created,
                    protection.last_accessed,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Delete rows by id in fixed-size chunks (one statement per chunk) so a
    /// large purge never builds an unbounded statement. Returns rows deleted.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn delete_by_ids(&self, ids: &[ProtectionId], batch_size: usize) -> Result<usize> {
        let batch_size = batch_size.max(1);
        let mut deleted = 0;
        for chunk in ids.chunks(batch_size) {
            let mut sql = String::from("DELETE FROM protections WHERE id IN (");
            for (i, id) in chunk.iter().enumerate() {
                if i > 0 {
                    sql.push(',');
                }
                sql.push_str(&id.0.to_string());
            }
            sql.push(')');
            deleted += self.conn.execute(&sql, [])?;
        }
        Ok(deleted)
    }

    /// Stream matching protections row-at-a-time through `visit`, never
    /// materializing the result set. Malformed rows are logged and skipped;
    /// the scan continues. Returns (rows visited, rows skipped).
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures, or the first
    /// error returned by `visit`.
    pub fn scan<F>(&self, filter: &ProtectionFilter, mut visit: F) -> Result<(usize, usize)>
    where
        F: FnMut(Protection) -> Result<()>,
    {
        let (clause, args) = filter.where_clause();
        let sql = format!("SELECT {ROW_COLUMNS} FROM protections{clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(args.iter());
        let mut rows = stmt.query(params)?;

        let mut visited = 0;
        let mut skipped = 0;
        while let Some(row) = rows.next()? {
            match decode_row(row) {
                Ok(Ok(protection)) => {
                    visit(protection)?;
                    visited += 1;
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "skipping malformed protection row");
                    skipped += 1;
                }
                Err(err) => {
                    warn!(error = %err, "skipping unreadable protection row");
                    skipped += 1;
                }
            }
        }
        Ok((visited, skipped))
    }

    /// Total number of protection rows.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM protections", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Block-type table
    // ------------------------------------------------------------------

    /// All (id, name) block mappings.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn load_block_rows(&self) -> Result<Vec<(i32, String)>> {
        let mut stmt = self.conn.prepare_cached("SELECT id, name FROM blocks")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut mappings = Vec::new();
        for row in rows {
            mappings.push(row?);
        }
        Ok(mappings)
    }

    /// Insert a block mapping.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn insert_block(&self, id: i32, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO blocks (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(())
    }

    /// Delete a block mapping by id.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn delete_block(&self, id: i32) -> Result<()> {
        self.conn
            .execute("DELETE FROM blocks WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with the online-backup API; safe to
    /// run while the store is in use.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(dest = %dest_path.as_ref().display(), "protection store backup completed");
        Ok(())
    }

    /// Run `PRAGMA integrity_check`; `Ok(false)` means corruption.
    ///
    /// # Errors
    /// Returns [`WardenError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

/// Decode one protections row. The outer Result carries rusqlite column
/// errors (caught by the driver), the inner one semantic decode failures.
fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Protection>> {
    let id: i64 = row.get(0)?;
    let world: String = row.get(1)?;
    let x: i32 = row.get(2)?;
    let y: i32 = row.get(3)?;
    let z: i32 = row.get(4)?;
    let type_ordinal: i64 = row.get(5)?;
    let owner: String = row.get(6)?;
    let block_type_id: i32 = row.get::<_, Option<i32>>(7)?.unwrap_or(UNKNOWN_BLOCK_TYPE);
    let data: Option<String> = row.get(8)?;
    let password: Option<String> = row.get(9)?;
    let created: i64 = row.get(10)?;
    let last_accessed: i64 = row.get(11)?;

    let Some(kind) = ProtectionType::from_ordinal(type_ordinal) else {
        return Ok(Err(WardenError::MalformedRow {
            id,
            reason: format!("unknown protection type ordinal {type_ordinal}"),
        }));
    };

    let (permissions, flags) = match Protection::decode_data(data.as_deref()) {
        Ok(decoded) => decoded,
        Err(err) => {
            return Ok(Err(WardenError::MalformedRow {
                id,
                reason: err.to_string(),
            }));
        }
    };

    Ok(Ok(Protection {
        id: ProtectionId(id),
        world,
        x,
        y,
        z,
        extra_keys: Vec::new(),
        kind,
        owner,
        block_type_id,
        permissions,
        flags,
        password,
        created,
        last_accessed,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessLevel, Flag, PrincipalType};

    fn new_protection(world: &str, x: i32) -> NewProtection {
        NewProtection {
            kind: ProtectionType::Private,
            owner: "4f2cb1f0-98a1-43f5-9b81-3f44d23a3a09".to_string(),
            world: world.to_string(),
            x,
            y: 64,
            z: 0,
            block_type_id: 3,
            password: None,
            created: 1_700_000_000,
        }
    }

    #[test]
    fn register_then_load_round_trips() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut registered = store.register(new_protection("world", 5)).expect("register");

        registered.set_access("friend", PrincipalType::Player, AccessLevel::Player);
        registered.set_flag(Flag::Exemption);
        registered.touch(1_700_000_500);
        store.save(&registered).expect("save");

        let by_location = store
            .load_by_location("world", 5, 64, 0)
            .expect("load")
            .expect("found");
        assert_eq!(by_location, registered);

        let by_id = store
            .load_by_id(registered.id)
            .expect("load")
            .expect("found");
        assert_eq!(by_id.last_accessed, 1_700_000_500);
        assert!(by_id.has_flag(Flag::Exemption));
        assert_eq!(
            by_id.access_for("FRIEND", PrincipalType::Player),
            AccessLevel::Player
        );
    }

    #[test]
    fn load_missing_returns_none() {
        let store = SqliteStore::open_in_memory().expect("open");
        assert!(store
            .load_by_location("world", 0, 0, 0)
            .expect("load")
            .is_none());
        assert!(store.load_by_id(ProtectionId(42)).expect("load").is_none());
    }

    #[test]
    fn ids_are_monotonic() {
        let store = SqliteStore::open_in_memory().expect("open");
        let a = store.register(new_protection("world", 1)).expect("register");
        let b = store.register(new_protection("world", 2)).expect("register");
        assert!(b.id > a.id);
        assert_eq!(store.count().expect("count"), 2);
    }

    #[test]
    fn save_of_unknown_id_is_an_error() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut ghost = store.register(new_protection("world", 1)).expect("register");
        store.delete_by_ids(&[ghost.id], 100).expect("delete");
        ghost.touch(1);
        assert!(matches!(
            store.save(&ghost),
            Err(WardenError::ProtectionNotFound(_))
        ));
    }

    #[test]
    fn delete_by_ids_chunks() {
        let store = SqliteStore::open_in_memory().expect("open");
        let ids: Vec<ProtectionId> = (0..25)
            .map(|i| store.register(new_protection("world", i)).expect("register").id)
            .collect();

        // batch_size smaller than the id count forces several statements
        let deleted = store.delete_by_ids(&ids, 10).expect("delete");
        assert_eq!(deleted, 25);
        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn scan_filters_by_owner_case_insensitively() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut mine = new_protection("world", 1);
        mine.owner = "Notch".to_string();
        store.register(mine).expect("register");
        store.register(new_protection("world", 2)).expect("register");

        let mut seen = Vec::new();
        let (visited, skipped) = store
            .scan(&ProtectionFilter::Owner("notch".to_string()), |p| {
                seen.push(p.owner.clone());
                Ok(())
            })
            .expect("scan");
        assert_eq!(visited, 1);
        assert_eq!(skipped, 0);
        assert_eq!(seen, vec!["Notch".to_string()]);
    }

    #[test]
    fn scan_skips_malformed_rows() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.register(new_protection("world", 1)).expect("register");
        let bad = store.register(new_protection("world", 2)).expect("register");

        // Corrupt the second row: unknown type ordinal and broken JSON.
        store
            .conn
            .execute(
                "UPDATE protections SET type = 99, data = '{oops' WHERE id = ?1",
                params![bad.id.0],
            )
            .expect("corrupt");

        let mut visited_ids = Vec::new();
        let (visited, skipped) = store
            .scan(&ProtectionFilter::All, |p| {
                visited_ids.push(p.id);
                Ok(())
            })
            .expect("scan");
        assert_eq!(visited, 1);
        assert_eq!(skipped, 1);
        assert!(!visited_ids.contains(&bad.id));
    }

    #[test]
    fn block_rows_round_trip() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.insert_block(1, "STONE").expect("insert");
        store.insert_block(2, "DIRT").expect("insert");

        let mut rows = store.load_block_rows().expect("load");
        rows.sort();
        assert_eq!(rows, vec![(1, "STONE".to_string()), (2, "DIRT".to_string())]);

        store.delete_block(1).expect("delete");
        assert_eq!(store.load_block_rows().expect("load").len(), 1);
    }

    #[test]
    fn file_backup_and_integrity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("protections.db");
        let store =
            SqliteStore::open(&db_path, &PersistenceConfig::default()).expect("open");
        store.register(new_protection("world", 1)).expect("register");
        assert!(store.integrity_check().expect("check"));

        let backup_path = dir.path().join("protections_backup.db");
        store.backup(&backup_path).expect("backup");

        let restored =
            SqliteStore::open(&backup_path, &PersistenceConfig::default()).expect("open backup");
        assert_eq!(restored.count().expect("count"), 1);
    }
}
