//! # SQLite Key-Value Store
//!
//! Persisted storage backend for the route cache.
//!
//! Values live in a single `kv_store` table. The database size can be capped
//! with [`SqliteStore::with_max_pages`]; once the cap is reached SQLite
//! reports "database or disk is full", which surfaces as
//! [`StorageError::QuotaExceeded`] so the cache falls back to memory.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqlResult};

use crate::error::StorageError;
use crate::storage::KeyValueStore;

/// Key-value store persisted in SQLite.
pub struct SqliteStore {
    /// Database connection
    db: Connection,

    /// Database path (":memory:" for in-memory stores)
    db_path: String,
}

impl SqliteStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at the given database path.
    pub fn open(db_path: &str) -> SqlResult<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;

        log::info!("[SqliteStore] Opened key-value store at {}", db_path);

        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqlResult<Self> {
        Self::open(":memory:")
    }

    /// Cap the database at `max_pages` pages.
    ///
    /// SQLite never shrinks the cap below the current page count.
    pub fn with_max_pages(self, max_pages: u32) -> SqlResult<Self> {
        let applied: i64 =
            self.db
                .query_row(&format!("PRAGMA max_page_count = {}", max_pages), [], |row| {
                    row.get(0)
                })?;
        log::debug!(
            "[SqliteStore] max_page_count requested {} applied {}",
            max_pages,
            applied
        );
        Ok(self)
    }

    /// Database path this store was opened with.
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
    }
}

fn map_sql_error(err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::DiskFull => {
            StorageError::QuotaExceeded
        }
        other => StorageError::Backend(other.to_string()),
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.db
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_error)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db
            .execute(
                "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
                params![key, value],
            )
            .map(|_| ())
            .map_err(map_sql_error)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.db
            .execute("DELETE FROM kv_store WHERE key = ?", params![key])
            .map(|_| ())
            .map_err(map_sql_error)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .db
            .prepare("SELECT key FROM kv_store")
            .map_err(map_sql_error)?;

        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sql_error)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(keys)
    }
}
