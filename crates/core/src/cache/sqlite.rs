//! SQLite-backed identity cache implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheError, IdentityCache};
use crate::record::InfoHash;

/// SQLite-backed identity cache.
///
/// The connection sits behind a mutex so concurrent source runs serialize
/// their writes to the store.
pub struct SqliteIdentityCache {
    conn: Mutex<Connection>,
}

impl SqliteIdentityCache {
    /// Open (or create) the cache database at `path`.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS identity_cache (
                source_link TEXT PRIMARY KEY,
                info_hash TEXT NOT NULL,
                resolved_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_identity_cache_hash ON identity_cache(info_hash);
            "#,
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Database("connection mutex poisoned".to_string()))
    }
}

impl IdentityCache for SqliteIdentityCache {
    fn get(&self, source_link: &str) -> Result<Option<InfoHash>, CacheError> {
        let conn = self.lock()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT info_hash FROM identity_cache WHERE source_link = ?",
                params![source_link],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CacheError::Database(e.to_string()))?;

        stored
            .map(|hash| {
                InfoHash::from_hex(&hash).map_err(|e| CacheError::CorruptEntry {
                    source_link: source_link.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn insert(&self, source_link: &str, identity: &InfoHash) -> Result<bool, CacheError> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO identity_cache (source_link, info_hash, resolved_at)
                 VALUES (?, ?, ?)",
                params![source_link, identity.as_str(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(inserted == 1)
    }

    fn retain_identities(&self, live: &HashSet<InfoHash>) -> Result<usize, CacheError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| CacheError::Database(e.to_string()))?;

        let stale: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT source_link, info_hash FROM identity_cache")
                .map_err(|e| CacheError::Database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(|e| CacheError::Database(e.to_string()))?;

            let mut stale = Vec::new();
            for row in rows {
                let (source_link, hash) = row.map_err(|e| CacheError::Database(e.to_string()))?;
                let is_live = InfoHash::from_hex(&hash)
                    .map(|h| live.contains(&h))
                    .unwrap_or(false);
                if !is_live {
                    stale.push(source_link);
                }
            }
            stale
        };

        for source_link in &stale {
            tx.execute(
                "DELETE FROM identity_cache WHERE source_link = ?",
                params![source_link],
            )
            .map_err(|e| CacheError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(stale.len())
    }

    fn len(&self) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM identity_cache", [], |row| row.get(0))
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(count as usize)
    }
}
