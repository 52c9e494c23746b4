//! Persistent store for aggregation cache entries
//!
//! Key-value persistence with expiry. [`SqliteCacheStore`] backs the running
//! service; [`MemoryCacheStore`] is used in tests and when no database path
//! is configured.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A stored cache entry; `data_json` holds the serialized payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCacheEntry {
    pub cache_key: String,
    pub tab: String,
    pub language: String,
    pub model: String,
    pub data_json: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to acquire lock")]
    LockError,
}

pub trait CacheStore: Send + Sync {
    fn get(&self, cache_key: &str) -> Result<Option<StoredCacheEntry>, StoreError>;

    /// Insert or wholesale replace the entry under its key
    fn put(&self, entry: &StoredCacheEntry) -> Result<(), StoreError>;

    fn delete(&self, cache_key: &str) -> Result<bool, StoreError>;

    /// All entries, newest first
    fn list(&self) -> Result<Vec<StoredCacheEntry>, StoreError>;

    /// Delete entries expired at `now`; returns how many were removed
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    fn clear(&self) -> Result<usize, StoreError>;
}

/// SQLite-backed cache store
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (creating if needed) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path.as_ref())?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("Initialized cache store at: {}", db_path.as_ref().display());
        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS news_cache_entries (
                cache_key TEXT PRIMARY KEY,
                tab TEXT NOT NULL,
                language TEXT NOT NULL,
                model TEXT NOT NULL,
                data_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_news_cache_expires
            ON news_cache_entries(expires_at);
            "#,
        )?;

        Ok(())
    }
}

const SELECT_COLUMNS: &str =
    "SELECT cache_key, tab, language, model, data_json, created_at, expires_at FROM news_cache_entries";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<StoredCacheEntry> {
    Ok(StoredCacheEntry {
        cache_key: row.get(0)?,
        tab: row.get(1)?,
        language: row.get(2)?,
        model: row.get(3)?,
        data_json: row.get(4)?,
        created_at: from_millis(row.get(5)?),
        expires_at: from_millis(row.get(6)?),
    })
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, cache_key: &str) -> Result<Option<StoredCacheEntry>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let entry = conn
            .query_row(
                &format!("{} WHERE cache_key = ?1", SELECT_COLUMNS),
                params![cache_key],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn put(&self, entry: &StoredCacheEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO news_cache_entries
                (cache_key, tab, language, model, data_json, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entry.cache_key,
                entry.tab,
                entry.language,
                entry.model,
                entry.data_json,
                entry.created_at.timestamp_millis(),
                entry.expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, cache_key: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let deleted = conn.execute(
            "DELETE FROM news_cache_entries WHERE cache_key = ?1",
            params![cache_key],
        )?;
        Ok(deleted > 0)
    }

    fn list(&self) -> Result<Vec<StoredCacheEntry>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_COLUMNS))?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let deleted = conn.execute(
            "DELETE FROM news_cache_entries WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(deleted)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        Ok(conn.execute("DELETE FROM news_cache_entries", [])?)
    }
}

/// In-process cache store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: parking_lot::Mutex<HashMap<String, StoredCacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, cache_key: &str) -> Result<Option<StoredCacheEntry>, StoreError> {
        Ok(self.entries.lock().get(cache_key).cloned())
    }

    fn put(&self, entry: &StoredCacheEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(entry.cache_key.clone(), entry.clone());
        Ok(())
    }

    fn delete(&self, cache_key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().remove(cache_key).is_some())
    }

    fn list(&self) -> Result<Vec<StoredCacheEntry>, StoreError> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}
