//! Result cache.
//!
//! A plain get/set key-value store holding two classes of entries, both keyed
//! by content hashes of the canonical query:
//!
//! ```text
//! {render_key} -> Concrete { content, mimetype, cubes, definition }   one exact rendering
//! {data_key}   -> Base     { data, cubes, definition }                reusable long-form table
//! ```
//!
//! # Design
//!
//! - No TTL and no versioning; entries persist until overwritten or cleared
//! - Writers overwrite, never merge; last writer for a key wins
//! - The two writes of one request are independent, either may be seen alone
//!
//! Two backends: [`SqliteCache`] persists to a file (or memory, for tests),
//! [`MemoryCache`] is a process-local concurrent map.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache connection lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

// ============================================================================
// Entries
// ============================================================================

/// A cached value, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheEntry {
    Concrete(ConcreteEntry),
    Base(BaseEntry),
}

/// A fully rendered response for one exact canonical query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteEntry {
    pub content: String,
    pub mimetype: String,
    pub cubes: Vec<String>,
    /// The full canonical query.
    pub definition: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urlquery: Option<String>,
}

/// The long-form table shared by every presentation of one data definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEntry {
    /// Encoded long-form table; see `LongTable::to_blob`.
    pub data: String,
    pub cubes: Vec<String>,
    /// The data-defining subset of the canonical query.
    pub definition: serde_json::Value,
}

impl CacheEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheEntry::Concrete(_) => "concrete",
            CacheEntry::Base(_) => "base",
        }
    }
}

/// Key-value store for cache entries.
///
/// Implementations must tolerate concurrent readers and writers; no
/// transactional guarantee spans more than one call.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()>;
}

impl<T: ResultCache + ?Sized> ResultCache for Box<T> {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()> {
        (**self).set(key, entry)
    }
}

impl<T: ResultCache + ?Sized> ResultCache for &T {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()> {
        (**self).set(key, entry)
    }
}

// ============================================================================
// SQLite backend
// ============================================================================

/// SQLite-backed result cache.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open or create the cache database at `path`.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;
        Ok(cache)
    }

    /// Default location of the cache database: `~/.tabular/cache.db`.
    pub fn default_path() -> CacheResult<PathBuf> {
        let base = dirs::home_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join(".tabular").join("cache.db"))
    }

    fn init(&self) -> CacheResult<()> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Delete a single entry.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        let rows = self
            .lock()?
            .execute("DELETE FROM entries WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    /// Remove every entry.
    pub fn clear_all(&self) -> CacheResult<usize> {
        Ok(self.lock()?.execute("DELETE FROM entries", [])?)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let conn = self.lock()?;
        let count = |kind: &str| -> CacheResult<usize> {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE kind = ?",
                params![kind],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        };
        let concrete_entries = count("concrete")?;
        let base_entries = count("base")?;

        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM entries",
            [],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            concrete_entries,
            base_entries,
            total_size_bytes: total_size as usize,
        })
    }
}

impl ResultCache for SqliteCache {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let json: Option<String> = self
            .lock()?
            .query_row(
                "SELECT value FROM entries WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()> {
        let json = serde_json::to_string(entry)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.lock()?.execute(
            "INSERT OR REPLACE INTO entries (key, kind, value, created_at) VALUES (?, ?, ?, ?)",
            params![key, entry.kind(), json, now],
        )?;
        Ok(())
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub concrete_entries: usize,
    pub base_entries: usize,
    /// Total size of all stored values in bytes.
    pub total_size_bytes: usize,
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local result cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()> {
        self.entries.insert(key.to_string(), entry.clone());
        Ok(())
    }
}

// ============================================================================
// Index scoping
// ============================================================================

/// Scopes every key of an inner cache under an index name, so several fact
/// indexes can share one backend.
pub struct IndexedCache<C> {
    index: String,
    inner: C,
}

impl<C: ResultCache> IndexedCache<C> {
    pub fn new(index: impl Into<String>, inner: C) -> Self {
        Self {
            index: index.into(),
            inner,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}/{}", self.index, key)
    }
}

impl<C: ResultCache> ResultCache for IndexedCache<C> {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        self.inner.get(&self.scoped(key))
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()> {
        self.inner.set(&self.scoped(key), entry)
    }
}
