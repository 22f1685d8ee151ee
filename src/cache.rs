//! Snapshot-token keyed playlist cache.
//!
//! A playlist only needs re-fetching when its snapshot id changed. Entries
//! live in an injected key-value store; cache failures are logged and
//! treated as misses, never surfaced to the caller.

use rusqlite::{params, Connection, OptionalExtension};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::CacheError;

pub const CACHE_VERSION: &str = "v1";
pub const CACHE_KEY_PREFIX: &str = "spotify_playlist_cache";

// ============================================================================
// Key-Value Stores
// ============================================================================

/// Minimal string key-value store the cache is built on.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<bool, CacheError>;
    /// Remove every key starting with `prefix`, returning how many were removed.
    fn clear(&self, prefix: &str) -> Result<usize, CacheError>;
    fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        (**self).remove(key)
    }

    fn clear(&self, prefix: &str) -> Result<usize, CacheError> {
        (**self).clear(prefix)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        (**self).keys(prefix)
    }
}

/// In-process store, used for ephemeral runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<FxHashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn clear(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let mut keys: Vec<String> = entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// SQLite-backed store with a single `kv` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }
}

/// `LIKE` pattern matching keys that start with `prefix`.
fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

impl SnapshotStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn clear(&self, prefix: &str) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM kv WHERE key LIKE ?1 ESCAPE '\\'",
            params![like_prefix(prefix)],
        )?;
        Ok(removed)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key")?;
        let keys = stmt
            .query_map(params![like_prefix(prefix)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

// ============================================================================
// Playlist Cache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPlaylist<T> {
    pub snapshot_id: String,
    pub data: T,
    /// Unix epoch milliseconds
    pub cached_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub size_kb: usize,
}

pub struct PlaylistCache<S> {
    store: S,
    namespace: &'static str,
}

impl<S: SnapshotStore> PlaylistCache<S> {
    /// Cache for playlist metadata.
    pub fn new(store: S) -> Self {
        Self::with_namespace(store, "")
    }

    /// Cache whose keys carry an extra namespace, e.g. `tracks:<id>`, so several
    /// kinds of per-playlist data can share one store.
    pub fn with_namespace(store: S, namespace: &'static str) -> Self {
        Self { store, namespace }
    }

    fn version_prefix() -> String {
        format!("{}_{}_", CACHE_KEY_PREFIX, CACHE_VERSION)
    }

    fn key(&self, playlist_id: &str) -> String {
        if self.namespace.is_empty() {
            format!("{}{}", Self::version_prefix(), playlist_id)
        } else {
            format!("{}{}:{}", Self::version_prefix(), self.namespace, playlist_id)
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// True unless a cached entry exists with the same snapshot id.
    pub fn needs_refresh(&self, playlist_id: &str, current_snapshot_id: &str) -> bool {
        match self.read_snapshot_id(playlist_id) {
            Some(snapshot_id) => snapshot_id != current_snapshot_id,
            None => true,
        }
    }

    fn read_snapshot_id(&self, playlist_id: &str) -> Option<String> {
        #[derive(Deserialize)]
        struct SnapshotOnly {
            snapshot_id: String,
        }
        let raw = self.read_raw(playlist_id)?;
        serde_json::from_str::<SnapshotOnly>(&raw)
            .map(|s| s.snapshot_id)
            .ok()
    }

    fn read_raw(&self, playlist_id: &str) -> Option<String> {
        match self.store.get(&self.key(playlist_id)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read playlist cache: {}", e);
                None
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, playlist_id: &str) -> Option<CachedPlaylist<T>> {
        let raw = self.read_raw(playlist_id)?;
        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                debug!("Discarding unreadable cache entry for {}: {}", playlist_id, e);
                None
            }
        }
    }

    /// Cached data, only if its snapshot id matches the current one.
    pub fn get_fresh<T: DeserializeOwned>(&self, playlist_id: &str, current_snapshot_id: &str) -> Option<T> {
        self.get::<T>(playlist_id)
            .filter(|cached| cached.snapshot_id == current_snapshot_id)
            .map(|cached| cached.data)
    }

    pub fn put<T: Serialize>(&self, playlist_id: &str, snapshot_id: &str, data: &T) {
        let entry = CachedPlaylist {
            snapshot_id: snapshot_id.to_string(),
            data,
            cached_at: chrono::Utc::now().timestamp_millis(),
        };
        let result = serde_json::to_string(&entry)
            .map_err(CacheError::from)
            .and_then(|json| self.store.set(&self.key(playlist_id), &json));
        if let Err(e) = result {
            warn!("Failed to cache playlist: {}", e);
        }
    }

    /// Clear all current-version entries. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.store.clear(&Self::version_prefix()).unwrap_or_else(|e| {
            warn!("Failed to clear playlist cache: {}", e);
            0
        })
    }

    /// Remove entries written by older cache versions.
    pub fn clear_old_versions(&self) -> usize {
        let current = Self::version_prefix();
        let keys = match self.store.keys(CACHE_KEY_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to clear old cache versions: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| !k.starts_with(&current)) {
            match self.store.remove(key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to remove stale cache key {}: {}", key, e),
            }
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let keys = match self.store.keys(&Self::version_prefix()) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to read cache stats: {}", e);
                return CacheStats::default();
            }
        };

        let total_size: usize = keys
            .iter()
            .filter_map(|k| self.store.get(k).ok().flatten())
            .map(|v| v.len())
            .sum();

        CacheStats {
            total: keys.len(),
            size_kb: (total_size as f64 / 1024.0).round() as usize,
        }
    }
}
