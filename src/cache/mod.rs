//! Keyed cache shared by every job instance
//!
//! Writes always target an exact key and replace the previous blob
//! atomically. Reads try the exact key first, then each fallback prefix in
//! order; a prefix hit is a partial warm rather than a miss.

pub mod archive;
pub mod keys;

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteCacheStore;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from cache backends and archiving
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache path '{0}' must be relative to the workspace and stay inside it")]
    InvalidPath(String),

    #[error("cache path '{0}' does not exist")]
    MissingPath(PathBuf),

    #[error("cache task failed: {0}")]
    Task(String),
}

/// Result of a cache restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The exact key was stored
    Hit { key: String, blob: Vec<u8> },
    /// A fallback prefix matched `key`
    Partial {
        prefix: String,
        key: String,
        blob: Vec<u8>,
    },
    Miss,
}

impl CacheLookup {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }

    /// Stored key that produced this lookup, if any
    pub fn matched_key(&self) -> Option<&str> {
        match self {
            CacheLookup::Hit { key, .. } | CacheLookup::Partial { key, .. } => Some(key),
            CacheLookup::Miss => None,
        }
    }

    pub fn blob(&self) -> Option<&[u8]> {
        match self {
            CacheLookup::Hit { blob, .. } | CacheLookup::Partial { blob, .. } => Some(blob),
            CacheLookup::Miss => None,
        }
    }
}

/// Trait for cache backends
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Blob stored under exactly `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Most recently written entry whose key starts with `prefix`
    async fn latest_with_prefix(&self, prefix: &str)
        -> Result<Option<(String, Vec<u8>)>, CacheError>;

    /// Store `blob` under `key`, replacing any previous value
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError>;

    /// Exact key first, then each fallback prefix in the caller's order
    async fn restore(&self, key: &str, fallbacks: &[String]) -> Result<CacheLookup, CacheError> {
        if let Some(blob) = self.get(key).await? {
            return Ok(CacheLookup::Hit {
                key: key.to_string(),
                blob,
            });
        }

        for prefix in fallbacks.iter().filter(|p| !p.is_empty()) {
            if let Some((matched, blob)) = self.latest_with_prefix(prefix).await? {
                return Ok(CacheLookup::Partial {
                    prefix: prefix.clone(),
                    key: matched,
                    blob,
                });
            }
        }

        Ok(CacheLookup::Miss)
    }

    /// Write under the exact resolved key
    async fn save(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError> {
        self.put(key, blob).await
    }
}

struct Entry {
    seq: u64,
    blob: Vec<u8>,
}

/// In-memory cache (for testing or a single ephemeral run)
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    seq: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|e| e.blob.clone()))
    }

    async fn latest_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<(String, Vec<u8>)>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, _)| keys::matches_prefix(key, prefix))
            .max_by_key(|(_, entry)| entry.seq)
            .map(|(key, entry)| (key.clone(), entry.blob.clone())))
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        entries.insert(key.to_string(), Entry { seq, blob });
        Ok(())
    }
}
