//! SQLite-backed cache store, persistent across runs

use crate::cache::{CacheError, CacheStore};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// SQLite cache store
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// Open (and create if needed) a cache database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.init().await?;
        debug!("Opened cache database at {}", db_path.display());

        Ok(store)
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // every connection of an in-memory pool would see its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Default location: `<cache dir>/ci-runner/cache.db`
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ci-runner")
            .join("cache.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self, CacheError> {
        Self::new(&Self::default_path()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                blob BLOB NOT NULL,
                size INTEGER NOT NULL,
                written_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_written_at ON cache_entries(written_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let row = sqlx::query("SELECT blob FROM cache_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<Vec<u8>, _>("blob")))
    }

    async fn latest_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<(String, Vec<u8>)>, CacheError> {
        if prefix.is_empty() {
            return Ok(None);
        }

        // substr instead of LIKE so '%' and '_' in keys stay literal
        let row = sqlx::query(
            r#"
            SELECT key, blob FROM cache_entries
            WHERE substr(key, 1, length(?1)) = ?1
            ORDER BY written_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| (row.get::<String, _>("key"), row.get::<Vec<u8>, _>("blob"))))
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError> {
        let written_at = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let size = blob.len() as i64;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries (key, blob, size, written_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(key)
        .bind(blob)
        .bind(size)
        .bind(written_at)
        .execute(&self.pool)
        .await?;

        debug!("Stored cache entry '{}' ({} bytes)", key, size);
        Ok(())
    }
}
