use std::{path::Path, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::{debug, info};

pub mod models;
pub mod storage;

use models::local_entry::LocalEntry;
use storage::{LocalStorage, StorageError};

const CREATE_LOCAL_ENTRIES: &str = r#"CREATE TABLE IF NOT EXISTS local_entries (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    expires_at TEXT
)"#;

/// SQLite-backed local storage for identity, anonymous favourites and other client state.
#[derive(Clone)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    /// Open (or create) the database file at `path`.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!(path = %path.as_ref().display(), "Opened local storage");
        Self::init(pool).await
    }

    /// In-memory database; every pool connection would see its own empty database, so the
    /// pool is pinned to a single connection.
    pub async fn new_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::query(CREATE_LOCAL_ENTRIES).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LocalStorage for DBService {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(entry) = LocalEntry::find_by_key(&self.pool, key).await? else {
            return Ok(None);
        };
        if entry.is_expired(Utc::now()) {
            debug!(key, "Local entry expired, removing");
            LocalEntry::delete(&self.pool, key).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let expires_at = storage::expiry_from_ttl(ttl)?;
        LocalEntry::upsert(&self.pool, key, value, expires_at).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        LocalEntry::delete(&self.pool, key).await?;
        Ok(())
    }
}
