//! Key-value persistence for client-side state that must outlive a single process run.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::RwLock;

/// Well-known storage keys.
pub mod keys {
    pub const USER_EMAIL: &str = "plantopia_user_email";
    pub const USER_NAME: &str = "plantopia_user_name";
    pub const USER_AVATAR: &str = "plantopia_user_avatar";
    pub const USER_ID: &str = "plantopia_user_id";
    pub const FAVOURITE_PLANTS: &str = "favourite_plants";
    pub const GUIDE_FAVOURITES: &str = "plantopia_guide_favourites";
    pub const FAVOURITES_REFRESH_AT: &str = "favourites_refresh_at";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid ttl: {0:?}")]
    InvalidTtl(Duration),
}

/// Untyped string storage with optional per-entry expiry.
///
/// Expired entries behave exactly like missing ones.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed JSON accessors on top of [`LocalStorage`].
#[async_trait]
pub trait LocalStorageExt: LocalStorage {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw, ttl).await
    }
}

impl<S: LocalStorage + ?Sized> LocalStorageExt for S {}

pub(crate) fn expiry_from_ttl(ttl: Option<Duration>) -> Result<Option<DateTime<Utc>>, StorageError> {
    ttl.map(|ttl| {
        chrono::Duration::from_std(ttl)
            .map(|d| Utc::now() + d)
            .map_err(|_| StorageError::InvalidTtl(ttl))
    })
    .transpose()
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local storage, used for tests and for sessions that should not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let expires_at = expiry_from_ttl(ttl)?;
        self.entries.write().await.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_ttl_expiry() {
        let storage = MemoryStorage::new();
        storage
            .set_raw("short", "v", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        storage
            .set_raw("long", "v", Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(storage.get_raw("short").await.unwrap().is_none());
        assert_eq!(storage.get_raw("long").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_garbage_json_is_serde_error() {
        let storage = MemoryStorage::new();
        storage
            .set_raw(keys::FAVOURITE_PLANTS, "not json", None)
            .await
            .unwrap();

        let err = storage
            .get_json::<Vec<String>>(keys::FAVOURITE_PLANTS)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Serde(_)));
    }
}
