//! Low-friction user identity used to scope favourites on the server.

use std::sync::Arc;

use db::storage::{LocalStorage, StorageError, keys};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid email: {0}")]
    InvalidEmail(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub user_id: Option<i64>,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            avatar: None,
            user_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

fn normalize_email(raw: &str) -> Result<String, IdentityError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(IdentityError::InvalidEmail(raw.to_string())),
    }
}

/// Current identity, persisted to local storage and published on a watch channel.
pub struct IdentitySession {
    storage: Arc<dyn LocalStorage>,
    tx: watch::Sender<Option<Identity>>,
}

impl IdentitySession {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { storage, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Restore a previously persisted identity. Missing or malformed entries mean anonymous.
    pub async fn load(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(raw_email) = self.storage.get_raw(keys::USER_EMAIL).await? else {
            return Ok(None);
        };
        let email = match normalize_email(&raw_email) {
            Ok(email) => email,
            Err(e) => {
                warn!(error = %e, "Discarding stored identity");
                return Ok(None);
            }
        };

        let identity = Identity {
            email,
            name: self.storage.get_raw(keys::USER_NAME).await?,
            avatar: self.storage.get_raw(keys::USER_AVATAR).await?,
            user_id: self
                .storage
                .get_raw(keys::USER_ID)
                .await?
                .and_then(|raw| raw.trim().parse().ok()),
        };
        self.tx.send_replace(Some(identity.clone()));
        Ok(Some(identity))
    }

    pub async fn sign_in(&self, identity: Identity) -> Result<Identity, IdentityError> {
        let identity = Identity {
            email: normalize_email(&identity.email)?,
            ..identity
        };

        self.storage
            .set_raw(keys::USER_EMAIL, &identity.email, None)
            .await?;
        self.store_optional(keys::USER_NAME, identity.name.as_deref())
            .await?;
        self.store_optional(keys::USER_AVATAR, identity.avatar.as_deref())
            .await?;
        let user_id = identity.user_id.map(|id| id.to_string());
        self.store_optional(keys::USER_ID, user_id.as_deref())
            .await?;

        info!(email = %identity.email, "Signed in");
        self.tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn store_optional(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        match value {
            Some(value) => self.storage.set_raw(key, value, None).await,
            None => self.storage.remove(key).await,
        }
    }

    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        for key in [keys::USER_EMAIL, keys::USER_NAME, keys::USER_AVATAR, keys::USER_ID] {
            self.storage.remove(key).await?;
        }
        info!("Signed out");
        self.tx.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use db::storage::MemoryStorage;

    use super::*;

    #[tokio::test]
    async fn test_sign_in_persists_and_publishes() {
        let storage: Arc<dyn LocalStorage> = Arc::new(MemoryStorage::new());
        let session = IdentitySession::new(storage.clone());
        let mut rx = session.subscribe();

        let identity = session
            .sign_in(Identity::new("  Gardener@Example.com ").with_name("Sam"))
            .await
            .unwrap();
        assert_eq!(identity.email, "gardener@example.com");

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|i| i.email.as_str()), Some("gardener@example.com"));

        let restored = IdentitySession::new(storage);
        let loaded = restored.load().await.unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("Sam"));
        assert_eq!(restored.current(), Some(loaded));
    }

    #[tokio::test]
    async fn test_sign_out_clears_storage() {
        let storage: Arc<dyn LocalStorage> = Arc::new(MemoryStorage::new());
        let session = IdentitySession::new(storage.clone());
        session.sign_in(Identity::new("a@b.c")).await.unwrap();
        session.sign_out().await.unwrap();

        assert_eq!(session.current(), None);
        assert!(storage.get_raw(keys::USER_EMAIL).await.unwrap().is_none());
        assert!(IdentitySession::new(storage).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_malformed_email() {
        let session = IdentitySession::new(Arc::new(MemoryStorage::new()));
        let err = session.sign_in(Identity::new("not-an-email")).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidEmail(_)));
        assert_eq!(session.current(), None);
    }
}
