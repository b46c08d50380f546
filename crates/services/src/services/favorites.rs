//! Favourite sets that reconcile an anonymous local set with the server-held one.
//!
//! A store starts `Anonymous`, reading and writing the local set. The first time an identity
//! is available it moves to `Reconciling`, pushes the local entries to the server and adopts
//! the union the server returns, then clears the local set and settles in `ServerBacked`. A
//! failed merge drops it back to `Anonymous` so the next attempt starts from scratch. The
//! server-backed set belongs to the email it was reconciled for; a different identity
//! re-scopes the store and reconciles again.
//!
//! Toggles are optimistic: the in-memory set changes first and is not rolled back when the
//! server call fails. The error is still returned to the caller.

use std::{
    collections::BTreeSet,
    fmt::Display,
    hash::Hash,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use db::{
    models::guide::GuideKey,
    storage::{LocalStorage, LocalStorageExt, StorageError, keys},
};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::{
    api_client::{ApiClient, ApiError},
    identity::Identity,
    loading::{LoadingState, LoadingTracker},
};

#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    Anonymous = 0,
    Reconciling = 1,
    ServerBacked = 2,
}

impl From<u8> for SyncState {
    fn from(v: u8) -> Self {
        match v {
            1 => SyncState::Reconciling,
            2 => SyncState::ServerBacked,
            _ => SyncState::Anonymous,
        }
    }
}

/// Server side of a favourite set, scoped by email.
#[async_trait]
pub trait FavoriteBackend: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Ord + Display + FromStr + Send + Sync + 'static;

    /// Local storage entry holding the anonymous set
    const LOCAL_KEY: &'static str;
    /// Whether successful mutations stamp `favourites_refresh_at`
    const STAMP_REFRESH: bool = false;

    async fn fetch(&self, email: &str) -> Result<Vec<Self::Key>, ApiError>;

    async fn add(&self, email: &str, key: &Self::Key) -> Result<(), ApiError>;

    async fn remove(&self, email: &str, key: &Self::Key) -> Result<(), ApiError>;

    /// Push `local` to the server and return the merged server set.
    async fn merge(&self, email: &str, local: &[Self::Key]) -> Result<Vec<Self::Key>, ApiError>;
}

/// Plant favourites keyed by server plant id; merged through `/favorites/sync`.
#[derive(Clone)]
pub struct PlantFavoritesApi {
    client: ApiClient,
}

impl PlantFavoritesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FavoriteBackend for PlantFavoritesApi {
    type Key = i64;

    const LOCAL_KEY: &'static str = keys::FAVOURITE_PLANTS;

    async fn fetch(&self, email: &str) -> Result<Vec<i64>, ApiError> {
        let records = self.client.favorites_by_email(email).await?;
        Ok(records.into_iter().map(|r| r.plant_id).collect())
    }

    async fn add(&self, email: &str, key: &i64) -> Result<(), ApiError> {
        self.client.add_favorite(email, *key).await
    }

    async fn remove(&self, email: &str, key: &i64) -> Result<(), ApiError> {
        self.client.remove_favorite(email, *key).await
    }

    async fn merge(&self, email: &str, local: &[i64]) -> Result<Vec<i64>, ApiError> {
        let records = self.client.sync_favorites(email, local).await?;
        Ok(records.into_iter().map(|r| r.plant_id).collect())
    }
}

/// Guide favourites keyed by `(category, filename)`. There is no batch endpoint, so a merge
/// adds each local entry the server lacks and then re-reads the server set.
#[derive(Clone)]
pub struct GuideFavoritesApi {
    client: ApiClient,
}

impl GuideFavoritesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FavoriteBackend for GuideFavoritesApi {
    type Key = GuideKey;

    const LOCAL_KEY: &'static str = keys::GUIDE_FAVOURITES;
    const STAMP_REFRESH: bool = true;

    async fn fetch(&self, email: &str) -> Result<Vec<GuideKey>, ApiError> {
        let records = self.client.guide_favorites(email).await?;
        Ok(records.iter().map(GuideKey::from).collect())
    }

    async fn add(&self, email: &str, key: &GuideKey) -> Result<(), ApiError> {
        let category = Some(key.category.as_str()).filter(|c| !c.is_empty());
        self.client
            .add_guide_favorite(email, &key.filename, category)
            .await
    }

    async fn remove(&self, email: &str, key: &GuideKey) -> Result<(), ApiError> {
        self.client.remove_guide_favorite(email, &key.filename).await
    }

    async fn merge(&self, email: &str, local: &[GuideKey]) -> Result<Vec<GuideKey>, ApiError> {
        let existing: BTreeSet<GuideKey> = self.fetch(email).await?.into_iter().collect();
        for key in local.iter().filter(|k| !existing.contains(*k)) {
            self.add(email, key).await?;
        }
        self.fetch(email).await
    }
}

pub struct FavoriteStore<B: FavoriteBackend> {
    backend: B,
    storage: Arc<dyn LocalStorage>,
    identity: watch::Receiver<Option<Identity>>,
    set: DashSet<B::Key>,
    state: AtomicU8,
    /// Email the server-backed set belongs to. Held for the whole reconciliation so a
    /// second caller sees the first one's outcome.
    reconciled_for: Mutex<Option<String>>,
    loading: LoadingTracker,
}

pub type PlantFavorites = FavoriteStore<PlantFavoritesApi>;
pub type GuideFavorites = FavoriteStore<GuideFavoritesApi>;

impl<B: FavoriteBackend> FavoriteStore<B> {
    pub fn new(
        backend: B,
        storage: Arc<dyn LocalStorage>,
        identity: watch::Receiver<Option<Identity>>,
    ) -> Self {
        Self {
            backend,
            storage,
            identity,
            set: DashSet::new(),
            state: AtomicU8::new(SyncState::Anonymous as u8),
            reconciled_for: Mutex::new(None),
            loading: LoadingTracker::new(),
        }
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn loading_state(&self) -> LoadingState {
        self.loading.snapshot()
    }

    fn email(&self) -> Option<String> {
        self.identity.borrow().as_ref().map(|i| i.email.clone())
    }

    pub fn is_favorite(&self, key: &B::Key) -> bool {
        self.set.contains(key)
    }

    /// Sorted snapshot of the current set.
    pub fn favorites(&self) -> Vec<B::Key> {
        let sorted: BTreeSet<B::Key> = self.set.iter().map(|k| k.key().clone()).collect();
        sorted.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn replace_all(&self, keys: impl IntoIterator<Item = B::Key>) {
        self.set.clear();
        for key in keys {
            self.set.insert(key);
        }
    }

    /// Whether the in-memory set is the server set of `email`.
    async fn is_backed_for(&self, email: &str) -> bool {
        self.sync_state() == SyncState::ServerBacked
            && self.reconciled_for.lock().await.as_deref() == Some(email)
    }

    /// Undecodable content reads as an empty set; any other storage failure is returned.
    async fn read_local(&self) -> Result<Vec<B::Key>, StorageError> {
        let raw: Vec<String> = match self.storage.get_json(B::LOCAL_KEY).await {
            Ok(raw) => raw.unwrap_or_default(),
            Err(StorageError::Serde(e)) => {
                warn!(error = %e, local_key = B::LOCAL_KEY, "Ignoring unreadable local favourites");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(raw
            .iter()
            .filter_map(|entry| match entry.parse::<B::Key>() {
                Ok(key) => Some(key),
                Err(_) => {
                    warn!(entry = %entry, local_key = B::LOCAL_KEY, "Dropping unparseable local favourite");
                    None
                }
            })
            .collect())
    }

    async fn write_local(&self, keys: &[B::Key]) -> Result<(), StorageError> {
        let raw: Vec<String> = keys.iter().map(ToString::to_string).collect();
        self.storage.set_json(B::LOCAL_KEY, &raw, None).await
    }

    /// Replace the in-memory set with the anonymous local set. If storage cannot be read the
    /// set is left as it is.
    pub async fn load_local(&self) {
        match self.read_local().await {
            Ok(local) => {
                debug!(count = local.len(), local_key = B::LOCAL_KEY, "Loaded local favourites");
                self.replace_all(local);
            }
            Err(e) => warn!(error = %e, local_key = B::LOCAL_KEY, "Failed to read local favourites"),
        }
    }

    /// Refresh from the server when an identity exists, reconciling first if that has not
    /// happened yet. Without an identity this reloads the local set.
    pub async fn load_from_server(&self) -> Result<(), FavoritesError> {
        let Some(email) = self.email() else {
            self.load_local().await;
            return Ok(());
        };
        if !self.is_backed_for(&email).await {
            return self.sync_local_to_server().await;
        }

        self.loading.begin();
        match self.backend.fetch(&email).await {
            Ok(keys) => {
                self.replace_all(keys);
                self.loading.succeed();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load favourites from server");
                self.loading.fail(&e);
                Err(e.into())
            }
        }
    }

    /// Flip `key` and return whether it is now a favourite.
    pub async fn toggle(&self, key: B::Key) -> Result<bool, FavoritesError> {
        let email = self.email();
        let backed = match &email {
            Some(email) => self.is_backed_for(email).await,
            None => false,
        };

        let now_favorite = if self.set.remove(&key).is_some() {
            false
        } else {
            self.set.insert(key.clone());
            true
        };

        let Some(email) = email else {
            self.write_local(&self.favorites()).await?;
            return Ok(now_favorite);
        };

        // A merge is still pending, so the local set must see this toggle too.
        if !backed {
            let mut local = self.read_local().await?;
            local.retain(|k| k != &key);
            if now_favorite {
                local.push(key.clone());
            }
            self.write_local(&local).await?;
        }

        let result = if now_favorite {
            self.backend.add(&email, &key).await
        } else {
            self.backend.remove(&email, &key).await
        };

        match result {
            Ok(()) => {
                self.stamp_refresh().await;
                Ok(now_favorite)
            }
            Err(e) => {
                warn!(key = %key, favorite = now_favorite, error = %e, "Favourite change not saved on server");
                Err(e.into())
            }
        }
    }

    async fn stamp_refresh(&self) {
        if !B::STAMP_REFRESH {
            return;
        }
        let now = Utc::now().to_rfc3339();
        if let Err(e) = self
            .storage
            .set_raw(keys::FAVOURITES_REFRESH_AT, &now, None)
            .await
        {
            warn!(error = %e, "Failed to stamp favourites refresh time");
        }
    }

    /// Merge the anonymous local set into the server set. Runs at most once per identity:
    /// without an identity, or once server-backed for the current email, this does nothing.
    /// A set backed for a different email is dropped and the new identity reconciled.
    pub async fn sync_local_to_server(&self) -> Result<(), FavoritesError> {
        let Some(email) = self.email() else {
            return Ok(());
        };
        let mut reconciled_for = self.reconciled_for.lock().await;
        if self.sync_state() == SyncState::ServerBacked {
            if reconciled_for.as_deref() == Some(email.as_str()) {
                debug!(email = %email, "Favourites already reconciled");
                return Ok(());
            }
            info!(
                previous = reconciled_for.as_deref().unwrap_or_default(),
                email = %email,
                local_key = B::LOCAL_KEY,
                "Identity changed, re-scoping favourites"
            );
            *reconciled_for = None;
            self.set.clear();
            self.set_state(SyncState::Anonymous);
        }
        if self
            .state
            .compare_exchange(
                SyncState::Anonymous as u8,
                SyncState::Reconciling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(state = ?self.sync_state(), "Favourites already reconciling");
            return Ok(());
        }

        self.loading.begin();
        match self.reconcile(&email).await {
            Ok(count) => {
                *reconciled_for = Some(email.clone());
                self.set_state(SyncState::ServerBacked);
                self.loading.succeed();
                info!(email = %email, count, local_key = B::LOCAL_KEY, "Favourites reconciled with server");
                Ok(())
            }
            Err(e) => {
                self.set_state(SyncState::Anonymous);
                warn!(email = %email, error = %e, "Favourites reconciliation failed, will retry");
                self.loading.fail(&e);
                Err(e)
            }
        }
    }

    /// A local set that cannot be read aborts the merge so it is never cleared unseen.
    async fn reconcile(&self, email: &str) -> Result<usize, FavoritesError> {
        let local = self.read_local().await?;
        let server = if local.is_empty() {
            self.backend.fetch(email).await?
        } else {
            self.backend.merge(email, &local).await?
        };

        let merged: BTreeSet<B::Key> = server.into_iter().chain(local).collect();
        let count = merged.len();
        self.replace_all(merged);

        if let Err(e) = self.storage.remove(B::LOCAL_KEY).await {
            warn!(error = %e, local_key = B::LOCAL_KEY, "Failed to clear local favourites after merge");
        }
        Ok(count)
    }

    /// Back to anonymous after sign-out; the in-memory set falls back to the local one.
    pub async fn reset(&self) {
        *self.reconciled_for.lock().await = None;
        self.set_state(SyncState::Anonymous);
        self.load_local().await;
    }
}

#[cfg(test)]
mod tests {
    use db::storage::MemoryStorage;

    use super::*;
    use crate::services::test_support::{FakeFavorites, FlakyStorage, TEST_EMAIL};

    struct Harness {
        store: FavoriteStore<FakeFavorites>,
        storage: Arc<dyn LocalStorage>,
        identity: watch::Sender<Option<Identity>>,
    }

    fn harness(backend: FakeFavorites) -> Harness {
        harness_with(backend, Arc::new(MemoryStorage::new()))
    }

    fn harness_with(backend: FakeFavorites, storage: Arc<dyn LocalStorage>) -> Harness {
        let (identity, rx) = watch::channel(None);
        Harness {
            store: FavoriteStore::new(backend, storage.clone(), rx),
            storage,
            identity,
        }
    }

    fn sign_in(h: &Harness) {
        h.identity.send_replace(Some(Identity::new(TEST_EMAIL)));
    }

    async fn local_entries(h: &Harness) -> Option<Vec<String>> {
        h.storage.get_json(keys::FAVOURITE_PLANTS).await.unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_toggle_persists_locally() {
        let h = harness(FakeFavorites::default());

        assert!(h.store.toggle(7).await.unwrap());
        assert!(h.store.toggle(3).await.unwrap());
        assert!(h.store.is_favorite(&7));
        assert_eq!(local_entries(&h).await, Some(vec!["3".into(), "7".into()]));

        assert!(!h.store.toggle(7).await.unwrap());
        assert_eq!(local_entries(&h).await, Some(vec!["3".into()]));
        assert_eq!(h.store.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_is_a_union_and_clears_local() {
        let h = harness(FakeFavorites::with_server([2, 3, 4]));
        h.storage
            .set_json(keys::FAVOURITE_PLANTS, &vec!["1", "2", "3"], None)
            .await
            .unwrap();
        h.store.load_local().await;
        sign_in(&h);

        h.store.sync_local_to_server().await.unwrap();

        assert_eq!(h.store.favorites(), vec![1, 2, 3, 4]);
        assert_eq!(h.store.sync_state(), SyncState::ServerBacked);
        assert_eq!(local_entries(&h).await, None);
        assert_eq!(h.store.backend.merge_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_runs_once_per_identity() {
        let h = harness(FakeFavorites::with_server([5]));
        h.storage
            .set_json(keys::FAVOURITE_PLANTS, &vec!["1"], None)
            .await
            .unwrap();
        sign_in(&h);

        let (a, b) = tokio::join!(
            h.store.sync_local_to_server(),
            h.store.sync_local_to_server()
        );
        a.unwrap();
        b.unwrap();
        h.store.sync_local_to_server().await.unwrap();

        assert_eq!(h.store.backend.merge_count(), 1);
        assert_eq!(h.store.favorites(), vec![1, 5]);
    }

    #[tokio::test]
    async fn test_identity_switch_rescopes_set() {
        let other = "neighbour@example.com";
        let h = harness(FakeFavorites::with_server([1]).with_server_for(other, [7, 8]));
        sign_in(&h);
        h.store.sync_local_to_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![1]);

        h.identity.send_replace(Some(Identity::new(other)));
        h.store.sync_local_to_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![7, 8]);
        assert_eq!(h.store.sync_state(), SyncState::ServerBacked);

        h.store.toggle(9).await.unwrap();
        assert!(h.store.backend.server_has_for(other, 9));
        assert!(!h.store.backend.server_has(9));
        assert!(!h.store.backend.server_has_for(other, 1));
    }

    #[tokio::test]
    async fn test_load_from_server_after_identity_switch() {
        let other = "neighbour@example.com";
        let h = harness(FakeFavorites::with_server([1]).with_server_for(other, [4]));
        sign_in(&h);
        h.store.load_from_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![1]);

        h.identity.send_replace(Some(Identity::new(other)));
        h.store.load_from_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![4]);
    }

    #[tokio::test]
    async fn test_unreadable_storage_keeps_local_set() {
        let flaky = Arc::new(FlakyStorage::default());
        let h = harness_with(FakeFavorites::with_server([2]), flaky.clone());
        h.storage
            .set_json(keys::FAVOURITE_PLANTS, &vec!["1"], None)
            .await
            .unwrap();
        sign_in(&h);

        flaky.set_fail_reads(true);
        let err = h.store.sync_local_to_server().await.unwrap_err();
        assert!(matches!(err, FavoritesError::Storage(StorageError::Database(_))));
        assert_eq!(h.store.sync_state(), SyncState::Anonymous);
        assert_eq!(h.store.backend.call_count(), 0);

        flaky.set_fail_reads(false);
        assert_eq!(local_entries(&h).await, Some(vec!["1".into()]));
        h.store.sync_local_to_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_garbage_local_entry_reads_as_empty() {
        let h = harness(FakeFavorites::with_server([3]));
        h.storage
            .set_raw(keys::FAVOURITE_PLANTS, "not json", None)
            .await
            .unwrap();
        sign_in(&h);

        h.store.sync_local_to_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![3]);
        assert_eq!(h.store.backend.merge_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_without_identity_is_noop() {
        let h = harness(FakeFavorites::with_server([1]));
        h.store.sync_local_to_server().await.unwrap();
        assert_eq!(h.store.sync_state(), SyncState::Anonymous);
        assert_eq!(h.store.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_merge_returns_to_anonymous_and_retries() {
        let h = harness(FakeFavorites::with_server([9]));
        h.storage
            .set_json(keys::FAVOURITE_PLANTS, &vec!["1"], None)
            .await
            .unwrap();
        sign_in(&h);

        h.store.backend.set_offline(true);
        let err = h.store.sync_local_to_server().await.unwrap_err();
        assert!(matches!(err, FavoritesError::Api(ApiError::Network(_))));
        assert_eq!(h.store.sync_state(), SyncState::Anonymous);
        assert_eq!(local_entries(&h).await, Some(vec!["1".into()]));
        assert!(h.store.loading_state().error.is_some());

        h.store.backend.set_offline(false);
        h.store.sync_local_to_server().await.unwrap();
        assert_eq!(h.store.sync_state(), SyncState::ServerBacked);
        assert_eq!(h.store.favorites(), vec![1, 9]);
    }

    #[tokio::test]
    async fn test_offline_toggle_is_not_rolled_back() {
        let h = harness(FakeFavorites::default());
        sign_in(&h);
        h.store.sync_local_to_server().await.unwrap();

        h.store.backend.set_offline(true);
        let err = h.store.toggle(42).await.unwrap_err();
        assert!(matches!(err, FavoritesError::Api(ApiError::Network(_))));
        assert!(h.store.is_favorite(&42));
        assert!(!h.store.backend.server_has(42));
    }

    #[tokio::test]
    async fn test_server_backed_toggle_skips_local() {
        let h = harness(FakeFavorites::default());
        sign_in(&h);
        h.store.sync_local_to_server().await.unwrap();

        h.store.toggle(8).await.unwrap();
        assert!(h.store.backend.server_has(8));
        assert_eq!(local_entries(&h).await, None);

        h.store.toggle(8).await.unwrap();
        assert!(!h.store.backend.server_has(8));
        assert!(!h.store.is_favorite(&8));
    }

    #[tokio::test]
    async fn test_pending_merge_records_toggle_locally() {
        let h = harness(FakeFavorites::default());
        sign_in(&h);

        h.store.toggle(11).await.unwrap();
        assert_eq!(local_entries(&h).await, Some(vec!["11".into()]));
        assert!(h.store.backend.server_has(11));
    }

    #[tokio::test]
    async fn test_invalid_local_entries_are_dropped() {
        let h = harness(FakeFavorites::default());
        h.storage
            .set_json(keys::FAVOURITE_PLANTS, &vec!["4", "basil_0", "6"], None)
            .await
            .unwrap();
        sign_in(&h);

        h.store.sync_local_to_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![4, 6]);
    }

    #[tokio::test]
    async fn test_reset_returns_to_local_set() {
        let h = harness(FakeFavorites::with_server([1, 2]));
        sign_in(&h);
        h.store.load_from_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![1, 2]);

        h.identity.send_replace(None);
        h.store.reset().await;
        assert_eq!(h.store.sync_state(), SyncState::Anonymous);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_server_when_backed() {
        let h = harness(FakeFavorites::with_server([3]));
        sign_in(&h);
        h.store.sync_local_to_server().await.unwrap();

        h.store.backend.insert_on_server(10);
        h.store.load_from_server().await.unwrap();
        assert_eq!(h.store.favorites(), vec![3, 10]);
        assert!(h.store.loading_state().initialized);
    }
}
