//! In-process fakes and a throwaway HTTP server shared by the service tests.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use db::{
    models::{
        api_plant::{ApiPaginatedPlantsResponse, ApiPlantData},
        guide::{GuideCategory, GuideFileSummary, GuideKey},
    },
    storage::{LocalStorage, MemoryStorage, StorageError, keys},
};
use tokio::{net::TcpListener, sync::Notify};

use super::{
    api_client::{ApiError, PageQuery},
    catalog::CatalogBackend,
    favorites::FavoriteBackend,
    guides::GuideBackend,
};

/// Serve `router` on an ephemeral port and return its base URL.
pub(crate) async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Memory storage whose reads can be made to fail like a busy database.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryStorage,
    fail_reads: AtomicBool,
}

impl FlakyStorage {
    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalStorage for FlakyStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.get_raw(key).await
    }

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.inner.set_raw(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

fn offline() -> ApiError {
    ApiError::Network("connection refused".into())
}

/// Catalog backend that fabricates `total` plants per filter.
pub(crate) struct FakeCatalog {
    total: AtomicU64,
    delay: Duration,
    requests: Mutex<Vec<PageQuery>>,
    failing: Mutex<HashSet<u32>>,
    blocked: Option<(u32, Arc<Notify>, Arc<Notify>)>,
}

impl FakeCatalog {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            blocked: None,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests for `page` signal `entered` and then wait for `release`.
    pub(crate) fn block_on_page(mut self, page: u32, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.blocked = Some((page, entered, release));
        self
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub(crate) fn fail_page(&self, page: u32) {
        self.failing.lock().unwrap().insert(page);
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub(crate) fn requests(&self) -> Vec<PageQuery> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogBackend for FakeCatalog {
    async fn fetch_page(&self, query: &PageQuery) -> Result<ApiPaginatedPlantsResponse, ApiError> {
        self.requests.lock().unwrap().push(query.clone());

        if let Some((page, entered, release)) = &self.blocked {
            if *page == query.page {
                entered.notify_one();
                release.notified().await;
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.lock().unwrap().contains(&query.page) {
            return Err(offline());
        }

        let total = self.total.load(Ordering::SeqCst);
        let start = u64::from(query.page - 1) * u64::from(query.limit);
        let count = total.saturating_sub(start).min(u64::from(query.limit));
        let category = query.category.as_deref().unwrap_or("all");
        let plants = (0..count)
            .map(|i| ApiPlantData {
                id: Some((start + i) as i64),
                plant_name: format!("{category} {}-{i}", query.page),
                plant_category: "herb".to_string(),
                ..Default::default()
            })
            .collect();

        Ok(ApiPaginatedPlantsResponse {
            plants,
            total_count: Some(total),
            page: Some(query.page),
            limit: Some(query.limit),
            ..Default::default()
        })
    }
}

/// Email every favourites test signs in with unless it names another one.
pub(crate) const TEST_EMAIL: &str = "grower@example.com";

/// Favourite backend holding one server set per email in memory. `merge` returns the union.
pub(crate) struct FakeFavorites<K = i64> {
    server: Mutex<BTreeMap<String, BTreeSet<K>>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    merges: AtomicUsize,
}

impl<K: Ord> Default for FakeFavorites<K> {
    fn default() -> Self {
        Self {
            server: Mutex::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            merges: AtomicUsize::new(0),
        }
    }
}

impl<K: Ord + Clone> FakeFavorites<K> {
    /// Seed the set of [`TEST_EMAIL`].
    pub(crate) fn with_server(keys: impl IntoIterator<Item = K>) -> Self {
        Self::default().with_server_for(TEST_EMAIL, keys)
    }

    pub(crate) fn with_server_for(self, email: &str, keys: impl IntoIterator<Item = K>) -> Self {
        self.server
            .lock()
            .unwrap()
            .entry(email.to_string())
            .or_default()
            .extend(keys);
        self
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn server_has(&self, key: K) -> bool {
        self.server_has_for(TEST_EMAIL, key)
    }

    pub(crate) fn server_has_for(&self, email: &str, key: K) -> bool {
        self.server
            .lock()
            .unwrap()
            .get(email)
            .is_some_and(|set| set.contains(&key))
    }

    pub(crate) fn insert_on_server(&self, key: K) {
        self.server
            .lock()
            .unwrap()
            .entry(TEST_EMAIL.to_string())
            .or_default()
            .insert(key);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn merge_count(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            Err(offline())
        } else {
            Ok(())
        }
    }

    fn fake_fetch(&self, email: &str) -> Result<Vec<K>, ApiError> {
        self.enter()?;
        let server = self.server.lock().unwrap();
        Ok(server
            .get(email)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn fake_add(&self, email: &str, key: &K) -> Result<(), ApiError> {
        self.enter()?;
        self.server
            .lock()
            .unwrap()
            .entry(email.to_string())
            .or_default()
            .insert(key.clone());
        Ok(())
    }

    fn fake_remove(&self, email: &str, key: &K) -> Result<(), ApiError> {
        self.enter()?;
        if let Some(set) = self.server.lock().unwrap().get_mut(email) {
            set.remove(key);
        }
        Ok(())
    }

    fn fake_merge(&self, email: &str, local: &[K]) -> Result<Vec<K>, ApiError> {
        self.enter()?;
        self.merges.fetch_add(1, Ordering::SeqCst);
        let mut server = self.server.lock().unwrap();
        let set = server.entry(email.to_string()).or_default();
        set.extend(local.iter().cloned());
        Ok(set.iter().cloned().collect())
    }
}

#[async_trait]
impl FavoriteBackend for FakeFavorites<i64> {
    type Key = i64;

    const LOCAL_KEY: &'static str = keys::FAVOURITE_PLANTS;

    async fn fetch(&self, email: &str) -> Result<Vec<i64>, ApiError> {
        self.fake_fetch(email)
    }

    async fn add(&self, email: &str, key: &i64) -> Result<(), ApiError> {
        self.fake_add(email, key)
    }

    async fn remove(&self, email: &str, key: &i64) -> Result<(), ApiError> {
        self.fake_remove(email, key)
    }

    async fn merge(&self, email: &str, local: &[i64]) -> Result<Vec<i64>, ApiError> {
        self.fake_merge(email, local)
    }
}

#[async_trait]
impl FavoriteBackend for FakeFavorites<GuideKey> {
    type Key = GuideKey;

    const LOCAL_KEY: &'static str = keys::GUIDE_FAVOURITES;
    const STAMP_REFRESH: bool = true;

    async fn fetch(&self, email: &str) -> Result<Vec<GuideKey>, ApiError> {
        self.fake_fetch(email)
    }

    async fn add(&self, email: &str, key: &GuideKey) -> Result<(), ApiError> {
        self.fake_add(email, key)
    }

    async fn remove(&self, email: &str, key: &GuideKey) -> Result<(), ApiError> {
        self.fake_remove(email, key)
    }

    async fn merge(&self, email: &str, local: &[GuideKey]) -> Result<Vec<GuideKey>, ApiError> {
        self.fake_merge(email, local)
    }
}

/// Guide backend with two files per category and generated markdown bodies.
pub(crate) struct FakeGuides {
    slugs: Vec<String>,
    categories_offline: AtomicBool,
    failing: Mutex<HashSet<String>>,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeGuides {
    pub(crate) fn new(slugs: &[&str]) -> Self {
        Self {
            slugs: slugs.iter().map(|s| s.to_string()).collect(),
            categories_offline: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
            requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_categories_offline(&self, offline: bool) {
        self.categories_offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn fail_category(&self, slug: &str) {
        self.failing.lock().unwrap().insert(slug.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn track<T>(&self, value: T) -> T {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        value
    }
}

#[async_trait]
impl GuideBackend for FakeGuides {
    async fn categories(&self) -> Result<Vec<GuideCategory>, ApiError> {
        let categories = self
            .slugs
            .iter()
            .map(|slug| GuideCategory {
                name: slug.to_uppercase(),
                slug: slug.clone(),
                file_count: Some(2),
            })
            .collect();
        let categories = self.track(categories).await;
        if self.categories_offline.load(Ordering::SeqCst) {
            Err(offline())
        } else {
            Ok(categories)
        }
    }

    async fn files(&self, category: &str) -> Result<Vec<GuideFileSummary>, ApiError> {
        let failing = self.failing.lock().unwrap().contains(category);
        let files = ["a.md", "b.md"]
            .iter()
            .map(|name| GuideFileSummary {
                filename: format!("{category}-{name}"),
                title: None,
                content: None,
                file_size: None,
                file_path: None,
            })
            .collect();
        let files = self.track(files).await;
        if failing { Err(offline()) } else { Ok(files) }
    }

    async fn file(
        &self,
        category: &str,
        filename: &str,
    ) -> Result<Option<GuideFileSummary>, ApiError> {
        let file = (filename != "missing.md").then(|| GuideFileSummary {
            filename: filename.to_string(),
            title: None,
            content: Some(format!("# {category}/{filename}")),
            file_size: None,
            file_path: None,
        });
        Ok(self.track(file).await)
    }
}
