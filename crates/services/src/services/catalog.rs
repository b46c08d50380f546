//! Paged plant catalog with filter-scoped invalidation and background prefetch.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use db::models::{
    api_plant::{ApiPaginatedPlantsResponse, CategoryCounts},
    plant::Plant,
};
use thiserror::Error;
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    api_client::{ApiClient, ApiError, PageQuery},
    config::ClientConfig,
    loading::{LoadingState, LoadingTracker},
    transform,
};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<ApiPaginatedPlantsResponse, ApiError>;
}

#[async_trait]
impl CatalogBackend for ApiClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<ApiPaginatedPlantsResponse, ApiError> {
        self.plants_paginated(query).await
    }
}

/// `{category or "all"}|{trimmed search}`; `"all"` and no category are the same filter.
pub fn filter_key(category: Option<&str>, search: Option<&str>) -> String {
    let category = category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("all");
    let search = search.map(str::trim).unwrap_or_default();
    format!("{category}|{search}")
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogTiming {
    pub pacing: Duration,
    pub backoff: Duration,
}

impl From<&ClientConfig> for CatalogTiming {
    fn from(config: &ClientConfig) -> Self {
        Self {
            pacing: config.prefetch_pacing,
            backoff: config.prefetch_backoff,
        }
    }
}

struct PrefetchRun {
    filter_key: String,
    token: CancellationToken,
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PrefetchRun {
    fn is_active(&self) -> bool {
        !self.done.load(Ordering::Acquire) && !self.token.is_cancelled()
    }
}

#[derive(Default)]
struct CatalogState {
    filter_key: Option<String>,
    pages: BTreeMap<u32, Vec<Plant>>,
    total: Option<u64>,
    categories: Option<CategoryCounts>,
    loaded_pages_max: u32,
    prefetch: Option<PrefetchRun>,
}

impl CatalogState {
    /// Switch to `key`, dropping every page of the previous filter. Returns true if the key
    /// changed.
    fn switch_filter(&mut self, key: &str) -> bool {
        if self.filter_key.as_deref() == Some(key) {
            return false;
        }
        if let Some(run) = &self.prefetch {
            run.token.cancel();
        }
        self.filter_key = Some(key.to_string());
        self.pages.clear();
        self.total = None;
        self.categories = None;
        self.loaded_pages_max = 0;
        true
    }

    fn is_current(&self, key: &str) -> bool {
        self.filter_key.as_deref() == Some(key)
    }
}

pub struct CatalogCache {
    backend: Arc<dyn CatalogBackend>,
    images_base_url: String,
    default_page_size: u32,
    timing: CatalogTiming,
    state: Mutex<CatalogState>,
    /// One gate per `(filter, page)` so concurrent misses share a single request
    gates: DashMap<(String, u32), Arc<Mutex<()>>>,
    ensure_in_flight: AtomicBool,
    loading: LoadingTracker,
}

impl CatalogCache {
    pub fn new(backend: Arc<dyn CatalogBackend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            images_base_url: config.images_base_url.clone(),
            default_page_size: config.default_page_size,
            timing: CatalogTiming::from(config),
            state: Mutex::new(CatalogState::default()),
            gates: DashMap::new(),
            ensure_in_flight: AtomicBool::new(false),
            loading: LoadingTracker::new(),
        }
    }

    pub fn with_timing(mut self, timing: CatalogTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn loading(&self) -> &LoadingTracker {
        &self.loading
    }

    pub fn loading_state(&self) -> LoadingState {
        self.loading.snapshot()
    }

    /// Load the first unfiltered page once. Further calls return immediately while the
    /// cache is initialized or the first load is still running.
    pub async fn ensure_loaded(&self) -> Result<(), CatalogError> {
        if self.loading.is_initialized() || self.ensure_in_flight.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self
            .load_page(1, self.default_page_size, None, None)
            .await
            .map(|_| ());
        self.ensure_in_flight.store(false, Ordering::Release);
        result
    }

    /// Serve a page from cache or fetch it, returning the best-known total for the filter.
    /// Page 1 is always re-fetched so the total stays authoritative.
    pub async fn load_page(
        &self,
        page: u32,
        limit: u32,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<u64, CatalogError> {
        let query = PageQuery::new(page, limit, category, search);
        let key = filter_key(query.category.as_deref(), query.search.as_deref());

        {
            let mut state = self.state.lock().await;
            if state.switch_filter(&key) {
                info!(filter = %key, "Catalog filter changed, page cache cleared");
            }
            if query.page != 1 && state.pages.contains_key(&query.page) {
                debug!(page = query.page, filter = %key, "Catalog page served from cache");
                return Ok(state.total.unwrap_or(0));
            }
        }

        self.loading.begin();
        match self.fetch_page(&key, &query).await {
            Ok(total) => {
                self.loading.succeed();
                Ok(total)
            }
            Err(e) => {
                warn!(page = query.page, filter = %key, error = %e, "Failed to load catalog page");
                self.loading.fail(&e);
                Err(e)
            }
        }
    }

    async fn acquire_gate(&self, key: &str, page: u32) -> (Arc<Mutex<()>>, OwnedMutexGuard<()>, bool) {
        let gate = self
            .gates
            .entry((key.to_string(), page))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        match gate.clone().try_lock_owned() {
            Ok(guard) => (gate, guard, false),
            Err(_) => {
                let guard = gate.clone().lock_owned().await;
                (gate, guard, true)
            }
        }
    }

    /// Drop the map entry only if it is still `gate`; a later caller may have installed a
    /// fresh one that others are already queued on.
    fn release_gate(&self, key: &str, page: u32, gate: &Arc<Mutex<()>>) {
        self.gates
            .remove_if(&(key.to_string(), page), |_, current| Arc::ptr_eq(current, gate));
    }

    async fn fetch_page(&self, key: &str, query: &PageQuery) -> Result<u64, CatalogError> {
        let (gate, guard, waited) = self.acquire_gate(key, query.page).await;
        let result = self.fetch_page_gated(key, query, waited).await;
        self.release_gate(key, query.page, &gate);
        drop(guard);
        result
    }

    async fn fetch_page_gated(
        &self,
        key: &str,
        query: &PageQuery,
        waited: bool,
    ) -> Result<u64, CatalogError> {
        // Someone else fetched this page while we waited on the gate.
        if waited {
            let state = self.state.lock().await;
            if state.is_current(key) && state.pages.contains_key(&query.page) {
                return Ok(state.total.unwrap_or(0));
            }
        }

        let response = self.backend.fetch_page(query).await?;

        let plants = transform::from_paginated(&response, &self.images_base_url);
        let mut state = self.state.lock().await;
        if !state.is_current(key) {
            debug!(page = query.page, filter = %key, "Discarding page for stale filter");
            return Ok(state.total.unwrap_or(0));
        }

        if query.page == 1 || state.total.is_none() {
            state.total = Some(response.total());
        }
        if let Some(categories) = response.categories {
            state.categories = Some(categories);
        }
        debug!(
            page = query.page,
            filter = %key,
            count = plants.len(),
            "Stored catalog page"
        );
        state.pages.insert(query.page, plants);
        state.loaded_pages_max = state.loaded_pages_max.max(query.page);
        Ok(state.total.unwrap_or(0))
    }

    /// Spawn a background run that loads every page after the highest loaded one for the
    /// current filter. Returns false if nothing was started.
    pub async fn start_prefetch(
        self: &Arc<Self>,
        limit: u32,
        category: Option<&str>,
        search: Option<&str>,
    ) -> bool {
        let base = PageQuery::new(1, limit, category, search);
        let key = filter_key(base.category.as_deref(), base.search.as_deref());

        let mut state = self.state.lock().await;
        if !state.is_current(&key) {
            debug!(filter = %key, "Prefetch requested for inactive filter, ignoring");
            return false;
        }
        if state.prefetch.as_ref().is_some_and(|run| run.filter_key == key && run.is_active()) {
            debug!(filter = %key, "Prefetch already running");
            return false;
        }

        let total_pages = pages_for(state.total.unwrap_or(0), base.limit);
        let start = state.loaded_pages_max + 1;
        if total_pages <= 1 || start > total_pages {
            return false;
        }

        let token = CancellationToken::new();
        let done = Arc::new(AtomicBool::new(false));
        let cache = Arc::clone(self);
        let run_token = token.clone();
        let run_done = done.clone();
        let run_key = key.clone();
        info!(filter = %key, from = start, to = total_pages, "Starting catalog prefetch");
        let handle = tokio::spawn(async move {
            cache.prefetch_loop(run_key, base, start, run_token).await;
            run_done.store(true, Ordering::Release);
        });

        state.prefetch = Some(PrefetchRun {
            filter_key: key,
            token,
            done,
            handle: Some(handle),
        });
        true
    }

    async fn prefetch_loop(&self, key: String, base: PageQuery, start: u32, token: CancellationToken) {
        let mut page = start;
        let mut first = true;

        loop {
            let total_pages = {
                let state = self.state.lock().await;
                if token.is_cancelled() || !state.is_current(&key) {
                    debug!(filter = %key, page, "Filter changed, prefetch stopped");
                    return;
                }
                if state.pages.contains_key(&page) {
                    page += 1;
                    continue;
                }
                pages_for(state.total.unwrap_or(0), base.limit)
            };
            if page > total_pages {
                break;
            }

            if !first && !self.timing.pacing.is_zero() {
                tokio::time::sleep(self.timing.pacing).await;
            }
            first = false;

            if let Err(e) = self.fetch_page(&key, &base.with_page(page)).await {
                warn!(filter = %key, page, error = %e, "Prefetch page failed, continuing");
                if !self.timing.backoff.is_zero() {
                    tokio::time::sleep(self.timing.backoff).await;
                }
            }
            page += 1;
        }

        info!(filter = %key, "Catalog prefetch finished");
    }

    /// Wait for the current prefetch run, if any, to finish.
    pub async fn wait_for_prefetch(&self) {
        let handle = {
            let mut state = self.state.lock().await;
            state.prefetch.as_mut().and_then(|run| run.handle.take())
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Prefetch task ended abnormally");
            }
        }
    }

    pub async fn is_prefetching(&self) -> bool {
        let state = self.state.lock().await;
        state.prefetch.as_ref().is_some_and(PrefetchRun::is_active)
    }

    pub async fn page(&self, page: u32) -> Option<Vec<Plant>> {
        self.state.lock().await.pages.get(&page).cloned()
    }

    pub async fn cached_pages(&self) -> Vec<u32> {
        self.state.lock().await.pages.keys().copied().collect()
    }

    pub async fn total(&self) -> u64 {
        self.state.lock().await.total.unwrap_or(0)
    }

    pub async fn current_filter(&self) -> Option<String> {
        self.state.lock().await.filter_key.clone()
    }

    pub async fn loaded_pages_max(&self) -> u32 {
        self.state.lock().await.loaded_pages_max
    }

    pub async fn categories(&self) -> Option<CategoryCounts> {
        self.state.lock().await.categories
    }

    /// Every cached plant of the current filter, in page order.
    pub async fn loaded_plants(&self) -> Vec<Plant> {
        let state = self.state.lock().await;
        state.pages.values().flatten().cloned().collect()
    }
}

fn pages_for(total: u64, limit: u32) -> u32 {
    let limit = u64::from(limit.max(1));
    u32::try_from(total.div_ceil(limit)).unwrap_or(u32::MAX)
}
