//! Lazily loaded guide categories, file lists and documents, plus guide favourites.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use db::models::guide::{GuideCategory, GuideFileSummary, GuideKey};
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    api_client::{ApiClient, ApiError},
    favorites::{FavoriteBackend, FavoriteStore, FavoritesError, GuideFavoritesApi},
    loading::{LoadingState, LoadingTracker},
};

const CONTENT_CAPACITY: u64 = 256;

#[derive(Debug, Clone, Error)]
pub enum GuidesError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("guide not found: {category}/{filename}")]
    NotFound { category: String, filename: String },
}

#[async_trait]
pub trait GuideBackend: Send + Sync {
    async fn categories(&self) -> Result<Vec<GuideCategory>, ApiError>;

    async fn files(&self, category: &str) -> Result<Vec<GuideFileSummary>, ApiError>;

    async fn file(&self, category: &str, filename: &str)
    -> Result<Option<GuideFileSummary>, ApiError>;
}

#[async_trait]
impl GuideBackend for ApiClient {
    async fn categories(&self) -> Result<Vec<GuideCategory>, ApiError> {
        Ok(self.guide_categories().await?.categories)
    }

    async fn files(&self, category: &str) -> Result<Vec<GuideFileSummary>, ApiError> {
        Ok(self.guide_files(category).await?.files)
    }

    async fn file(
        &self,
        category: &str,
        filename: &str,
    ) -> Result<Option<GuideFileSummary>, ApiError> {
        Ok(self.guide_file(category, filename).await?.file)
    }
}

pub struct GuideCache<F: FavoriteBackend<Key = GuideKey> = GuideFavoritesApi> {
    backend: Arc<dyn GuideBackend>,
    categories: RwLock<Option<Vec<GuideCategory>>>,
    files: DashMap<String, Vec<GuideFileSummary>>,
    content: Cache<GuideKey, String>,
    favorites: Arc<FavoriteStore<F>>,
    ensure_in_flight: AtomicBool,
    loading: LoadingTracker,
}

impl<F: FavoriteBackend<Key = GuideKey>> GuideCache<F> {
    pub fn new(backend: Arc<dyn GuideBackend>, favorites: Arc<FavoriteStore<F>>) -> Self {
        Self {
            backend,
            categories: RwLock::new(None),
            files: DashMap::new(),
            content: Cache::builder().max_capacity(CONTENT_CAPACITY).build(),
            favorites,
            ensure_in_flight: AtomicBool::new(false),
            loading: LoadingTracker::new(),
        }
    }

    pub fn favorites(&self) -> &Arc<FavoriteStore<F>> {
        &self.favorites
    }

    pub fn loading_state(&self) -> LoadingState {
        self.loading.snapshot()
    }

    pub async fn categories(&self) -> Result<Vec<GuideCategory>, GuidesError> {
        if let Some(categories) = self.categories.read().await.as_ref() {
            return Ok(categories.clone());
        }

        let mut slot = self.categories.write().await;
        if let Some(categories) = slot.as_ref() {
            return Ok(categories.clone());
        }
        let categories = self.backend.categories().await?;
        debug!(count = categories.len(), "Loaded guide categories");
        *slot = Some(categories.clone());
        Ok(categories)
    }

    /// File list of one category, fetched on first use.
    pub async fn files(&self, category: &str) -> Result<Vec<GuideFileSummary>, GuidesError> {
        if let Some(files) = self.files.get(category) {
            return Ok(files.clone());
        }
        let files = self.backend.files(category).await?;
        self.files.insert(category.to_string(), files.clone());
        Ok(files)
    }

    pub fn cached_files(&self, category: &str) -> Option<Vec<GuideFileSummary>> {
        self.files.get(category).map(|files| files.clone())
    }

    /// Fetch every category's file list one after another, yielding between requests.
    /// Failures are logged and skipped; the affected category loads on next access.
    pub async fn preload_all(&self) -> usize {
        self.loading.begin();
        let categories = match self.categories().await {
            Ok(categories) => categories,
            Err(e) => {
                warn!(error = %e, "Guide preload could not list categories");
                self.loading.fail(&e);
                return 0;
            }
        };

        let mut loaded = 0;
        for category in &categories {
            match self.files(&category.slug).await {
                Ok(files) => {
                    debug!(category = %category.slug, count = files.len(), "Preloaded guide files");
                    loaded += 1;
                }
                Err(e) => warn!(category = %category.slug, error = %e, "Skipping guide category"),
            }
            tokio::task::yield_now().await;
        }

        self.loading.succeed();
        info!(loaded, total = categories.len(), "Guide preload finished");
        loaded
    }

    /// Read-through document cache. Concurrent reads of the same file share one request.
    pub async fn file_content(&self, category: &str, filename: &str) -> Result<String, GuidesError> {
        let key = GuideKey::new(category, filename);
        self.content
            .try_get_with(key, async {
                match self.backend.file(category, filename).await? {
                    Some(file) => Ok(file.content.unwrap_or_default()),
                    None => Err(GuidesError::NotFound {
                        category: category.to_string(),
                        filename: filename.to_string(),
                    }),
                }
            })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn cached_content(&self, category: &str, filename: &str) -> Option<String> {
        self.content.get(&GuideKey::new(category, filename)).await
    }

    /// Load guide favourites and preload every category. Returns at once while initialized
    /// or while another call is running; after a failed preload the next call tries again.
    pub async fn ensure_loaded(&self) {
        if self.loading.is_initialized() || self.ensure_in_flight.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.favorites.load_from_server().await {
            warn!(error = %e, "Guide favourites unavailable, using local set");
            self.favorites.load_local().await;
        }
        self.preload_all().await;
        self.ensure_in_flight.store(false, Ordering::Release);
    }

    pub fn is_favorite(&self, category: &str, filename: &str) -> bool {
        self.favorites
            .is_favorite(&GuideKey::new(category, filename))
    }

    pub async fn toggle_favorite(&self, category: &str, filename: &str) -> Result<bool, FavoritesError> {
        self.favorites
            .toggle(GuideKey::new(category, filename))
            .await
    }
}
