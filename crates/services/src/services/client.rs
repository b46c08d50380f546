//! Application facade: builds every store once and wires identity changes into favourites.

use std::sync::Arc;

use db::storage::LocalStorage;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{
    api_client::{ApiClient, ApiError},
    catalog::CatalogCache,
    config::ClientConfig,
    favorites::{FavoritesError, GuideFavorites, GuideFavoritesApi, PlantFavorites, PlantFavoritesApi},
    guides::GuideCache,
    identity::{Identity, IdentityError, IdentitySession},
    recommendations::RecommendationStore,
    uhi::UhiPreloader,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Favorites(#[from] FavoritesError),
}

/// Background tasks spawned by [`PlantopiaClient::start`]
pub struct StartupHandles {
    pub catalog: JoinHandle<()>,
    pub guides: JoinHandle<()>,
    pub uhi: JoinHandle<()>,
    pub identity_watcher: JoinHandle<()>,
}

impl StartupHandles {
    pub fn abort_all(&self) {
        self.catalog.abort();
        self.guides.abort();
        self.uhi.abort();
        self.identity_watcher.abort();
    }
}

pub struct PlantopiaClient {
    config: ClientConfig,
    api: ApiClient,
    identity: Arc<IdentitySession>,
    catalog: Arc<CatalogCache>,
    favorites: Arc<PlantFavorites>,
    guides: Arc<GuideCache>,
    recommendations: Arc<RecommendationStore>,
    uhi: Arc<UhiPreloader>,
}

impl PlantopiaClient {
    pub fn new(config: ClientConfig, storage: Arc<dyn LocalStorage>) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config)?;
        let identity = Arc::new(IdentitySession::new(storage.clone()));

        let favorites = Arc::new(PlantFavorites::new(
            PlantFavoritesApi::new(api.clone()),
            storage.clone(),
            identity.subscribe(),
        ));
        let guide_favorites = Arc::new(GuideFavorites::new(
            GuideFavoritesApi::new(api.clone()),
            storage,
            identity.subscribe(),
        ));

        let catalog = Arc::new(CatalogCache::new(Arc::new(api.clone()), &config));
        let guides = Arc::new(GuideCache::new(Arc::new(api.clone()), guide_favorites));
        let recommendations = Arc::new(RecommendationStore::new(Arc::new(api.clone()), &config));
        let uhi = Arc::new(UhiPreloader::new(api.clone()));

        Ok(Self {
            config,
            api,
            identity,
            catalog,
            favorites,
            guides,
            recommendations,
            uhi,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Direct access to the backend for endpoints without a cache in front of them.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn identity(&self) -> &Arc<IdentitySession> {
        &self.identity
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub fn favorites(&self) -> &Arc<PlantFavorites> {
        &self.favorites
    }

    pub fn guides(&self) -> &Arc<GuideCache> {
        &self.guides
    }

    pub fn recommendations(&self) -> &Arc<RecommendationStore> {
        &self.recommendations
    }

    pub fn uhi(&self) -> &Arc<UhiPreloader> {
        &self.uhi
    }

    /// Restore identity and local favourites, then start the eager loads, the UHI preload
    /// and the identity watcher in the background.
    pub async fn start(&self) -> Result<StartupHandles, ClientError> {
        let identity = self.identity.load().await?;
        self.favorites.load_local().await;
        debug!(signed_in = identity.is_some(), "Client starting");

        let catalog = {
            let catalog = self.catalog.clone();
            tokio::spawn(async move {
                if let Err(e) = catalog.ensure_loaded().await {
                    warn!(error = %e, "Initial catalog load failed");
                }
            })
        };

        let guides = {
            let guides = self.guides.clone();
            tokio::spawn(async move {
                guides.ensure_loaded().await;
            })
        };

        let uhi = {
            let uhi = self.uhi.clone();
            tokio::spawn(async move {
                uhi.preload().await;
            })
        };

        let identity_watcher = tokio::spawn(watch_identity(
            self.identity.subscribe(),
            self.favorites.clone(),
            self.guides.favorites().clone(),
        ));

        Ok(StartupHandles {
            catalog,
            guides,
            uhi,
            identity_watcher,
        })
    }

    /// Sign in and reconcile both favourite sets before returning.
    pub async fn sign_in(&self, identity: Identity) -> Result<Identity, ClientError> {
        let identity = self.identity.sign_in(identity).await?;
        self.favorites.sync_local_to_server().await?;
        if let Err(e) = self.guides.favorites().sync_local_to_server().await {
            warn!(error = %e, "Guide favourites reconciliation failed, will retry");
        }
        Ok(identity)
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.identity.sign_out().await?;
        self.favorites.reset().await;
        self.guides.favorites().reset().await;
        Ok(())
    }
}

async fn watch_identity(
    mut rx: watch::Receiver<Option<Identity>>,
    plants: Arc<PlantFavorites>,
    guides: Arc<GuideFavorites>,
) {
    let mut first = true;
    loop {
        let current = rx.borrow_and_update().clone();
        match current {
            Some(identity) => {
                info!(email = %identity.email, "Identity available, reconciling favourites");
                if let Err(e) = plants.sync_local_to_server().await {
                    warn!(error = %e, "Plant favourites reconciliation failed, will retry");
                }
                if let Err(e) = guides.sync_local_to_server().await {
                    warn!(error = %e, "Guide favourites reconciliation failed, will retry");
                }
            }
            // Stores start anonymous, only a sign-out needs a reset.
            None if first => {}
            None => {
                plants.reset().await;
                guides.reset().await;
            }
        }
        first = false;

        if rx.changed().await.is_err() {
            debug!("Identity session dropped, watcher exiting");
            return;
        }
    }
}
