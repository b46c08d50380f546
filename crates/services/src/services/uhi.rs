//! Once-per-process preload of the urban heat island dashboard data.
//!
//! Metadata, readings and both boundary GeoJSON variants are fetched together. Every failure
//! is logged and stored as an empty object, so the dashboard falls back to loading on demand.

use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::api_client::{ApiClient, ApiError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UhiSnapshot {
    pub metadata: Value,
    pub data: Value,
    pub boundaries_simplified: Value,
    pub boundaries_full: Value,
}

pub struct UhiPreloader {
    api: ApiClient,
    snapshot: OnceCell<UhiSnapshot>,
}

fn or_empty(what: &str, result: Result<Value, ApiError>) -> Value {
    result.unwrap_or_else(|e| {
        warn!(what, error = %e, "UHI preload failed, dashboard will load on demand");
        Value::Object(Map::new())
    })
}

impl UhiPreloader {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            snapshot: OnceCell::new(),
        }
    }

    async fn boundaries(&self, simplified: bool) -> Result<Value, ApiError> {
        let link = self.api.uhi_boundaries(simplified).await?;
        self.api.external_json(&link.url).await
    }

    /// Fetch everything on the first call; concurrent and later calls share that result.
    pub async fn preload(&self) -> &UhiSnapshot {
        self.snapshot
            .get_or_init(|| async {
                let (metadata, data, simplified, full) = tokio::join!(
                    self.api.uhi_metadata(),
                    self.api.uhi_data(),
                    self.boundaries(true),
                    self.boundaries(false),
                );
                let snapshot = UhiSnapshot {
                    metadata: or_empty("metadata", metadata),
                    data: or_empty("data", data),
                    boundaries_simplified: or_empty("simplified boundaries", simplified),
                    boundaries_full: or_empty("full boundaries", full),
                };
                info!("UHI dashboard data preloaded");
                snapshot
            })
            .await
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.snapshot.get().map(|s| &s.metadata)
    }

    pub fn data(&self) -> Option<&Value> {
        self.snapshot.get().map(|s| &s.data)
    }

    pub fn boundaries_geo(&self, simplified: bool) -> Option<&Value> {
        self.snapshot.get().map(|s| {
            if simplified {
                &s.boundaries_simplified
            } else {
                &s.boundaries_full
            }
        })
    }
}
