//! HTTP adapter for the Plantopia backend (`/api/v1`).
//!
//! Every call is bounded by the configured timeout and may additionally be cancelled through a
//! caller-supplied token. Non-2xx statuses, transport failures and undecodable payloads come
//! back as distinct [`ApiError`] variants. Nothing here retries; retry policy belongs to callers.
//!
//! With a fallback origin configured, a transient failure against the active origin switches
//! to the other one for that call and the calls after it. When the fallback fails as well the
//! client goes back to the primary for the next call.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use db::models::{
    api_plant::{ApiAllPlantsResponse, ApiPaginatedPlantsResponse},
    favorite::{
        AddFavoriteRequest, FavoriteCheck, FavoriteRecord, FavoritesPayload, SyncFavoritesRequest,
    },
    guide::{
        AddGuideFavoriteRequest, GuideCategoriesResponse, GuideFavoriteRecord,
        GuideFavoritesResponse, GuideFileResponse, GuideFilesResponse,
    },
    quantify::{ApiQuantifyRequest, ApiQuantifyResponse},
    recommendation::{ApiRecommendationRequest, ApiRecommendationResponse},
    tracking::{PlantInstance, PlantInstancesPayload, ProgressUpdate, StartTrackingRequest},
    uhi::UhiBoundaryLink,
};
use reqwest::{
    Client, Method, Response,
    header::{CONTENT_TYPE, HeaderMap},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use urlencoding::encode;

use super::config::ClientConfig;

pub const API_PREFIX: &str = "/api/v1";
pub const MAX_PAGE_SIZE: u32 = 100;
const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("http {status}: {status_text}")]
    HttpStatus { status: u16, status_text: String },
    #[error("json error: {0}")]
    Decode(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid request: {0}")]
    Build(String),
}

impl ApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Response body decoded according to its `Content-Type`
#[derive(Debug, Clone)]
pub enum ApiBody {
    Json(Value),
    Image {
        content_type: String,
        content_length: Option<u64>,
        bytes: Bytes,
    },
    Text(String),
}

/// Method, query, body and cancellation for a single [`ApiClient::request`]
#[derive(Debug, Clone)]
pub struct RequestOptions {
    method: Method,
    query: Vec<(String, String)>,
    body: Option<Value>,
    cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            body: None,
            cancel: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn post<B: Serialize + ?Sized>(body: &B) -> Result<Self, ApiError> {
        Self::new(Method::POST).json(body)
    }

    pub fn put<B: Serialize + ?Sized>(body: &B) -> Result<Self, ApiError> {
        Self::new(Method::PUT).json(body)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Build(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// One page of the catalog as sent to `/plants/paginated`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl PageQuery {
    /// Page numbers start at 1, the limit is clamped to `1..=100`, the `"all"` category and
    /// blank search text are dropped.
    pub fn new(page: u32, limit: u32, category: Option<&str>, search: Option<&str>) -> Self {
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(ALL_CATEGORIES))
            .map(str::to_string);
        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            category,
            search,
        }
    }

    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(category) = &self.category {
            pairs.push(("category".to_string(), category.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        pairs
    }
}

/// Plantopia backend client
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    primary_url: String,
    fallback_url: Option<String>,
    /// Shared by clones so every store follows the same failover decision
    on_fallback: Arc<AtomicBool>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("plantopia-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Build(e.to_string()))?;

        Ok(Self {
            http,
            primary_url: config.api_url.trim_end_matches('/').to_string(),
            fallback_url: config
                .fallback_api_url
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string()),
            on_fallback: Arc::new(AtomicBool::new(false)),
            timeout: config.request_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Origin the next request goes to.
    pub fn active_base_url(&self) -> &str {
        match self.fallback_url.as_deref() {
            Some(fallback) if self.on_fallback.load(Ordering::Acquire) => fallback,
            _ => &self.primary_url,
        }
    }

    /// Issue a request and decode the body by content type.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<ApiBody, ApiError> {
        let cancel = options.cancel.clone();
        self.guarded(cancel.as_ref(), async {
            let response = self.send(endpoint, options).await?;
            decode_body(response).await
        })
        .await
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let cancel = options.cancel.clone();
        self.guarded(cancel.as_ref(), async {
            let response = self.send(endpoint, options).await?;
            let bytes = response.bytes().await.map_err(map_reqwest_error)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                warn!(endpoint, error = %e, "Failed to decode JSON response");
                ApiError::Decode(e.to_string())
            })
        })
        .await
    }

    /// For mutations whose response body carries nothing the client needs.
    async fn call_discard(&self, endpoint: &str, options: RequestOptions) -> Result<(), ApiError> {
        let cancel = options.cancel.clone();
        self.guarded(cancel.as_ref(), async {
            let response = self.send(endpoint, options).await?;
            response.bytes().await.map_err(map_reqwest_error)?;
            Ok(())
        })
        .await
    }

    async fn send(&self, endpoint: &str, options: RequestOptions) -> Result<Response, ApiError> {
        let Some(fallback) = self.fallback_url.as_deref() else {
            return self.send_to(&self.primary_url, endpoint, options).await;
        };

        if self.on_fallback.load(Ordering::Acquire) {
            let result = self.send_to(fallback, endpoint, options).await;
            if result.as_ref().is_err_and(ApiError::should_retry) {
                self.on_fallback.store(false, Ordering::Release);
            }
            return result;
        }

        let error = match self.send_to(&self.primary_url, endpoint, options.clone()).await {
            Err(e) if e.should_retry() => e,
            other => return other,
        };
        warn!(primary = %self.primary_url, fallback, error = %error, "Primary backend failed, switching to fallback");
        self.on_fallback.store(true, Ordering::Release);

        match self.send_to(fallback, endpoint, options).await {
            Ok(res) => {
                info!(fallback, "Connected to fallback backend");
                Ok(res)
            }
            Err(e) => {
                warn!(
                    primary = %self.primary_url,
                    fallback,
                    error = %e,
                    "Fallback backend failed too, next call starts from the primary"
                );
                self.on_fallback.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn send_to(
        &self,
        base_url: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Response, ApiError> {
        let url = format!("{base_url}{API_PREFIX}{endpoint}");
        debug!(method = %options.method, url = %url, "Sending backend request");

        let mut req = self.http.request(options.method, &url);
        if !options.query.is_empty() {
            req = req.query(&options.query);
        }
        if let Some(body) = &options.body {
            req = req.json(body);
        }

        let res = req.send().await.map_err(map_reqwest_error)?;
        check_status(res, &url)
    }

    async fn guarded<T>(
        &self,
        cancel: Option<&CancellationToken>,
        fut: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let timeout = self.timeout;
        let timed = tokio::time::timeout(timeout, fut);
        let outcome = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(ApiError::Cancelled),
                outcome = timed => outcome,
            },
            None => timed.await,
        };
        outcome.unwrap_or(Err(ApiError::Timeout(timeout)))
    }

    // Catalog

    pub async fn health_check(&self) -> Result<Value, ApiError> {
        self.call_json("/", RequestOptions::get()).await
    }

    pub async fn all_plants(&self) -> Result<ApiAllPlantsResponse, ApiError> {
        self.call_json("/plants", RequestOptions::get()).await
    }

    pub async fn plants_paginated(
        &self,
        query: &PageQuery,
    ) -> Result<ApiPaginatedPlantsResponse, ApiError> {
        let options = query
            .query_pairs()
            .into_iter()
            .fold(RequestOptions::get(), |opts, (k, v)| opts.query(k, v));
        self.call_json("/plants/paginated", options).await
    }

    // Recommendations and impact

    pub async fn recommendations(
        &self,
        request: &ApiRecommendationRequest,
    ) -> Result<ApiRecommendationResponse, ApiError> {
        self.call_json("/recommendations", RequestOptions::post(request)?)
            .await
    }

    pub async fn quantify_plant(
        &self,
        request: &ApiQuantifyRequest,
        cancel: Option<CancellationToken>,
    ) -> Result<ApiQuantifyResponse, ApiError> {
        let mut options = RequestOptions::post(request)?;
        if let Some(token) = cancel {
            options = options.cancel_on(token);
        }
        self.call_json("/quantify-plant", options).await
    }

    pub async fn batch_quantify(
        &self,
        requests: &[ApiQuantifyRequest],
    ) -> Result<Vec<ApiQuantifyResponse>, ApiError> {
        self.call_json("/batch-quantify", RequestOptions::post(requests)?)
            .await
    }

    // Plant favourites, scoped by email

    pub async fn favorites_by_email(&self, email: &str) -> Result<Vec<FavoriteRecord>, ApiError> {
        let payload: FavoritesPayload = self
            .call_json("/favorites", RequestOptions::get().query("email", email))
            .await?;
        Ok(payload.into_records())
    }

    pub async fn add_favorite(&self, email: &str, plant_id: i64) -> Result<(), ApiError> {
        let body = AddFavoriteRequest {
            email,
            plant_id,
            notes: None,
        };
        self.call_discard("/favorites", RequestOptions::post(&body)?)
            .await
    }

    pub async fn remove_favorite(&self, email: &str, plant_id: i64) -> Result<(), ApiError> {
        self.call_discard(
            &format!("/favorites/{plant_id}"),
            RequestOptions::delete().query("email", email),
        )
        .await
    }

    /// Send the anonymous set and get back the server's merged favourites.
    pub async fn sync_favorites(
        &self,
        email: &str,
        plant_ids: &[i64],
    ) -> Result<Vec<FavoriteRecord>, ApiError> {
        let body = SyncFavoritesRequest {
            email,
            favorite_plant_ids: plant_ids,
        };
        let payload: FavoritesPayload = self
            .call_json("/favorites/sync", RequestOptions::post(&body)?)
            .await?;
        Ok(payload.into_records())
    }

    pub async fn check_favorite(&self, email: &str, plant_id: i64) -> Result<bool, ApiError> {
        let check: FavoriteCheck = self
            .call_json(
                &format!("/favorites/check/{plant_id}"),
                RequestOptions::get().query("email", email),
            )
            .await?;
        Ok(check.is_favorite)
    }

    // Guide content

    pub async fn guide_categories(&self) -> Result<GuideCategoriesResponse, ApiError> {
        self.call_json("/markdown/categories", RequestOptions::get())
            .await
    }

    pub async fn guide_files(&self, category: &str) -> Result<GuideFilesResponse, ApiError> {
        self.call_json(
            &format!("/markdown/category/{}", encode(category)),
            RequestOptions::get(),
        )
        .await
    }

    pub async fn guide_file(
        &self,
        category: &str,
        filename: &str,
    ) -> Result<GuideFileResponse, ApiError> {
        self.call_json(
            &format!("/markdown/file/{}/{}", encode(category), encode(filename)),
            RequestOptions::get(),
        )
        .await
    }

    pub async fn guide_favorites(&self, email: &str) -> Result<Vec<GuideFavoriteRecord>, ApiError> {
        let response: GuideFavoritesResponse = self
            .call_json(
                "/guides/favorites/user",
                RequestOptions::get().query("email", email),
            )
            .await?;
        Ok(response.favorites)
    }

    pub async fn add_guide_favorite(
        &self,
        email: &str,
        guide_name: &str,
        category: Option<&str>,
    ) -> Result<(), ApiError> {
        let body = AddGuideFavoriteRequest {
            email,
            guide_name,
            category,
            notes: None,
        };
        self.call_discard("/guides/favorites", RequestOptions::post(&body)?)
            .await
    }

    pub async fn remove_guide_favorite(&self, email: &str, guide_name: &str) -> Result<(), ApiError> {
        self.call_discard(
            &format!("/guides/favorites/{}", encode(guide_name)),
            RequestOptions::delete().query("email", email),
        )
        .await
    }

    pub async fn check_guide_favorite(&self, email: &str, guide_name: &str) -> Result<bool, ApiError> {
        let check: FavoriteCheck = self
            .call_json(
                &format!("/guides/favorites/check/{}", encode(guide_name)),
                RequestOptions::get().query("email", email),
            )
            .await?;
        Ok(check.is_favorite)
    }

    // Planting tracker

    pub async fn start_tracking(
        &self,
        request: &StartTrackingRequest,
    ) -> Result<PlantInstance, ApiError> {
        self.call_json("/tracking/start", RequestOptions::post(request)?)
            .await
    }

    pub async fn user_instances(&self, email_or_id: &str) -> Result<Vec<PlantInstance>, ApiError> {
        let payload: PlantInstancesPayload = self
            .call_json(
                &format!("/tracking/user/{}", encode(email_or_id)),
                RequestOptions::get(),
            )
            .await?;
        Ok(payload.into_instances())
    }

    pub async fn instance_details(&self, instance_id: i64) -> Result<PlantInstance, ApiError> {
        self.call_json(
            &format!("/tracking/instance/{instance_id}"),
            RequestOptions::get(),
        )
        .await
    }

    pub async fn update_progress(
        &self,
        instance_id: i64,
        update: &ProgressUpdate,
    ) -> Result<Value, ApiError> {
        self.call_json(
            &format!("/tracking/instance/{instance_id}/progress"),
            RequestOptions::put(update)?,
        )
        .await
    }

    pub async fn deactivate_instance(&self, instance_id: i64) -> Result<(), ApiError> {
        self.call_discard(
            &format!("/tracking/instance/{instance_id}/deactivate"),
            RequestOptions::new(Method::PUT),
        )
        .await
    }

    // Assistant chat, passed through untouched

    pub async fn chat_general_start(&self, body: &Value) -> Result<Value, ApiError> {
        self.call_json("/chat/general/start", RequestOptions::post(body)?)
            .await
    }

    pub async fn chat_general_message(&self, body: &Value) -> Result<Value, ApiError> {
        self.call_json("/chat/general/message", RequestOptions::post(body)?)
            .await
    }

    pub async fn chat_plant_start(&self, plant_id: i64, body: &Value) -> Result<Value, ApiError> {
        self.call_json(
            &format!("/chat/plant/{plant_id}/start"),
            RequestOptions::post(body)?,
        )
        .await
    }

    pub async fn chat_plant_message(&self, body: &Value) -> Result<Value, ApiError> {
        self.call_json("/chat/plant/message", RequestOptions::post(body)?)
            .await
    }

    // Urban heat island dashboard

    pub async fn uhi_metadata(&self) -> Result<Value, ApiError> {
        self.call_json("/uhi/metadata", RequestOptions::get()).await
    }

    pub async fn uhi_data(&self) -> Result<Value, ApiError> {
        self.call_json("/uhi/data", RequestOptions::get()).await
    }

    pub async fn uhi_boundaries(&self, simplified: bool) -> Result<UhiBoundaryLink, ApiError> {
        let options = RequestOptions::get().query("simplified", simplified.to_string());
        self.call_json("/uhi/boundaries", options).await
    }

    /// GET a JSON document from an absolute URL outside the API, such as a bucket link
    /// returned by [`uhi_boundaries`](Self::uhi_boundaries).
    pub async fn external_json(&self, url: &str) -> Result<Value, ApiError> {
        self.guarded(None, async {
            debug!(url, "Fetching external document");
            let res = self.http.get(url).send().await.map_err(map_reqwest_error)?;
            let bytes = check_status(res, url)?
                .bytes()
                .await
                .map_err(map_reqwest_error)?;
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
        })
        .await
    }
}

fn check_status(res: Response, url: &str) -> Result<Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    warn!(status = status.as_u16(), url, "Backend returned error status");
    Err(ApiError::HttpStatus {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
    })
}

fn map_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(Duration::ZERO)
    } else if e.is_decode() {
        ApiError::Decode(e.to_string())
    } else if e.is_builder() {
        ApiError::Build(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

fn mime_of(headers: &HeaderMap) -> (String, String) {
    let raw = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let mime = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    (raw, mime)
}

async fn decode_body(response: Response) -> Result<ApiBody, ApiError> {
    let (content_type, mime) = mime_of(response.headers());

    if mime == "application/json" || mime.ends_with("+json") {
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let value = serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
        return Ok(ApiBody::Json(value));
    }

    if mime.starts_with("image/") {
        let declared = response.content_length();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        return Ok(ApiBody::Image {
            content_type,
            content_length: declared.or(Some(bytes.len() as u64)),
            bytes,
        });
    }

    let text = response.text().await.map_err(map_reqwest_error)?;
    Ok(ApiBody::Text(text))
}
