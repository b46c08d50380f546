//! Recommendation search: form labels in, normalised plants out.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use db::models::{
    plant::Plant,
    recommendation::{
        ApiPractical, ApiPreferences, ApiRecommendationRequest, ApiRecommendationResponse,
        ApiSite, ApiUserEnvironment, ApiUserPreferences, Goal, Level, LocationType, SeasonIntent,
        SunExposure, TimeToResults, WindExposure,
    },
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{
    api_client::{ApiClient, ApiError},
    config::ClientConfig,
    loading::{LoadingState, LoadingTracker},
    transform,
};

const ANONYMOUS_USER: &str = "anon_mvp";
const DEFAULT_AREA_M2: f64 = 2.0;

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[async_trait]
pub trait RecommendationBackend: Send + Sync {
    async fn health_check(&self) -> Result<(), ApiError>;

    async fn recommend(
        &self,
        request: &ApiRecommendationRequest,
    ) -> Result<ApiRecommendationResponse, ApiError>;
}

#[async_trait]
impl RecommendationBackend for ApiClient {
    async fn health_check(&self) -> Result<(), ApiError> {
        ApiClient::health_check(self).await.map(|_| ())
    }

    async fn recommend(
        &self,
        request: &ApiRecommendationRequest,
    ) -> Result<ApiRecommendationResponse, ApiError> {
        self.recommendations(request).await
    }
}

/// Search form as the user filled it in, using display labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub location: String,
    pub location_type: String,
    pub area_size: String,
    pub sunlight: String,
    pub wind_exposure: String,
    pub has_containers: bool,
    pub container_sizes: Vec<String>,
    pub goal: String,
    pub edible_types: Vec<String>,
    pub ornamental_types: Vec<String>,
    pub colors: Vec<String>,
    pub fragrant: bool,
    pub maintainability: String,
    pub watering: String,
    pub time_to_results: String,
    pub season_intent: String,
    pub pollen_sensitive: bool,
    pub pets_or_toddlers: bool,
    pub budget: String,
    pub has_basic_tools: bool,
    pub organic_only: bool,
}

fn location_type(label: &str) -> LocationType {
    match label {
        "Indoors" => LocationType::Indoors,
        "Balcony" => LocationType::Balcony,
        "Courtyard" => LocationType::Courtyard,
        "Community Garden" => LocationType::CommunityGarden,
        _ => LocationType::Backyard,
    }
}

fn sun_exposure(label: &str) -> SunExposure {
    match label {
        "Full Sun (6-8h)" => SunExposure::FullSun,
        "Bright Shade (1-3h)" => SunExposure::BrightShade,
        "Low Light (<1h)" => SunExposure::LowLight,
        _ => SunExposure::PartSun,
    }
}

fn wind_exposure(label: &str) -> WindExposure {
    match label {
        "Sheltered" => WindExposure::Sheltered,
        "Windy" => WindExposure::Windy,
        _ => WindExposure::Moderate,
    }
}

fn goal(label: &str) -> Goal {
    match label {
        "Edible" => Goal::Edible,
        "Ornamental" => Goal::Ornamental,
        _ => Goal::Mixed,
    }
}

fn level(label: &str, default: Level) -> Level {
    match label {
        "Low" => Level::Low,
        "Medium" => Level::Medium,
        "High" => Level::High,
        _ => default,
    }
}

fn time_to_results(label: &str) -> TimeToResults {
    match label {
        "Standard (60-120d)" => TimeToResults::Standard,
        "Patient (>120d)" => TimeToResults::Patient,
        _ => TimeToResults::Quick,
    }
}

fn season_intent(label: &str) -> SeasonIntent {
    match label {
        "Happy to Wait" => SeasonIntent::HappyToWait,
        _ => SeasonIntent::StartNow,
    }
}

fn container_size(label: &str) -> String {
    match label {
        "Small (<=15cm)" => "small".to_string(),
        "Medium (16-25cm)" => "medium".to_string(),
        "Large (26-40cm)" => "large".to_string(),
        "Very Large (>40cm)" => "very_large".to_string(),
        other => other.to_lowercase(),
    }
}

fn lowercase_or(values: &[String], default: &[&str]) -> Vec<String> {
    if values.is_empty() {
        default.iter().map(|v| v.to_string()).collect()
    } else {
        values.iter().map(|v| v.to_lowercase()).collect()
    }
}

/// Translate form labels into the request body. Unknown or empty labels fall back to the
/// defaults the backend expects.
pub fn build_api_request(params: &SearchParams, n: u32) -> ApiRecommendationRequest {
    let area_m2 = params
        .area_size
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|a| *a > 0.0)
        .unwrap_or(DEFAULT_AREA_M2);

    let container_sizes = params
        .has_containers
        .then(|| params.container_sizes.iter().map(|s| container_size(s)).collect());

    ApiRecommendationRequest {
        suburb: params.location.trim().to_string(),
        n,
        climate_zone: None,
        user_preferences: ApiUserPreferences {
            user_id: ANONYMOUS_USER.to_string(),
            site: ApiSite {
                location_type: location_type(&params.location_type),
                area_m2,
                sun_exposure: sun_exposure(&params.sunlight),
                wind_exposure: wind_exposure(&params.wind_exposure),
                containers: params.has_containers,
                container_sizes,
            },
            preferences: ApiPreferences {
                goal: goal(&params.goal),
                edible_types: lowercase_or(&params.edible_types, &["herbs", "leafy"]),
                ornamental_types: lowercase_or(&params.ornamental_types, &["flowers"]),
                colors: lowercase_or(&params.colors, &["purple", "white"]),
                fragrant: params.fragrant,
                maintainability: level(&params.maintainability, Level::Low),
                watering: level(&params.watering, Level::Medium),
                time_to_results: time_to_results(&params.time_to_results),
                season_intent: season_intent(&params.season_intent),
                pollen_sensitive: params.pollen_sensitive,
                pets_or_toddlers: params.pets_or_toddlers,
            },
            practical: ApiPractical {
                budget: level(&params.budget, Level::Medium),
                has_basic_tools: params.has_basic_tools,
                organic_only: params.organic_only,
            },
            environment: ApiUserEnvironment::default(),
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationResults {
    pub plants: Vec<Plant>,
    pub notes: Vec<String>,
    pub suburb: String,
    pub climate_zone: String,
    pub month_now: String,
    pub show_results: bool,
    pub last_params: Option<SearchParams>,
}

pub struct RecommendationStore {
    backend: Arc<dyn RecommendationBackend>,
    images_base_url: String,
    count: u32,
    retry_min_delay: Duration,
    results: RwLock<RecommendationResults>,
    loading: LoadingTracker,
}

impl RecommendationStore {
    pub fn new(backend: Arc<dyn RecommendationBackend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            images_base_url: config.images_base_url.clone(),
            count: config.recommendation_count,
            retry_min_delay: Duration::from_millis(500),
            results: RwLock::new(RecommendationResults::default()),
            loading: LoadingTracker::new(),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_min_delay = delay;
        self
    }

    pub fn loading_state(&self) -> LoadingState {
        self.loading.snapshot()
    }

    pub async fn results(&self) -> RecommendationResults {
        self.results.read().await.clone()
    }

    /// Run a search. Previous plants are cleared up front; on failure the error is kept in
    /// the loading state and returned, and the previous `show_results` flag is left alone.
    pub async fn submit_search(&self, params: SearchParams) -> Result<Vec<Plant>, RecommendationError> {
        {
            let mut results = self.results.write().await;
            results.plants.clear();
            results.last_params = Some(params.clone());
        }
        self.loading.begin();

        let request = build_api_request(&params, self.count);
        let backend = &self.backend;
        let outcome = (|| async {
            backend.health_check().await?;
            backend.recommend(&request).await
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(self.retry_min_delay)
                .with_max_delay(Duration::from_secs(10))
                .with_max_times(3)
                .with_jitter(),
        )
        .when(|e: &ApiError| e.should_retry())
        .notify(|e, dur| {
            warn!(
                "Recommendation request failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                e
            )
        })
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(suburb = %request.suburb, error = %e, "Recommendation search failed");
                self.loading.fail(&e);
                return Err(e.into());
            }
        };

        let plants = transform::from_recommendations(&response, &self.images_base_url);
        info!(suburb = %response.suburb, count = plants.len(), "Recommendations received");

        let mut results = self.results.write().await;
        results.plants = plants.clone();
        results.notes = response.notes;
        results.suburb = response.suburb;
        results.climate_zone = response.climate_zone;
        results.month_now = response.month_now;
        results.show_results = true;
        drop(results);

        self.loading.succeed();
        Ok(plants)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use db::models::recommendation::ApiPlantRecommendation;

    use super::*;

    #[derive(Default)]
    struct FakeRecommender {
        failures_left: AtomicUsize,
        failure_status: u16,
        recommend_calls: AtomicUsize,
        last_request: Mutex<Option<ApiRecommendationRequest>>,
    }

    impl FakeRecommender {
        fn failing(times: usize, status: u16) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
                failure_status: status,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl RecommendationBackend for FakeRecommender {
        async fn health_check(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn recommend(
            &self,
            request: &ApiRecommendationRequest,
        ) -> Result<ApiRecommendationResponse, ApiError> {
            self.recommend_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(ApiError::HttpStatus {
                    status: self.failure_status,
                    status_text: "failure".into(),
                });
            }

            Ok(ApiRecommendationResponse {
                recommendations: vec![ApiPlantRecommendation {
                    id: Some(3),
                    plant_name: "Thyme".into(),
                    plant_category: "herb".into(),
                    ..Default::default()
                }],
                notes: vec!["Frost likely".into()],
                suburb: request.suburb.clone(),
                climate_zone: "temperate".into(),
                month_now: "October".into(),
            })
        }
    }

    fn store(backend: Arc<FakeRecommender>) -> RecommendationStore {
        RecommendationStore::new(backend, &ClientConfig::default())
            .with_retry_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_build_request_maps_labels() {
        let params = SearchParams {
            location: " Richmond ".into(),
            location_type: "Community Garden".into(),
            area_size: "12.5".into(),
            sunlight: "Full Sun (6-8h)".into(),
            wind_exposure: "Windy".into(),
            has_containers: true,
            container_sizes: vec!["Small (<=15cm)".into(), "Huge".into()],
            goal: "Edible".into(),
            edible_types: vec!["Herbs".into()],
            maintainability: "High".into(),
            time_to_results: "Patient (>120d)".into(),
            season_intent: "Happy to Wait".into(),
            budget: "Low".into(),
            ..Default::default()
        };
        let request = build_api_request(&params, 9);

        assert_eq!(request.suburb, "Richmond");
        assert_eq!(request.n, 9);
        let prefs = &request.user_preferences;
        assert_eq!(prefs.user_id, "anon_mvp");
        assert_eq!(prefs.site.location_type, LocationType::CommunityGarden);
        assert_eq!(prefs.site.area_m2, 12.5);
        assert_eq!(prefs.site.sun_exposure, SunExposure::FullSun);
        assert_eq!(prefs.site.wind_exposure, WindExposure::Windy);
        assert_eq!(
            prefs.site.container_sizes,
            Some(vec!["small".to_string(), "huge".to_string()])
        );
        assert_eq!(prefs.preferences.goal, Goal::Edible);
        assert_eq!(prefs.preferences.edible_types, vec!["herbs"]);
        assert_eq!(prefs.preferences.maintainability, Level::High);
        assert_eq!(prefs.preferences.time_to_results, TimeToResults::Patient);
        assert_eq!(prefs.preferences.season_intent, SeasonIntent::HappyToWait);
        assert_eq!(prefs.practical.budget, Level::Low);
    }

    #[test]
    fn test_build_request_defaults() {
        let request = build_api_request(&SearchParams::default(), 9);
        let prefs = &request.user_preferences;

        assert_eq!(prefs.site.location_type, LocationType::Backyard);
        assert_eq!(prefs.site.area_m2, 2.0);
        assert_eq!(prefs.site.sun_exposure, SunExposure::PartSun);
        assert_eq!(prefs.site.container_sizes, None);
        assert_eq!(prefs.preferences.goal, Goal::Mixed);
        assert_eq!(prefs.preferences.edible_types, vec!["herbs", "leafy"]);
        assert_eq!(prefs.preferences.ornamental_types, vec!["flowers"]);
        assert_eq!(prefs.preferences.colors, vec!["purple", "white"]);
        assert_eq!(prefs.preferences.maintainability, Level::Low);
        assert_eq!(prefs.preferences.watering, Level::Medium);
        assert_eq!(prefs.practical.budget, Level::Medium);
        assert_eq!(prefs.environment.climate_zone.as_deref(), Some("temperate"));

        let body = serde_json::to_value(&request).unwrap();
        assert!(body["climate_zone"].is_null());
        assert!(body["user_preferences"]["site"].get("container_sizes").is_none());
        assert_eq!(body["user_preferences"]["site"]["location_type"], "backyard");
    }

    #[tokio::test]
    async fn test_submit_search_stores_results() {
        let backend = Arc::new(FakeRecommender::default());
        let store = store(backend.clone());

        let plants = store
            .submit_search(SearchParams {
                location: "Fitzroy".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(plants.len(), 1);

        let results = store.results().await;
        assert!(results.show_results);
        assert_eq!(results.suburb, "Fitzroy");
        assert_eq!(results.notes, vec!["Frost likely"]);
        assert_eq!(results.plants[0].name, "Thyme");
        assert!(store.loading_state().initialized);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(FakeRecommender::failing(2, 503));
        let store = store(backend.clone());

        store.submit_search(SearchParams::default()).await.unwrap();
        assert_eq!(backend.recommend_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_visible_and_not_retried() {
        let backend = Arc::new(FakeRecommender::failing(1, 422));
        let store = store(backend.clone());

        let err = store.submit_search(SearchParams::default()).await.unwrap_err();
        assert!(matches!(
            err,
            RecommendationError::Api(ApiError::HttpStatus { status: 422, .. })
        ));
        assert_eq!(backend.recommend_calls.load(Ordering::SeqCst), 1);

        let state = store.loading_state();
        assert!(!state.is_loading);
        assert!(state.error.unwrap().contains("422"));
        assert!(store.results().await.plants.is_empty());
        assert!(backend.last_request.lock().unwrap().is_some());
    }
}
