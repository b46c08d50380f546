use serde::{Deserialize, Serialize};

use super::api_plant::ApiMedia;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiFit {
    pub sun_need: String,
    pub time_to_maturity_days: Option<u32>,
    pub maintainability: String,
    pub container_ok: bool,
    pub indoor_ok: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSowing {
    pub climate_zone: String,
    pub months: Vec<String>,
    pub method: String,
    pub season_label: String,
}

/// One scored plant in a `/recommendations` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPlantRecommendation {
    #[serde(alias = "plant_id")]
    pub id: Option<i64>,
    pub plant_name: String,
    pub scientific_name: String,
    pub plant_category: String,
    pub description: Option<String>,
    pub score: f64,
    pub why: Vec<String>,
    pub fit: ApiFit,
    pub sowing: ApiSowing,
    pub media: ApiMedia,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiRecommendationResponse {
    pub recommendations: Vec<ApiPlantRecommendation>,
    pub notes: Vec<String>,
    pub suburb: String,
    pub climate_zone: String,
    pub month_now: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Indoors,
    Balcony,
    Courtyard,
    #[default]
    Backyard,
    CommunityGarden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SunExposure {
    FullSun,
    #[default]
    PartSun,
    BrightShade,
    LowLight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindExposure {
    Sheltered,
    #[default]
    Moderate,
    Windy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Edible,
    Ornamental,
    #[default]
    Mixed,
}

/// Shared low/medium/high scale for maintainability, watering and budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeToResults {
    #[default]
    Quick,
    Standard,
    Patient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeasonIntent {
    #[default]
    StartNow,
    HappyToWait,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSite {
    pub location_type: LocationType,
    pub area_m2: f64,
    pub sun_exposure: SunExposure,
    pub wind_exposure: WindExposure,
    pub containers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_sizes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPreferences {
    pub goal: Goal,
    pub edible_types: Vec<String>,
    pub ornamental_types: Vec<String>,
    pub colors: Vec<String>,
    pub fragrant: bool,
    pub maintainability: Level,
    pub watering: Level,
    pub time_to_results: TimeToResults,
    pub season_intent: SeasonIntent,
    pub pollen_sensitive: bool,
    pub pets_or_toddlers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPractical {
    pub budget: Level,
    pub has_basic_tools: bool,
    pub organic_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUserEnvironment {
    pub climate_zone: Option<String>,
    pub month_now: Option<String>,
    pub uv_index: Option<f64>,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_kph: Option<f64>,
}

impl Default for ApiUserEnvironment {
    fn default() -> Self {
        Self {
            climate_zone: Some("temperate".to_string()),
            month_now: Some(String::new()),
            uv_index: Some(0.0),
            temperature_c: Some(8.0),
            humidity_pct: Some(75.0),
            wind_speed_kph: Some(15.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUserPreferences {
    pub user_id: String,
    pub site: ApiSite,
    pub preferences: ApiPreferences,
    pub practical: ApiPractical,
    pub environment: ApiUserEnvironment,
}

/// Body of `POST /recommendations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRecommendationRequest {
    pub suburb: String,
    pub n: u32,
    pub climate_zone: Option<String>,
    pub user_preferences: ApiUserPreferences,
}
