use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Catalog category of a plant
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PlantCategory {
    Vegetable,
    Herb,
    Flower,
    /// Anything the backend sends outside the three catalog categories
    #[default]
    #[serde(other)]
    Other,
}

impl PlantCategory {
    pub fn from_label(label: &str) -> Self {
        label.trim().parse().unwrap_or(Self::Other)
    }
}

/// Plant identity.
///
/// `Server` ids are stable across requests. `Generated` ids are derived from name and position
/// in a single response and must not be used to correlate plants between responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlantId {
    Server(i64),
    Generated(String),
}

impl PlantId {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    pub fn server_id(&self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Generated(_) => None,
        }
    }
}

impl fmt::Display for PlantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Generated(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareRequirements {
    pub sunlight: Option<String>,
    pub watering: Option<String>,
    pub soil: Option<String>,
    pub temperature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sunlight {
    Full,
    Partial,
    Shade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Benefits {
    pub edible: bool,
    pub fragrant: bool,
    pub pet_safe: bool,
    pub air_purifying: bool,
    pub drought_resistant: bool,
    pub container_friendly: bool,
    pub indoor_suitable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SowingInfo {
    pub climate_zone: String,
    pub months: Vec<String>,
    pub method: String,
    pub season_label: String,
}

/// Fields that only exist when the plant came out of a recommendation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationDetails {
    pub score: f64,
    pub why_recommended: Vec<String>,
    pub sunlight: Sunlight,
    pub water: Intensity,
    pub effort: Intensity,
    pub benefits: Benefits,
    pub cooling_effect: String,
    pub carbon_reduction: String,
    pub drought_tolerance: String,
    pub sowing_info: SowingInfo,
    pub image_path: Option<String>,
}

/// Normalized plant, independent of which endpoint produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: PlantId,
    pub name: String,
    pub scientific_name: String,
    pub description: String,
    pub category: PlantCategory,
    pub plant_type: Option<String>,
    pub additional_information: Option<String>,
    pub days_to_maturity: Option<u32>,
    pub plant_spacing: Option<String>,
    pub sowing_depth: Option<String>,
    pub position: Option<String>,
    pub sun_need: Option<String>,
    pub season: Option<String>,
    pub germination_period: Option<String>,
    pub sowing_method: Option<String>,
    pub hardiness_life_cycle: Option<String>,
    pub characteristics: Option<String>,
    pub climate_specific_sowing: BTreeMap<String, String>,
    pub image_url: String,
    pub image_base64: Option<String>,
    pub has_image: bool,
    pub tags: Vec<String>,
    pub care_requirements: CareRequirements,
    pub container_ok: Option<bool>,
    pub indoor_ok: Option<bool>,
    pub edible: Option<bool>,
    pub fragrant: Option<bool>,
    pub flower_colors: Vec<String>,
    pub habit: Option<String>,
    pub maintainability_score: Option<f64>,
    pub recommendation: Option<RecommendationDetails>,
}
