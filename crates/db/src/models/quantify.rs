use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /quantify-plant`; `POST /batch-quantify` takes a list of these
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiQuantifyRequest {
    pub plant_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climate_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_count: Option<u32>,
    pub user_preferences: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiQuantifiedImpact {
    pub temperature_reduction_c: f64,
    pub air_quality_points: f64,
    pub co2_absorption_kg_year: f64,
    pub water_processed_l_week: f64,
    pub pollinator_support: String,
    pub edible_yield: Option<String>,
    pub maintenance_time: String,
    pub water_requirement: String,
    pub risk_badge: String,
    pub confidence_level: String,
    pub why_this_plant: String,
    pub community_impact_potential: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSuitabilityScore {
    pub total_score: f64,
    pub breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiQuantifyResponse {
    pub plant_name: String,
    pub scientific_name: Option<String>,
    pub plant_category: String,
    pub quantified_impact: ApiQuantifiedImpact,
    pub suitability_score: ApiSuitabilityScore,
    pub suburb: String,
    pub climate_zone: String,
    pub plant_count: u32,
}
