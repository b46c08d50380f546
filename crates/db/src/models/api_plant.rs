//! Wire shapes of the `/plants` and `/plants/paginated` endpoints.
//!
//! Every field is optional or defaulted: the backend omits fields freely and older
//! deployments use different names for the pagination metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Image sources the backend may attach to a plant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMedia {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub drive_url: Option<String>,
    #[serde(default)]
    pub drive_thumbnail: Option<String>,
    #[serde(default)]
    pub has_image: Option<bool>,
}

/// One catalog record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPlantData {
    #[serde(alias = "plant_id")]
    pub id: Option<i64>,
    pub plant_name: String,
    pub scientific_name: String,
    pub plant_category: String,
    pub plant_type: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
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
    pub container_ok: Option<bool>,
    pub indoor_ok: Option<bool>,
    pub edible: Option<bool>,
    pub fragrant: Option<bool>,
    pub flower_colors: Vec<String>,
    pub habit: Option<String>,
    pub maintainability_score: Option<f64>,
    pub media: Option<ApiMedia>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryCounts {
    pub vegetable: u64,
    pub herb: u64,
    pub flower: u64,
}

/// `GET /plants`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiAllPlantsResponse {
    pub plants: Vec<ApiPlantData>,
    pub total_count: u64,
    pub categories: CategoryCounts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPagination {
    pub total: Option<u64>,
    pub total_count: Option<u64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// `GET /plants/paginated`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPaginatedPlantsResponse {
    pub plants: Vec<ApiPlantData>,
    pub total_count: Option<u64>,
    pub total: Option<u64>,
    pub categories: Option<CategoryCounts>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub pagination: Option<ApiPagination>,
}

impl ApiPaginatedPlantsResponse {
    /// Total matching plants, wherever this backend version put it
    pub fn total(&self) -> u64 {
        let pagination = self.pagination.as_ref();
        self.total_count
            .or_else(|| pagination.and_then(|p| p.total_count))
            .or_else(|| pagination.and_then(|p| p.total))
            .or(self.total)
            .unwrap_or(0)
    }

    pub fn page_or(&self, requested: u32) -> u32 {
        self.page
            .or_else(|| self.pagination.as_ref().and_then(|p| p.page))
            .unwrap_or(requested)
    }

    pub fn limit_or(&self, requested: u32) -> u32 {
        self.limit
            .or_else(|| self.pagination.as_ref().and_then(|p| p.limit))
            .unwrap_or(requested)
    }
}
