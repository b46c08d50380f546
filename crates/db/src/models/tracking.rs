use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /tracking/start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTrackingRequest {
    pub email: String,
    pub plant_id: i64,
    pub plant_nickname: String,
    pub start_date: chrono::NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_details: Option<String>,
}

/// A planted instance being tracked over time. Fields the client does not interpret are kept
/// in `extra` so they round-trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantInstance {
    #[serde(alias = "instance_id")]
    pub id: i64,
    #[serde(default)]
    pub plant_id: Option<i64>,
    #[serde(default)]
    pub plant_nickname: Option<String>,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub days_elapsed: Option<u32>,
    #[serde(default)]
    pub progress_percentage: Option<f64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PlantInstancesPayload {
    Wrapped { plants: Vec<PlantInstance> },
    Bare(Vec<PlantInstance>),
}

impl PlantInstancesPayload {
    pub fn into_instances(self) -> Vec<PlantInstance> {
        match self {
            Self::Wrapped { plants } => plants,
            Self::Bare(instances) => instances,
        }
    }
}

/// Body of `PUT /tracking/instance/{id}/progress`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_details: Option<String>,
}
