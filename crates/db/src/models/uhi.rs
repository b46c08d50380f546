use serde::{Deserialize, Serialize};

/// `GET /uhi/boundaries`: where the boundary GeoJSON lives, usually a bucket URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UhiBoundaryLink {
    pub url: String,
}
