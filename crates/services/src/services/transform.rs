//! Normalisation of catalog and recommendation payloads into [`Plant`]s.
//!
//! Everything here is pure: the same payload and image base always produce the same plants.

use db::models::{
    api_plant::{ApiAllPlantsResponse, ApiPaginatedPlantsResponse, ApiPlantData},
    plant::{
        Benefits, CareRequirements, Intensity, Plant, PlantCategory, PlantId,
        RecommendationDetails, SowingInfo, Sunlight,
    },
    recommendation::{ApiPlantRecommendation, ApiRecommendationResponse},
};
use tracing::debug;

use super::image::{ImageSources, resolve_image_url};

const NO_DESCRIPTION: &str = "No description available.";

/// Server id when the record has one, otherwise `{name_with_underscores}_{index}`.
fn plant_id(server_id: Option<i64>, name: &str, index: usize) -> PlantId {
    match server_id {
        Some(id) => PlantId::Server(id),
        None => PlantId::Generated(format!(
            "{}_{index}",
            utils::text::join_whitespace(name, "_").to_lowercase()
        )),
    }
}

pub fn derive_tags(api: &ApiPlantData) -> Vec<String> {
    let mut tags = vec![api.plant_category.clone()];

    if let Some(plant_type) = api
        .plant_type
        .as_deref()
        .filter(|t| !t.is_empty() && *t != api.plant_category)
    {
        tags.push(plant_type.to_string());
    }

    if let Some(characteristics) = api.characteristics.as_deref() {
        let c = characteristics.to_lowercase();
        for (needle, tag) in [
            ("drought", "drought-tolerant"),
            ("fragrant", "fragrant"),
            ("compact", "compact"),
            ("climbing", "climbing"),
            ("fast", "fast-growing"),
            ("container", "container-friendly"),
        ] {
            if c.contains(needle) {
                tags.push(tag.to_string());
            }
        }
    }

    if let Some(season) = api.season.as_deref() {
        let s = season.to_lowercase();
        for (needles, tag) in [
            (&["summer"][..], "summer"),
            (&["winter"][..], "winter"),
            (&["spring"][..], "spring"),
            (&["autumn", "fall"][..], "autumn"),
        ] {
            if needles.iter().any(|n| s.contains(n)) {
                tags.push(tag.to_string());
            }
        }
    }

    match api.days_to_maturity {
        Some(days) if days <= 60 => tags.push("quick-growing".to_string()),
        Some(days) if days > 120 => tags.push("slow-growing".to_string()),
        _ => {}
    }

    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| !t.is_empty() && seen.insert(t.clone()));
    tags
}

fn sunlight_label(api: &ApiPlantData) -> Option<&'static str> {
    if let Some(sun_need) = api.sun_need.as_deref().filter(|s| !s.is_empty()) {
        return match sun_need.to_lowercase().as_str() {
            "full_sun" => Some("Full sun (6-8h)"),
            "part_sun" => Some("Part sun (3-5h)"),
            "bright_shade" => Some("Bright shade (1-3h)"),
            _ => None,
        };
    }

    let position = api.position.as_deref()?.to_lowercase();
    if position.contains("full sun") {
        Some("Full sun (6-8h)")
    } else if position.contains("part sun") || position.contains("partial") {
        Some("Part sun (3-5h)")
    } else if position.contains("shade") {
        Some("Bright shade (1-3h)")
    } else {
        None
    }
}

pub fn derive_care(api: &ApiPlantData) -> CareRequirements {
    let watering = match api.characteristics.as_deref().filter(|c| !c.is_empty()) {
        Some(c) if c.to_lowercase().contains("drought") => "Low",
        Some(_) => "Medium",
        None if PlantCategory::from_label(&api.plant_category) == PlantCategory::Herb => "Low",
        None => "Medium",
    };

    let season = api.season.as_deref().unwrap_or_default().to_lowercase();
    let temperature = if season.contains("cool") || season.contains("winter") {
        "10-18°C"
    } else if season.contains("warm") || season.contains("summer") {
        "18-26°C"
    } else {
        "15-22°C"
    };

    CareRequirements {
        sunlight: sunlight_label(api).map(str::to_string),
        watering: Some(watering.to_string()),
        soil: Some("Well-draining".to_string()),
        temperature: Some(temperature.to_string()),
    }
}

fn catalog_plant(api: &ApiPlantData, index: usize, images_base_url: &str) -> Plant {
    let media = api.media.clone().unwrap_or_default();
    let sources = ImageSources {
        image_url: media.image_url.as_deref().or(api.image_url.as_deref()),
        image_base64: media.image_base64.as_deref(),
        image_path: media.image_path.as_deref(),
        drive_url: media.drive_url.as_deref(),
        plant_name: &api.plant_name,
        scientific_name: &api.scientific_name,
        category: &api.plant_category,
    };

    Plant {
        id: plant_id(api.id, &api.plant_name, index),
        name: api.plant_name.clone(),
        scientific_name: api.scientific_name.clone(),
        description: api
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        category: PlantCategory::from_label(&api.plant_category),
        plant_type: api.plant_type.clone(),
        additional_information: api.additional_information.clone(),
        days_to_maturity: api.days_to_maturity,
        plant_spacing: api.plant_spacing.clone(),
        sowing_depth: api.sowing_depth.clone(),
        position: api.position.clone(),
        sun_need: api.sun_need.clone(),
        season: api.season.clone(),
        germination_period: api.germination_period.clone(),
        sowing_method: api.sowing_method.clone(),
        hardiness_life_cycle: api.hardiness_life_cycle.clone(),
        characteristics: api.characteristics.clone(),
        climate_specific_sowing: api.climate_specific_sowing.clone(),
        image_url: resolve_image_url(&sources, images_base_url),
        image_base64: media.image_base64.clone(),
        has_image: media.has_image.unwrap_or(false),
        tags: derive_tags(api),
        care_requirements: derive_care(api),
        container_ok: api.container_ok,
        indoor_ok: api.indoor_ok,
        edible: api.edible,
        fragrant: api.fragrant,
        flower_colors: api.flower_colors.clone(),
        habit: api.habit.clone(),
        maintainability_score: api.maintainability_score,
        recommendation: None,
    }
}

pub fn catalog_plants(plants: &[ApiPlantData], images_base_url: &str) -> Vec<Plant> {
    plants
        .iter()
        .enumerate()
        .map(|(index, api)| catalog_plant(api, index, images_base_url))
        .collect()
}

pub fn from_all_plants(response: &ApiAllPlantsResponse, images_base_url: &str) -> Vec<Plant> {
    debug!(count = response.plants.len(), "Transforming full catalog");
    catalog_plants(&response.plants, images_base_url)
}

pub fn from_paginated(response: &ApiPaginatedPlantsResponse, images_base_url: &str) -> Vec<Plant> {
    catalog_plants(&response.plants, images_base_url)
}

fn map_sunlight(sun_need: &str) -> Sunlight {
    match sun_need.to_lowercase().as_str() {
        "full_sun" => Sunlight::Full,
        "bright_shade" | "shade" => Sunlight::Shade,
        _ => Sunlight::Partial,
    }
}

/// Watering and effort share the same maintainability scale.
fn map_maintainability(maintainability: &str) -> Intensity {
    match maintainability.to_lowercase().as_str() {
        "hardy" => Intensity::Low,
        "high_maintenance" => Intensity::High,
        _ => Intensity::Medium,
    }
}

fn cooling_effect(category: &str) -> &'static str {
    match category.to_lowercase().as_str() {
        "tree" => "high cooling effect",
        "flower" | "herb" => "low cooling effect",
        _ => "moderate cooling effect",
    }
}

fn carbon_reduction(category: &str) -> &'static str {
    match category.to_lowercase().as_str() {
        "tree" => "high",
        "flower" | "herb" | "vegetable" => "low",
        _ => "moderate",
    }
}

fn recommended_plant(api: &ApiPlantRecommendation, index: usize, images_base_url: &str) -> Plant {
    let category = api.plant_category.to_lowercase();
    let hardy = api.fit.maintainability.eq_ignore_ascii_case("hardy");
    let sources = ImageSources {
        image_url: api.media.image_url.as_deref(),
        image_base64: api.media.image_base64.as_deref(),
        image_path: api.media.image_path.as_deref(),
        drive_url: api.media.drive_url.as_deref(),
        plant_name: &api.plant_name,
        scientific_name: &api.scientific_name,
        category: &api.plant_category,
    };

    let details = RecommendationDetails {
        score: api.score,
        why_recommended: api.why.clone(),
        sunlight: map_sunlight(&api.fit.sun_need),
        water: map_maintainability(&api.fit.maintainability),
        effort: map_maintainability(&api.fit.maintainability),
        benefits: Benefits {
            edible: category == "herb" || category == "vegetable",
            fragrant: category == "herb",
            pet_safe: true,
            air_purifying: api.fit.indoor_ok,
            drought_resistant: hardy,
            container_friendly: api.fit.container_ok,
            indoor_suitable: api.fit.indoor_ok,
        },
        cooling_effect: cooling_effect(&category).to_string(),
        carbon_reduction: carbon_reduction(&category).to_string(),
        drought_tolerance: if hardy { "excellent" } else { "moderate" }.to_string(),
        sowing_info: SowingInfo {
            climate_zone: api.sowing.climate_zone.clone(),
            months: api.sowing.months.clone(),
            method: api.sowing.method.clone(),
            season_label: api.sowing.season_label.clone(),
        },
        image_path: api.media.image_path.clone(),
    };

    Plant {
        id: plant_id(api.id, &api.plant_name, index),
        name: api.plant_name.clone(),
        scientific_name: api.scientific_name.clone(),
        description: api
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        category: PlantCategory::from_label(&api.plant_category),
        plant_type: None,
        additional_information: None,
        days_to_maturity: api.fit.time_to_maturity_days,
        plant_spacing: None,
        sowing_depth: None,
        position: None,
        sun_need: Some(api.fit.sun_need.clone()).filter(|s| !s.is_empty()),
        season: None,
        germination_period: None,
        sowing_method: Some(api.sowing.method.clone()).filter(|m| !m.is_empty()),
        hardiness_life_cycle: None,
        characteristics: None,
        climate_specific_sowing: Default::default(),
        image_url: resolve_image_url(&sources, images_base_url),
        image_base64: api.media.image_base64.clone(),
        has_image: api.media.has_image.unwrap_or(false),
        tags: Vec::new(),
        care_requirements: CareRequirements::default(),
        container_ok: Some(api.fit.container_ok),
        indoor_ok: Some(api.fit.indoor_ok),
        edible: None,
        fragrant: None,
        flower_colors: Vec::new(),
        habit: None,
        maintainability_score: None,
        recommendation: Some(details),
    }
}

pub fn from_recommendations(
    response: &ApiRecommendationResponse,
    images_base_url: &str,
) -> Vec<Plant> {
    debug!(
        count = response.recommendations.len(),
        suburb = %response.suburb,
        "Transforming recommendations"
    );
    response
        .recommendations
        .iter()
        .enumerate()
        .map(|(index, api)| recommended_plant(api, index, images_base_url))
        .collect()
}
