//! Image URL resolution for plants.
//!
//! The first present source wins: absolute URL, inline base64, bucket path, drive URL, a path
//! guessed from the plant's names inside the dataset folders, the category placeholder, and
//! finally the generic placeholder. The guessed path is never checked for existence.

use urlencoding::encode;
use utils::text::{join_whitespace, strip_to_ascii_word};

pub const GENERIC_PLACEHOLDER: &str = "/placeholder-plant.svg";
const BUCKET_PREFIX: &str = "plant_images/";
const DATASET_INDICES: [u8; 4] = [1, 2, 3, 4];

/// Every image-related field a backend record may carry
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSources<'a> {
    pub image_url: Option<&'a str>,
    pub image_base64: Option<&'a str>,
    pub image_path: Option<&'a str>,
    pub drive_url: Option<&'a str>,
    pub plant_name: &'a str,
    pub scientific_name: &'a str,
    pub category: &'a str,
}

pub fn resolve_image_url(sources: &ImageSources<'_>, images_base_url: &str) -> String {
    if let Some(url) = present(sources.image_url) {
        return url.to_string();
    }
    if let Some(data) = present(sources.image_base64) {
        return format!("data:image/jpeg;base64,{data}");
    }
    if let Some(url) = present(sources.image_path).map(|p| bucket_url(p, images_base_url)) {
        return url;
    }
    if let Some(url) = present(sources.drive_url) {
        return url.to_string();
    }
    if let Some(url) =
        dataset_candidates(sources.plant_name, sources.scientific_name, sources.category, images_base_url)
            .into_iter()
            .next()
    {
        return url;
    }
    category_placeholder(sources.category)
        .unwrap_or(GENERIC_PLACEHOLDER)
        .to_string()
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_absolute(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolve a storage path against the bucket base. Absolute URLs pass through, a leading
/// `plant_images/` is dropped once since the base already ends there.
pub fn bucket_url(path: &str, images_base_url: &str) -> String {
    if is_absolute(path) {
        return path.to_string();
    }
    let normalized = path.trim_start_matches('/');
    let relative = normalized.strip_prefix(BUCKET_PREFIX).unwrap_or(normalized);
    format!("{}/{}", images_base_url.trim_end_matches('/'), relative)
}

fn dataset_folder(category: &str) -> Option<&'static str> {
    match category.trim().to_ascii_lowercase().as_str() {
        "flower" => Some("flower_plant_images"),
        "herb" => Some("herb_plant_images"),
        "vegetable" => Some("vegetable_plant_images"),
        _ => None,
    }
}

pub fn category_placeholder(category: &str) -> Option<&'static str> {
    match category.trim().to_ascii_lowercase().as_str() {
        "flower" => Some("/Flower.jpg"),
        "herb" => Some("/Herb.jpg"),
        "vegetable" => Some("/Vegetable.jpg"),
        _ => None,
    }
}

/// Name patterns to try, most specific first: `{name}_{scientific}` then `{name}`, for the raw
/// names, the diacritic-stripped names, and their underscore and hyphen spellings.
fn name_patterns(plant_name: &str, scientific_name: &str) -> Vec<String> {
    let stripped_plant = strip_to_ascii_word(plant_name);
    let stripped_sci = strip_to_ascii_word(scientific_name);
    let bases = [
        (plant_name.to_string(), scientific_name.to_string()),
        (stripped_plant, stripped_sci),
    ];

    let mut patterns: Vec<String> = Vec::new();
    let mut push = |plant: String, sci: String| {
        if !sci.is_empty() {
            patterns.push(format!("{plant}_{sci}"));
        }
        if !plant.is_empty() {
            patterns.push(plant);
        }
    };

    for (plant, sci) in &bases {
        push(plant.clone(), sci.clone());
    }
    for sep in ["_", "-"] {
        for (plant, sci) in &bases {
            push(join_whitespace(plant, sep), join_whitespace(sci, sep));
        }
    }

    let mut seen = std::collections::HashSet::new();
    patterns.retain(|p| seen.insert(p.clone()));
    patterns
}

/// Every guessed dataset URL for a plant, in preference order. Empty when the category has no
/// dataset folder or the plant has no name.
pub fn dataset_candidates(
    plant_name: &str,
    scientific_name: &str,
    category: &str,
    images_base_url: &str,
) -> Vec<String> {
    let plant_name = plant_name.trim();
    let Some(folder) = dataset_folder(category) else {
        return Vec::new();
    };
    if plant_name.is_empty() {
        return Vec::new();
    }

    let base = images_base_url.trim_end_matches('/');
    name_patterns(plant_name, scientific_name.trim())
        .iter()
        .flat_map(|pattern| {
            let encoded = encode(pattern).into_owned();
            DATASET_INDICES
                .iter()
                .map(move |idx| format!("{base}/{folder}/{encoded}/{encoded}_{idx}.jpg"))
        })
        .collect()
}
