use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

const KEY_SEPARATOR: &str = "///";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideCategory {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub file_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideFileSummary {
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// `GET /markdown/categories`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuideCategoriesResponse {
    pub categories: Vec<GuideCategory>,
    pub total_categories: Option<u32>,
}

/// `GET /markdown/category/{slug}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuideFilesResponse {
    pub category: String,
    pub files: Vec<GuideFileSummary>,
}

/// `GET /markdown/file/{category}/{filename}`
#[derive(Debug, Clone, Deserialize)]
pub struct GuideFileResponse {
    #[serde(default)]
    pub category: String,
    pub file: Option<GuideFileSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideFavoriteRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub guide_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuideFavoritesResponse {
    pub favorites: Vec<GuideFavoriteRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddGuideFavoriteRequest<'a> {
    pub email: &'a str,
    pub guide_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'a str>,
}

/// Composite identity of a guide document: category slug plus file name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuideKey {
    pub category: String,
    pub filename: String,
}

impl GuideKey {
    pub fn new(category: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            filename: filename.into(),
        }
    }
}

impl From<&GuideFavoriteRecord> for GuideKey {
    fn from(record: &GuideFavoriteRecord) -> Self {
        Self::new(record.category.clone().unwrap_or_default(), &record.guide_name)
    }
}

impl fmt::Display for GuideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.category, KEY_SEPARATOR, self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("guide key must look like `category///filename`: {0}")]
pub struct ParseGuideKeyError(String);

impl FromStr for GuideKey {
    type Err = ParseGuideKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(KEY_SEPARATOR) {
            Some((category, filename)) if !filename.is_empty() => {
                Ok(Self::new(category, filename))
            }
            _ => Err(ParseGuideKeyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guide_key_display_parse() {
        let key = GuideKey::new("composting", "hot-compost.md");
        assert_eq!(key.to_string(), "composting///hot-compost.md");
        assert_eq!("composting///hot-compost.md".parse::<GuideKey>().unwrap(), key);
        assert!("no-separator.md".parse::<GuideKey>().is_err());
        assert!("composting///".parse::<GuideKey>().is_err());
    }

    #[test]
    fn test_key_from_record_without_category() {
        let record = GuideFavoriteRecord {
            id: Some(1),
            guide_name: "watering.md".into(),
            category: None,
            notes: None,
            created_at: None,
        };
        assert_eq!(GuideKey::from(&record).to_string(), "///watering.md");
    }
}
