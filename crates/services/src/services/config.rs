//! Client configuration, resolved from the environment with built-in defaults.

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_IMAGES_BASE_URL: &str =
    "https://storage.googleapis.com/plantopia-images-1757656642/plant_images";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin, without the `/api/v1` prefix
    pub api_url: String,
    /// Second origin tried when the primary is unreachable
    pub fallback_api_url: Option<String>,
    /// Bucket base that relative image paths are resolved against
    pub images_base_url: String,
    /// Deadline for each individual HTTP call
    pub request_timeout: Duration,
    pub default_page_size: u32,
    /// Pause between two pages of a background prefetch
    pub prefetch_pacing: Duration,
    /// Pause after a prefetch page failed
    pub prefetch_backoff: Duration,
    /// Number of recommendations requested per search
    pub recommendation_count: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            fallback_api_url: None,
            images_base_url: DEFAULT_IMAGES_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            default_page_size: 12,
            prefetch_pacing: Duration::from_millis(150),
            prefetch_backoff: Duration::from_millis(500),
            recommendation_count: 9,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `PLANTOPIA_API_URL`, `PLANTOPIA_FALLBACK_API_URL`,
    /// `PLANTOPIA_IMAGES_BASE_URL` and `PLANTOPIA_TIMEOUT_SECS` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("PLANTOPIA_API_URL") {
            config = config.with_api_url(&raw)?;
        }
        if let Ok(raw) = std::env::var("PLANTOPIA_FALLBACK_API_URL") {
            config = config.with_fallback_api_url(&raw)?;
        }
        if let Ok(raw) = std::env::var("PLANTOPIA_IMAGES_BASE_URL") {
            config.images_base_url = raw.trim_end_matches('/').to_string();
        }
        if let Ok(raw) = std::env::var("PLANTOPIA_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                var: "PLANTOPIA_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_api_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_url = parse_origin("PLANTOPIA_API_URL", raw)?;
        Ok(self)
    }

    pub fn with_fallback_api_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.fallback_api_url = Some(parse_origin("PLANTOPIA_FALLBACK_API_URL", raw)?);
        Ok(self)
    }
}

fn parse_origin(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.default_page_size, 12);
    }

    #[test]
    fn test_with_api_url_rejects_garbage() {
        assert!(ClientConfig::default().with_api_url("not a url").is_err());
        let config = ClientConfig::default()
            .with_api_url("https://plants.example.com")
            .unwrap();
        assert_eq!(config.api_url, "https://plants.example.com");
    }

    #[test]
    fn test_fallback_url_is_validated() {
        assert_eq!(ClientConfig::default().fallback_api_url, None);
        let err = ClientConfig::default()
            .with_fallback_api_url("::")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidUrl { var: "PLANTOPIA_FALLBACK_API_URL", .. }
        ));

        let config = ClientConfig::default()
            .with_fallback_api_url("http://localhost:9000/")
            .unwrap();
        assert_eq!(config.fallback_api_url.as_deref(), Some("http://localhost:9000"));
    }
}
