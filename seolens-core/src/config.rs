// Settings from SEOLENS_* environment variables and crawl request validation

use crate::error::{Result, SeoError};
use seolens_scanner::fetcher::DEFAULT_USER_AGENT;
use seolens_scanner::normalize::normalize_url;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const MAX_CONCURRENT_CAP: usize = 100;
pub const MAX_DEPTH_RANGE: (usize, usize) = (1, 10);
pub const MAX_PAGES_RANGE: (usize, usize) = (1, 50_000);

/// Dimension weights. Always normalized to sum to 1.0 once built through [`ScoreWeights::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub technical: f64,
    pub content: f64,
    pub authority: f64,
    pub linking: f64,
    pub ai_visibility: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            technical: 0.35,
            content: 0.30,
            authority: 0.20,
            linking: 0.10,
            ai_visibility: 0.05,
        }
    }
}

impl ScoreWeights {
    pub fn new(
        technical: f64,
        content: f64,
        authority: f64,
        linking: f64,
        ai_visibility: f64,
    ) -> Result<Self> {
        Self {
            technical,
            content,
            authority,
            linking,
            ai_visibility,
        }
        .normalized()
    }

    fn as_array(&self) -> [f64; 5] {
        [
            self.technical,
            self.content,
            self.authority,
            self.linking,
            self.ai_visibility,
        ]
    }

    pub fn normalized(self) -> Result<Self> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SeoError::Validation(
                "score weights must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(SeoError::Validation(
                "at least one score weight must be positive".to_string(),
            ));
        }
        Ok(Self {
            technical: self.technical / total,
            content: self.content / total,
            authority: self.authority / total,
            linking: self.linking / total,
            ai_visibility: self.ai_visibility / total,
        })
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub max_concurrent: usize,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub rate_limit_rps: f64,
    pub weights: ScoreWeights,
    pub target_rank: u32,
    pub opportunity_threshold: f64,
    pub keyword_limit: usize,
    pub bucket_idle: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit_rps: 5.0,
            weights: ScoreWeights::default(),
            target_rank: 3,
            opportunity_threshold: 10.0,
            keyword_limit: 500,
            bucket_idle: Duration::from_secs(300),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Unparseable values keep
    /// their default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let max_concurrent = parse_var(&lookup, "SEOLENS_MAX_CONCURRENT", defaults.max_concurrent)
            .clamp(1, MAX_CONCURRENT_CAP);
        let timeout_secs = parse_var(
            &lookup,
            "SEOLENS_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        );
        let user_agent = lookup("SEOLENS_USER_AGENT")
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(defaults.user_agent);
        let mut rate_limit_rps = parse_var(&lookup, "SEOLENS_RATE_LIMIT_RPS", defaults.rate_limit_rps);
        if !(rate_limit_rps.is_finite() && rate_limit_rps > 0.0) {
            warn!("SEOLENS_RATE_LIMIT_RPS must be positive, using {}", defaults.rate_limit_rps);
            rate_limit_rps = defaults.rate_limit_rps;
        }

        let w = defaults.weights;
        let raw_weights = ScoreWeights {
            technical: parse_var(&lookup, "SEOLENS_WEIGHT_TECHNICAL", w.technical),
            content: parse_var(&lookup, "SEOLENS_WEIGHT_CONTENT", w.content),
            authority: parse_var(&lookup, "SEOLENS_WEIGHT_AUTHORITY", w.authority),
            linking: parse_var(&lookup, "SEOLENS_WEIGHT_LINKING", w.linking),
            ai_visibility: parse_var(&lookup, "SEOLENS_WEIGHT_AI_VISIBILITY", w.ai_visibility),
        };
        let weights = raw_weights.normalized().unwrap_or_else(|e| {
            warn!("Ignoring score weight overrides: {}", e);
            w
        });

        Self {
            max_concurrent,
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            user_agent,
            rate_limit_rps,
            weights,
            target_rank: parse_var(&lookup, "SEOLENS_TARGET_RANK", defaults.target_rank).max(1),
            opportunity_threshold: parse_var(
                &lookup,
                "SEOLENS_OPPORTUNITY_THRESHOLD",
                defaults.opportunity_threshold,
            ),
            keyword_limit: parse_var(&lookup, "SEOLENS_KEYWORD_LIMIT", defaults.keyword_limit),
            bucket_idle: Duration::from_secs(parse_var(
                &lookup,
                "SEOLENS_BUCKET_IDLE_SECS",
                defaults.bucket_idle.as_secs(),
            )),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value '{}' for {}, using {}", raw, key, default);
                default
            }
        },
    }
}

/// Crawl configuration accepted from the CLI or API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlRequest {
    pub url: String,
    pub max_depth: usize,
    pub max_pages: usize,
    pub use_js_rendering: bool,
    pub respect_robots: bool,
    pub rate_limit_rps: Option<f64>,
    pub sitemap_url: Option<String>,
}

impl Default for CrawlRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_depth: 5,
            max_pages: 1000,
            use_js_rendering: false,
            respect_robots: true,
            rate_limit_rps: None,
            sitemap_url: None,
        }
    }
}

impl CrawlRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Reject malformed requests before any job exists. Returns the normalized root URL.
    pub fn validate(&self) -> Result<String> {
        let parsed = Url::parse(self.url.trim())
            .map_err(|e| SeoError::Validation(format!("invalid url '{}': {}", self.url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SeoError::Validation(format!(
                "url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(SeoError::Validation(format!("url '{}' has no host", self.url)));
        }

        let (min_depth, max_depth) = MAX_DEPTH_RANGE;
        if !(min_depth..=max_depth).contains(&self.max_depth) {
            return Err(SeoError::Validation(format!(
                "max_depth must be between {} and {}, got {}",
                min_depth, max_depth, self.max_depth
            )));
        }
        let (min_pages, max_pages) = MAX_PAGES_RANGE;
        if !(min_pages..=max_pages).contains(&self.max_pages) {
            return Err(SeoError::Validation(format!(
                "max_pages must be between {} and {}, got {}",
                min_pages, max_pages, self.max_pages
            )));
        }
        if let Some(rps) = self.rate_limit_rps
            && !(rps.is_finite() && rps > 0.0)
        {
            return Err(SeoError::Validation(format!(
                "rate_limit_rps must be a positive number, got {}",
                rps
            )));
        }
        if let Some(sitemap) = &self.sitemap_url
            && normalize_url(sitemap).is_none()
        {
            return Err(SeoError::Validation(format!("invalid sitemap url '{}'", sitemap)));
        }

        normalize_url(parsed.as_str())
            .ok_or_else(|| SeoError::Validation(format!("invalid url '{}'", self.url)))
    }

    pub fn effective_rps(&self, settings: &Settings) -> f64 {
        self.rate_limit_rps.unwrap_or(settings.rate_limit_rps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((ScoreWeights::default().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_are_normalized() {
        let weights = ScoreWeights::new(2.0, 1.0, 1.0, 0.0, 0.0).unwrap();
        assert!((weights.technical - 0.5).abs() < 1e-9);
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(ScoreWeights::new(0.0, 0.0, 0.0, 0.0, 0.0).is_err());
        assert!(ScoreWeights::new(-1.0, 1.0, 1.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_settings_env_overrides() {
        let settings = settings_from(&[
            ("SEOLENS_MAX_CONCURRENT", "500"),
            ("SEOLENS_RATE_LIMIT_RPS", "2.5"),
            ("SEOLENS_WEIGHT_TECHNICAL", "1"),
            ("SEOLENS_WEIGHT_CONTENT", "1"),
            ("SEOLENS_WEIGHT_AUTHORITY", "0"),
            ("SEOLENS_WEIGHT_LINKING", "0"),
            ("SEOLENS_WEIGHT_AI_VISIBILITY", "0"),
        ]);
        assert_eq!(settings.max_concurrent, MAX_CONCURRENT_CAP);
        assert_eq!(settings.rate_limit_rps, 2.5);
        assert!((settings.weights.technical - 0.5).abs() < 1e-9);
        assert!((settings.weights.content - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_settings_bad_values_fall_back() {
        let settings = settings_from(&[
            ("SEOLENS_REQUEST_TIMEOUT_SECS", "soon"),
            ("SEOLENS_RATE_LIMIT_RPS", "-3"),
        ]);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.rate_limit_rps, 5.0);
    }

    #[test]
    fn test_request_defaults_validate() {
        let request = CrawlRequest::new("https://Example.com/#top");
        assert_eq!(request.validate().unwrap(), "https://example.com/");
        assert_eq!(request.max_depth, 5);
        assert_eq!(request.max_pages, 1000);
        assert!(request.respect_robots);
    }

    #[test]
    fn test_request_validation_errors() {
        let cases = [
            CrawlRequest::new("ftp://example.com"),
            CrawlRequest::new("not a url"),
            CrawlRequest {
                max_depth: 0,
                ..CrawlRequest::new("https://example.com")
            },
            CrawlRequest {
                max_depth: 11,
                ..CrawlRequest::new("https://example.com")
            },
            CrawlRequest {
                max_pages: 50_001,
                ..CrawlRequest::new("https://example.com")
            },
            CrawlRequest {
                rate_limit_rps: Some(0.0),
                ..CrawlRequest::new("https://example.com")
            },
        ];
        for request in cases {
            assert!(
                matches!(request.validate(), Err(SeoError::Validation(_))),
                "expected validation error for {:?}",
                request
            );
        }
    }
}
