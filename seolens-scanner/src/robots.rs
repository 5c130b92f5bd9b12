// robots.txt compliance, fetched once per host per crawl

use crate::fetcher::Fetcher;
use std::collections::HashMap;
use std::sync::Arc;
use texting_robots::Robot;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use url::Url;

/// Parsed rules for one host. `rules` is `None` when the host has no usable robots.txt,
/// which allows everything.
pub struct HostRules {
    rules: Option<Robot>,
    sitemaps: Vec<String>,
}

impl HostRules {
    pub fn allow_all() -> Self {
        Self {
            rules: None,
            sitemaps: Vec::new(),
        }
    }

    /// Unparseable files allow everything but still contribute their sitemaps.
    pub fn parse(body: &str, user_agent: &str) -> Self {
        match Robot::new(product_token(user_agent), body.as_bytes()) {
            Ok(robot) => {
                let sitemaps = robot.sitemaps.clone();
                Self {
                    rules: Some(robot),
                    sitemaps,
                }
            }
            Err(e) => {
                warn!("Ignoring unparseable robots.txt: {}", e);
                Self {
                    rules: None,
                    sitemaps: parse_sitemap_directives(body),
                }
            }
        }
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        match &self.rules {
            Some(robot) => robot.allowed(url),
            None => true,
        }
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// `SeolensBot/0.1 (+https://...)` matches robots groups as `SeolensBot`.
fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(['/', ' '])
        .next()
        .filter(|token| !token.is_empty())
        .unwrap_or("*")
}

pub fn parse_sitemap_directives(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("sitemap") {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            } else {
                None
            }
        })
        .collect()
}

pub fn robots_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_path("/robots.txt");
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Per-crawl robots cache. Concurrent lookups for the same host share a single fetch.
pub struct RobotsCache {
    user_agent: String,
    hosts: Mutex<HashMap<String, Arc<OnceCell<HostRules>>>>,
}

impl RobotsCache {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    async fn cell_for(&self, origin: &str) -> Arc<OnceCell<HostRules>> {
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Rules for the host serving `url`, fetching robots.txt on first use.
    pub async fn rules_for(&self, fetcher: &dyn Fetcher, url: &str) -> Arc<OnceCell<HostRules>> {
        let Some(robots) = robots_url(url) else {
            let cell = Arc::new(OnceCell::new());
            let _ = cell.set(HostRules::allow_all());
            return cell;
        };

        let cell = self.cell_for(&robots).await;
        cell.get_or_init(|| async {
            match fetcher.fetch(&robots, false).await {
                Ok(response) if response.is_success() => {
                    info!("robots.txt fetched from {}", robots);
                    HostRules::parse(&response.html, &self.user_agent)
                }
                Ok(response) => {
                    debug!(
                        "No robots.txt at {} (status={})",
                        robots, response.status_code
                    );
                    HostRules::allow_all()
                }
                Err(e) => {
                    debug!("Failed to fetch {}: {}", robots, e);
                    HostRules::allow_all()
                }
            }
        })
        .await;
        cell
    }

    pub async fn is_allowed(&self, fetcher: &dyn Fetcher, url: &str) -> bool {
        let cell = self.rules_for(fetcher, url).await;
        cell.get().map(|rules| rules.is_allowed(url)).unwrap_or(true)
    }

    pub async fn sitemaps(&self, fetcher: &dyn Fetcher, url: &str) -> Vec<String> {
        let cell = self.rules_for(fetcher, url).await;
        cell.get()
            .map(|rules| rules.sitemaps().to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{Replay, ReplayFetcher};

    const ROBOTS: &str = "User-agent: *\nDisallow: /private\nAllow: /\n\nSitemap: https://example.com/sitemap.xml\n";

    #[test]
    fn test_host_rules_disallow() {
        let rules = HostRules::parse(ROBOTS, "SeolensBot");
        assert!(rules.is_allowed("https://example.com/blog"));
        assert!(!rules.is_allowed("https://example.com/private/area"));
        assert_eq!(rules.sitemaps(), &["https://example.com/sitemap.xml".to_string()]);
    }

    #[test]
    fn test_robots_url() {
        assert_eq!(
            robots_url("https://example.com/a/b?c=d").as_deref(),
            Some("https://example.com/robots.txt")
        );
    }

    #[tokio::test]
    async fn test_cache_fetches_once_per_host() {
        let fetcher = ReplayFetcher::new().with("https://example.com/robots.txt", Replay::text(ROBOTS));
        let cache = RobotsCache::new("SeolensBot");

        assert!(cache.is_allowed(&fetcher, "https://example.com/").await);
        assert!(!cache.is_allowed(&fetcher, "https://example.com/private").await);
        assert!(cache.is_allowed(&fetcher, "https://example.com/about").await);

        assert_eq!(fetcher.calls("https://example.com/robots.txt"), 1);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_everything() {
        let fetcher = ReplayFetcher::new();
        let cache = RobotsCache::new("SeolensBot");
        assert!(cache.is_allowed(&fetcher, "https://example.com/private").await);
    }
}
