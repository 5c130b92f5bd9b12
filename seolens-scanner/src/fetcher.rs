use crate::error::{Result, ScanError};
use crate::result::FetchResponse;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_USER_AGENT: &str = "SeolensBot/0.1 (+https://github.com/trapdoorsec/seolens)";

/// Retrieves raw HTML plus status and timing for a URL.
///
/// Implementations must be cheap to share between workers. Non-2xx answers are
/// returned as responses, not errors; the crawler decides what counts as a failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, render_js: bool) -> Result<FetchResponse>;
}

/// Static HTTP fetcher backed by reqwest.
///
/// It has no browser attached, so `render_js` requests fall back to a static fetch
/// unless the fetcher was built with [`HttpFetcher::strict_rendering`].
pub struct HttpFetcher {
    client: Client,
    strict_rendering: bool,
    warned_render: AtomicBool,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_options(30, DEFAULT_USER_AGENT)
    }

    pub fn with_options(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            strict_rendering: false,
            warned_render: AtomicBool::new(false),
        })
    }

    pub fn strict_rendering(mut self, strict: bool) -> Self {
        self.strict_rendering = strict;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, render_js: bool) -> Result<FetchResponse> {
        if render_js {
            if self.strict_rendering {
                return Err(ScanError::RenderingUnavailable(url.to_string()));
            }
            if !self.warned_render.swap(true, Ordering::Relaxed) {
                warn!("No rendering backend configured, fetching pages statically");
            }
        }

        debug!("Fetching {}", url);
        let start = Instant::now();
        let response = self.client.get(url).send().await?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect::<HashMap<_, _>>();

        let html = response.text().await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        Ok(FetchResponse {
            url: url.to_string(),
            final_url,
            status_code,
            html,
            headers,
            elapsed_ms,
        })
    }
}
