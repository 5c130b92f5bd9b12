// Scripted fetcher for crawl tests, enabled with the `testing` feature

use crate::error::{Result, ScanError};
use crate::fetcher::Fetcher;
use crate::result::FetchResponse;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted response served by [`ReplayFetcher`].
#[derive(Clone, Debug)]
pub enum Replay {
    Page {
        status: u16,
        body: String,
        content_type: String,
        delay: Option<Duration>,
    },
    Error(String),
    Timeout,
}

impl Replay {
    pub fn html(body: &str) -> Self {
        Replay::Page {
            status: 200,
            body: body.to_string(),
            content_type: "text/html".to_string(),
            delay: None,
        }
    }

    pub fn text(body: &str) -> Self {
        Replay::Page {
            status: 200,
            body: body.to_string(),
            content_type: "text/plain".to_string(),
            delay: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Replay::Page {
            status,
            body: String::new(),
            content_type: "text/html".to_string(),
            delay: None,
        }
    }

    pub fn delayed(self, by: Duration) -> Self {
        match self {
            Replay::Page {
                status,
                body,
                content_type,
                ..
            } => Replay::Page {
                status,
                body,
                content_type,
                delay: Some(by),
            },
            other => other,
        }
    }
}

/// In-memory fetcher that serves scripted responses keyed by URL and records how
/// often each URL was requested. Unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct ReplayFetcher {
    responses: Arc<HashMap<String, Replay>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    order: Arc<Mutex<Vec<String>>>,
}

impl ReplayFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, replay: Replay) -> Self {
        Arc::make_mut(&mut self.responses).insert(url.to_string(), replay);
        self
    }

    /// Number of fetches issued for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Every URL fetched, in dispatch order.
    pub fn fetch_order(&self) -> Vec<String> {
        self.order.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.order.lock().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ReplayFetcher {
    async fn fetch(&self, url: &str, _render_js: bool) -> Result<FetchResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(url.to_string()).or_insert(0) += 1;
        }
        if let Ok(mut order) = self.order.lock() {
            order.push(url.to_string());
        }

        match self.responses.get(url) {
            Some(Replay::Page {
                status,
                body,
                content_type,
                delay,
            }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(*delay).await;
                }
                let mut response = FetchResponse::new(url.to_string());
                response.status_code = *status;
                response.html = body.clone();
                response
                    .headers
                    .insert("content-type".to_string(), content_type.clone());
                response.elapsed_ms = delay.map(|d| d.as_millis() as u64).unwrap_or(1);
                Ok(response)
            }
            Some(Replay::Error(message)) => Err(ScanError::Other(message.clone())),
            Some(Replay::Timeout) => {
                // Longer than any sane per-fetch timeout
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ScanError::Other(format!("replay timeout for {}", url)))
            }
            None => {
                let mut response = FetchResponse::new(url.to_string());
                response.status_code = 404;
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_fetcher_counts_calls() {
        let fetcher = ReplayFetcher::new().with("https://example.com/", Replay::html("<p>x</p>"));

        fetcher.fetch("https://example.com/", false).await.unwrap();
        fetcher.fetch("https://example.com/", false).await.unwrap();
        let missing = fetcher.fetch("https://example.com/nope", false).await.unwrap();

        assert_eq!(fetcher.calls("https://example.com/"), 2);
        assert_eq!(missing.status_code, 404);
        assert_eq!(fetcher.total_calls(), 3);
    }
}
