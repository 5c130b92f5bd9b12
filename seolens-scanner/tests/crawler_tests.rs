// End-to-end crawler tests against scripted sites

use async_trait::async_trait;
use seolens_scanner::error::Result;
use seolens_scanner::{
    CrawlControl, CrawlFailure, CrawlOptions, CrawlSink, CrawledPage, Crawler, FetchResponse,
    Fetcher, Replay, ReplayFetcher,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Default)]
struct CollectingSink {
    pages: Mutex<Vec<CrawledPage>>,
    failures: Mutex<Vec<CrawlFailure>>,
}

#[async_trait]
impl CrawlSink for CollectingSink {
    async fn on_page(&self, page: CrawledPage) {
        self.pages.lock().await.push(page);
    }

    async fn on_failure(&self, failure: CrawlFailure) {
        self.failures.lock().await.push(failure);
    }
}

/// Records when each fetch starts and finishes, in paused tokio time.
struct TimedFetcher {
    inner: ReplayFetcher,
    spans: std::sync::Mutex<Vec<(String, Instant, Instant)>>,
}

impl TimedFetcher {
    fn new(inner: ReplayFetcher) -> Self {
        Self {
            inner,
            spans: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn span(&self, url: &str) -> (Instant, Instant) {
        let spans = self.spans.lock().unwrap();
        let (_, start, end) = spans.iter().find(|(u, _, _)| u == url).unwrap();
        (*start, *end)
    }
}

#[async_trait]
impl Fetcher for TimedFetcher {
    async fn fetch(&self, url: &str, render_js: bool) -> Result<FetchResponse> {
        let start = Instant::now();
        let response = self.inner.fetch(url, render_js).await;
        self.spans
            .lock()
            .unwrap()
            .push((url.to_string(), start, Instant::now()));
        response
    }
}

fn options(max_depth: usize, max_pages: usize) -> CrawlOptions {
    CrawlOptions {
        max_depth,
        max_pages,
        workers: 3,
        respect_robots: false,
        rate_limit_rps: 1000.0,
        ..Default::default()
    }
}

const ARTICLE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>Choosing the right widget for your workshop</title>
  <meta name="description" content="A practical guide to widget sizes and materials.">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <meta property="og:title" content="Choosing widgets">
  <link rel="canonical" href="https://shop.test/guide">
  <script type="application/ld+json">{"@context": "https://schema.org", "@type": "Article"}</script>
</head>
<body>
  <h1>Choosing widgets</h1>
  <h2>Sizes</h2>
  <p>Widgets come in many sizes. Pick widgets that fit the bench.</p>
  <a href="/">Home</a>
  <a href="https://other.test/review" rel="nofollow">Review</a>
</body>
</html>"#;

// ============================================================================
// Signal Flow Tests
// ============================================================================

#[tokio::test]
async fn test_signals_and_links_reach_the_sink() {
    let fetcher = ReplayFetcher::new()
        .with("https://shop.test/", Replay::html(r#"<a href="/guide">Guide</a>"#))
        .with("https://shop.test/guide", Replay::html(ARTICLE));
    let sink = Arc::new(CollectingSink::default());
    let crawler = Crawler::new(Arc::new(fetcher), options(3, 10));

    let summary = crawler.crawl("https://shop.test/", sink.clone()).await.unwrap();
    assert_eq!(summary.stats.pages_crawled, 2);

    let pages = sink.pages.lock().await;
    let guide = pages
        .iter()
        .find(|p| p.url == "https://shop.test/guide")
        .unwrap();
    assert_eq!(guide.depth, 1);
    assert!(guide.signals.has_title());
    assert!(guide.signals.has_meta_description());
    assert!(guide.signals.has_viewport);
    assert!(guide.signals.has_open_graph);
    assert!(guide.signals.is_https);
    assert!(!guide.signals.canonical_mismatch);
    assert_eq!(guide.signals.headings.h1, vec!["Choosing widgets".to_string()]);
    assert!(guide.signals.schema_types.contains(&"Article".to_string()));
    assert!(guide.signals.keyword_frequencies.contains_key("widgets"));

    assert_eq!(guide.links.internal_count(), 1);
    assert_eq!(guide.links.external_count(), 1);
    let external = guide.links.edges.iter().find(|l| !l.is_internal).unwrap();
    assert!(external.nofollow);
    // External targets are edges, never crawl candidates
    assert!(guide.links.crawl_candidates.iter().all(|u| u.starts_with("https://shop.test")));
}

// ============================================================================
// Frontier Limit Tests
// ============================================================================

#[tokio::test]
async fn test_chain_stops_at_max_depth() {
    let fetcher = ReplayFetcher::new()
        .with("https://shop.test/", Replay::html(r#"<a href="/a">a</a>"#))
        .with("https://shop.test/a", Replay::html(r#"<a href="/b">b</a>"#))
        .with("https://shop.test/b", Replay::html(r#"<a href="/c">c</a>"#))
        .with("https://shop.test/c", Replay::html("<p>end</p>"));
    let sink = Arc::new(CollectingSink::default());
    let crawler = Crawler::new(Arc::new(fetcher.clone()), options(2, 10));

    let summary = crawler.crawl("https://shop.test/", sink.clone()).await.unwrap();
    assert_eq!(summary.stats.pages_crawled, 3);
    assert_eq!(fetcher.calls("https://shop.test/c"), 0);
    assert!(sink.pages.lock().await.iter().all(|p| p.depth <= 2));
}

#[tokio::test]
async fn test_cycles_are_fetched_once() {
    let fetcher = ReplayFetcher::new()
        .with(
            "https://shop.test/",
            Replay::html(r#"<a href="/a">a</a><a href="/a#top">a again</a><a href="/a/">a slash</a>"#),
        )
        .with(
            "https://shop.test/a",
            Replay::html(r#"<a href="/">home</a><a href="/a?utm_source=x">self</a>"#),
        );
    let sink = Arc::new(CollectingSink::default());
    let crawler = Crawler::new(Arc::new(fetcher.clone()), options(5, 10));

    crawler.crawl("https://shop.test/", sink.clone()).await.unwrap();
    assert_eq!(fetcher.calls("https://shop.test/"), 1);
    assert_eq!(fetcher.calls("https://shop.test/a"), 1);
    assert_eq!(fetcher.total_calls(), 2);
    assert!(sink.failures.lock().await.is_empty());
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_depth_two_below_in_flight_page_waits() {
    let fetcher = ReplayFetcher::new()
        .with(
            "https://shop.test/",
            Replay::html(r#"<a href="/slow">slow</a><a href="/fast">fast</a>"#),
        )
        .with(
            "https://shop.test/slow",
            Replay::html("<p>slow</p>").delayed(Duration::from_millis(500)),
        )
        .with("https://shop.test/fast", Replay::html(r#"<a href="/fast/1">1</a>"#))
        .with("https://shop.test/fast/1", Replay::html(r#"<a href="/fast/2">2</a>"#))
        .with("https://shop.test/fast/2", Replay::html("<p>deep</p>"));
    let fetcher = Arc::new(TimedFetcher::new(fetcher));
    let sink = Arc::new(CollectingSink::default());
    let crawler = Crawler::new(fetcher.clone(), options(5, 20));

    let summary = crawler.crawl("https://shop.test/", sink).await.unwrap();
    assert_eq!(summary.stats.pages_crawled, 5);

    let (_, slow_done) = fetcher.span("https://shop.test/slow");
    let (depth_two_start, _) = fetcher.span("https://shop.test/fast/1");
    let (depth_three_start, _) = fetcher.span("https://shop.test/fast/2");
    // Depth 2 may overlap the depth 1 page in flight, depth 3 may not
    assert!(depth_two_start < slow_done);
    assert!(depth_three_start >= slow_done);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_finishing_after_cancel_is_discarded() {
    let fetcher = ReplayFetcher::new()
        .with("https://shop.test/", Replay::html(r#"<a href="/slow">slow</a>"#))
        .with(
            "https://shop.test/slow",
            Replay::html(r#"<title>Slow</title><a href="/next">next</a>"#)
                .delayed(Duration::from_millis(500)),
        )
        .with("https://shop.test/next", Replay::html("<p>next</p>"));
    let control = CrawlControl::new();
    let sink = Arc::new(CollectingSink::default());
    let crawler =
        Crawler::new(Arc::new(fetcher.clone()), options(5, 20)).with_control(control.clone());

    let crawl = {
        let sink = sink.clone();
        tokio::spawn(async move { crawler.crawl("https://shop.test/", sink).await })
    };
    while fetcher.calls("https://shop.test/slow") == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    control.cancel();

    let summary = crawl.await.unwrap().unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.stats.pages_crawled, 1);
    assert_eq!(fetcher.calls("https://shop.test/next"), 0);

    let pages = sink.pages.lock().await;
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].url, "https://shop.test/");
    assert!(sink.failures.lock().await.is_empty());
}
