use crate::error::{Result, ScanError};
use crate::extract::{PageSignals, extract_signals};
use crate::fetcher::{DEFAULT_USER_AGENT, Fetcher};
use crate::frontier::{Enqueue, Frontier, FrontierItem, Pop};
use crate::links::{ClassifiedLinks, classify_links};
use crate::normalize::{host_of, is_crawlable_url, is_same_site, normalize_url, site_domain};
use crate::rate_limit::RateLimiter;
use crate::result::FetchResponse;
use crate::robots::RobotsCache;
use crate::sitemap::collect_sitemap_urls;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

const IDLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_depth: usize,
    pub max_pages: usize,
    pub workers: usize,
    pub render_js: bool,
    pub respect_robots: bool,
    pub rate_limit_rps: f64,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub sitemap_url: Option<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_pages: 1000,
            workers: 10,
            render_js: false,
            respect_robots: true,
            rate_limit_rps: 5.0,
            fetch_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            sitemap_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_crawled: usize,
    pub pages_failed: usize,
    pub pages_skipped: usize,
    pub pages_queued: usize,
}

/// A successfully fetched page, ready to be persisted.
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub depth: usize,
    pub signals: PageSignals,
    pub links: ClassifiedLinks,
}

/// A page-level fetch failure. Never aborts the crawl, except for the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub url: String,
    pub depth: usize,
    pub status_code: Option<u16>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    pub stats: CrawlStats,
    pub cancelled: bool,
}

/// Receives crawl results as workers produce them.
///
/// Calls for one crawl may arrive concurrently from several workers. Every call has
/// returned by the time [`Crawler::crawl`] returns.
#[async_trait]
pub trait CrawlSink: Send + Sync {
    async fn on_page(&self, page: CrawledPage);

    async fn on_failure(&self, failure: CrawlFailure);

    async fn on_progress(&self, _stats: CrawlStats) {}
}

/// Cooperative job control shared between the crawler and whoever owns the job.
#[derive(Clone, Default)]
pub struct CrawlControl {
    cancelled: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl CrawlControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Frontier and counters of one crawl, mutated under a single lock.
struct JobState {
    frontier: Frontier,
    stats: CrawlStats,
}

impl JobState {
    fn snapshot(&self) -> CrawlStats {
        let mut stats = self.stats.clone();
        stats.pages_queued = self.frontier.queued();
        stats
    }
}

enum Outcome {
    Crawled(Box<CrawledPage>),
    Failed(CrawlFailure),
    Disallowed,
    Discarded,
}

/// Every request a crawl issues, robots.txt and sitemaps included, waits on the host
/// bucket and is bounded by the per-fetch timeout.
struct PoliteFetcher {
    inner: Arc<dyn Fetcher>,
    rate_limiter: RateLimiter,
    rps: f64,
    timeout: Duration,
}

impl PoliteFetcher {
    async fn throttle(&self, url: &str) {
        if let Some(host) = host_of(url) {
            self.rate_limiter.acquire(&host, self.rps).await;
        }
    }

    async fn fetch_timed(&self, url: &str, render_js: bool) -> Result<FetchResponse> {
        match tokio::time::timeout(self.timeout, self.inner.fetch(url, render_js)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl Fetcher for PoliteFetcher {
    async fn fetch(&self, url: &str, render_js: bool) -> Result<FetchResponse> {
        self.throttle(url).await;
        self.fetch_timed(url, render_js).await
    }
}

struct WorkerContext {
    fetcher: PoliteFetcher,
    robots: RobotsCache,
    options: CrawlOptions,
    control: CrawlControl,
    domain: String,
    state: Mutex<JobState>,
    sink: Arc<dyn CrawlSink>,
    progress_callback: Option<ProgressCallback>,
}

pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    rate_limiter: RateLimiter,
    options: CrawlOptions,
    control: CrawlControl,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn Fetcher>, options: CrawlOptions) -> Self {
        Self {
            fetcher,
            rate_limiter: RateLimiter::new(),
            options,
            control: CrawlControl::new(),
            progress_callback: None,
        }
    }

    /// Share host buckets with other crawls in the process.
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_control(mut self, control: CrawlControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn control(&self) -> CrawlControl {
        self.control.clone()
    }

    /// Crawl breadth-first from `root_url`, streaming results into `sink`.
    ///
    /// The root is fetched before any worker starts; if it cannot be fetched the crawl
    /// fails with [`ScanError::RootUnreachable`]. Every other failure is page-level.
    pub async fn crawl(&self, root_url: &str, sink: Arc<dyn CrawlSink>) -> Result<CrawlSummary> {
        let root = normalize_url(root_url)
            .ok_or_else(|| ScanError::InvalidUrl(root_url.to_string()))?;
        let domain = site_domain(&root).ok_or_else(|| ScanError::InvalidUrl(root.clone()))?;
        let workers = self.options.workers.max(1);

        info!(
            "Starting crawl of {} with {} workers (max_depth={}, max_pages={})",
            root, workers, self.options.max_depth, self.options.max_pages
        );

        let mut frontier = Frontier::new(self.options.max_depth, self.options.max_pages);
        frontier.push(root.clone(), 0);

        let ctx = Arc::new(WorkerContext {
            fetcher: PoliteFetcher {
                inner: self.fetcher.clone(),
                rate_limiter: self.rate_limiter.clone(),
                rps: self.options.rate_limit_rps,
                timeout: self.options.fetch_timeout,
            },
            robots: RobotsCache::new(&self.options.user_agent),
            options: self.options.clone(),
            control: self.control.clone(),
            domain,
            state: Mutex::new(JobState {
                frontier,
                stats: CrawlStats::default(),
            }),
            sink,
            progress_callback: self.progress_callback.clone(),
        });

        Self::crawl_root(&ctx).await?;
        Self::seed_sitemaps(&ctx, &root).await;

        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let ctx = ctx.clone();
            worker_handles.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, ctx).await;
            }));
        }

        for handle in worker_handles {
            handle.await?;
        }

        let stats = ctx.state.lock().await.snapshot();
        let cancelled = self.control.is_cancelled();
        info!(
            "Crawl of {} finished: crawled={} failed={} skipped={} cancelled={}",
            root, stats.pages_crawled, stats.pages_failed, stats.pages_skipped, cancelled
        );
        Ok(CrawlSummary { stats, cancelled })
    }

    async fn crawl_root(ctx: &Arc<WorkerContext>) -> Result<()> {
        let item = match ctx.state.lock().await.frontier.pop() {
            Pop::Ready(item) => item,
            _ => return Ok(()),
        };

        match Self::process(ctx, 0, item).await {
            Outcome::Failed(failure) => {
                let reason = format!("{}: {}", failure.url, failure.reason);
                ctx.sink.on_failure(failure).await;
                Err(ScanError::RootUnreachable(reason))
            }
            Outcome::Disallowed => {
                warn!("Root URL is disallowed by robots.txt, nothing to crawl");
                Ok(())
            }
            Outcome::Crawled(page) => {
                ctx.sink.on_page(*page).await;
                Ok(())
            }
            Outcome::Discarded => Ok(()),
        }
    }

    /// Sitemap pages join the frontier at depth 1, next to the root's own links.
    async fn seed_sitemaps(ctx: &Arc<WorkerContext>, root: &str) {
        if ctx.control.is_cancelled() || ctx.options.max_depth == 0 {
            return;
        }

        let mut sitemaps = Vec::new();
        if let Some(sitemap) = &ctx.options.sitemap_url {
            sitemaps.push(sitemap.clone());
        }
        if ctx.options.respect_robots {
            sitemaps.extend(ctx.robots.sitemaps(&ctx.fetcher, root).await);
        }
        if sitemaps.is_empty() {
            return;
        }

        let urls = collect_sitemap_urls(&ctx.fetcher, &sitemaps).await;
        let mut state = ctx.state.lock().await;
        let mut seeded = 0;
        for url in urls {
            let Some(url) = normalize_url(&url) else {
                continue;
            };
            if is_same_site(&url, &ctx.domain)
                && is_crawlable_url(&url)
                && state.frontier.push(url, 1) == Enqueue::Queued
            {
                seeded += 1;
            }
        }
        info!("Seeded {} URLs from sitemaps", seeded);
    }

    async fn worker_loop(worker_id: usize, ctx: Arc<WorkerContext>) {
        debug!("Worker {} started", worker_id);

        loop {
            let pop = {
                let mut state = ctx.state.lock().await;
                if ctx.control.is_cancelled() && !state.frontier.is_closed() {
                    info!("Cancellation observed, no further URLs will be dispatched");
                    state.frontier.close();
                }
                state.frontier.set_paused(ctx.control.is_paused());
                state.frontier.pop()
            };

            let item = match pop {
                Pop::Ready(item) => item,
                Pop::Wait => {
                    tokio::time::sleep(IDLE_POLL).await;
                    continue;
                }
                Pop::Done => break,
            };

            if let Some(ref callback) = ctx.progress_callback {
                callback(worker_id, item.url.clone());
            }

            match Self::process(&ctx, worker_id, item).await {
                Outcome::Crawled(page) => ctx.sink.on_page(*page).await,
                Outcome::Failed(failure) => ctx.sink.on_failure(failure).await,
                Outcome::Disallowed | Outcome::Discarded => {}
            }

            let stats = ctx.state.lock().await.snapshot();
            ctx.sink.on_progress(stats).await;
        }

        debug!("Worker {} finished", worker_id);
    }

    /// Fetch and extract one dispatched item, updating the frontier and counters.
    async fn process(ctx: &Arc<WorkerContext>, worker_id: usize, item: FrontierItem) -> Outcome {
        let FrontierItem { url, depth } = item;

        if ctx.options.respect_robots && !ctx.robots.is_allowed(&ctx.fetcher, &url).await {
            debug!("[Worker {}] robots.txt disallows {}", worker_id, url);
            let mut state = ctx.state.lock().await;
            state.frontier.skip(depth);
            state.stats.pages_skipped += 1;
            return Outcome::Disallowed;
        }

        ctx.fetcher.throttle(&url).await;

        if ctx.control.is_cancelled() {
            ctx.state.lock().await.frontier.complete(depth);
            return Outcome::Discarded;
        }

        debug!("[Worker {}] Fetching {} (depth {})", worker_id, url, depth);
        let fetched = ctx.fetcher.fetch_timed(&url, ctx.options.render_js).await;

        let result = match fetched {
            Ok(response) if response.is_success() => {
                Ok(Self::build_page(&ctx.domain, &url, depth, response))
            }
            Ok(response) => {
                warn!("{} answered HTTP {}", url, response.status_code);
                Err(CrawlFailure {
                    url,
                    depth,
                    status_code: Some(response.status_code),
                    reason: format!("HTTP {}", response.status_code),
                })
            }
            Err(e) => {
                warn!("Crawl error for {}: {}", url, e);
                Err(CrawlFailure {
                    url,
                    depth,
                    status_code: e.status_code(),
                    reason: e.to_string(),
                })
            }
        };

        let mut state = ctx.state.lock().await;
        if ctx.control.is_cancelled() {
            debug!("[Worker {}] Discarding result after cancellation", worker_id);
            state.frontier.complete(depth);
            return Outcome::Discarded;
        }

        let outcome = match result {
            Ok(page) => {
                for candidate in &page.links.crawl_candidates {
                    state.frontier.push(candidate.clone(), depth + 1);
                }
                state.stats.pages_crawled += 1;
                Outcome::Crawled(Box::new(page))
            }
            Err(failure) => {
                state.stats.pages_failed += 1;
                Outcome::Failed(failure)
            }
        };

        // Children are queued before completion so the next depth cannot start early
        state.frontier.complete(depth);
        outcome
    }

    fn build_page(
        domain: &str,
        url: &str,
        depth: usize,
        mut response: FetchResponse,
    ) -> CrawledPage {
        if !response.is_html() {
            debug!("{} is not HTML, recording fetch metadata only", url);
            let size = response.size_bytes();
            response.html.clear();
            let mut signals = extract_signals(&response);
            signals.page_size_bytes = size;
            return CrawledPage {
                url: url.to_string(),
                depth,
                signals,
                links: ClassifiedLinks::default(),
            };
        }

        let mut signals = extract_signals(&response);
        signals.url = url.to_string();
        let links = classify_links(url, &signals.links, domain);
        CrawledPage {
            url: url.to_string(),
            depth,
            signals,
            links,
        }
    }
}
