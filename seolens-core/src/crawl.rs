//! Crawl orchestration: job lifecycle, persistence of crawl results and the
//! analysis pass that turns pages into scores, issues and keywords.

use crate::config::{CrawlRequest, Settings};
use crate::data::{Database, current_timestamp};
use crate::error::{Result, SeoError};
use crate::issues::{PageFacts, SiteFacts, detect_page_issues, detect_site_issues, reconcile};
use crate::keywords::{KeywordEngine, PageKeywords};
use crate::link_graph::LinkGraph;
use crate::model::{CrawlJob, FailureRecord, JobStatus, PageRecord};
use crate::scoring::{PageContext, PageScore, ScoringEngine};
use async_trait::async_trait;
use seolens_scanner::crawler::ProgressCallback;
use seolens_scanner::normalize::site_domain;
use seolens_scanner::{
    CrawlControl, CrawlFailure, CrawlOptions, CrawlSink, CrawlStats, CrawledPage, Crawler,
    Fetcher, RateLimiter, ScanError,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Returned when a crawl is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    pub site_id: i64,
    pub status: JobStatus,
}

pub fn lock_db(db: &Mutex<Database>) -> Result<MutexGuard<'_, Database>> {
    db.lock()
        .map_err(|_| SeoError::Internal("database lock poisoned".to_string()))
}

/// Controls of the jobs currently running in this process.
#[derive(Clone, Default)]
struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, CrawlControl>>>,
}

impl JobRegistry {
    fn register(&self, job_id: &str) -> Result<CrawlControl> {
        let mut jobs = self.lock()?;
        let control = CrawlControl::new();
        jobs.insert(job_id.to_string(), control.clone());
        Ok(control)
    }

    fn get(&self, job_id: &str) -> Result<Option<CrawlControl>> {
        Ok(self.lock()?.get(job_id).cloned())
    }

    fn remove(&self, job_id: &str) -> Result<()> {
        self.lock()?.remove(job_id);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CrawlControl>>> {
        self.jobs
            .lock()
            .map_err(|_| SeoError::Internal("job registry lock poisoned".to_string()))
    }
}

/// Persists crawl results of one job as they stream in.
struct JobSink {
    db: Arc<Mutex<Database>>,
    job_id: String,
    site_id: i64,
    scoring: ScoringEngine,
}

impl JobSink {
    fn persist_page(&self, page: &CrawledPage) -> Result<i64> {
        let db = lock_db(&self.db)?;
        let page_id = db.upsert_page(
            self.site_id,
            Some(&self.job_id),
            &page.url,
            page.depth,
            &page.signals,
            page.links.internal_count(),
            page.links.external_count(),
        )?;
        db.clear_failures_for_url(self.site_id, &page.url)?;
        db.backfill_link_targets(self.site_id, page_id, &page.url)?;
        db.replace_links(self.site_id, page_id, &page.links.edges)?;

        let inbound = db.inbound_link_count(self.site_id, &page.url)?;
        let internal = page.links.internal_count();
        let score = self.scoring.score_page(
            &page.signals,
            PageContext {
                internal_links: internal,
                inbound_links: inbound,
            },
        );
        db.upsert_score(&score.into_record(self.site_id, Some(page_id), current_timestamp()))?;

        let mut facts = PageFacts::new(&page.signals);
        facts.internal_links = internal;
        facts.inbound_links = inbound;
        facts.broken_outbound = db.broken_outbound_count(page_id)?;
        reconcile(&db, self.site_id, Some(page_id), &detect_page_issues(&facts))?;
        Ok(page_id)
    }

    fn persist_failure(&self, failure: &CrawlFailure) -> Result<()> {
        let db = lock_db(&self.db)?;
        db.insert_failure(
            self.site_id,
            &FailureRecord {
                job_id: self.job_id.clone(),
                url: failure.url.clone(),
                depth: failure.depth,
                status_code: failure.status_code,
                reason: failure.reason.clone(),
                failed_at: current_timestamp(),
            },
        )?;
        let broken = db.mark_links_broken(self.site_id, &failure.url)?;
        if broken > 0 {
            debug!(url = %failure.url, broken, "Marked links broken");
        }
        Ok(())
    }
}

#[async_trait]
impl CrawlSink for JobSink {
    async fn on_page(&self, page: CrawledPage) {
        match self.persist_page(&page) {
            Ok(page_id) => debug!(job_id = %self.job_id, page_id, url = %page.url, "Stored page"),
            Err(e) => error!(job_id = %self.job_id, url = %page.url, "Failed to store page: {}", e),
        }
    }

    async fn on_failure(&self, failure: CrawlFailure) {
        if let Err(e) = self.persist_failure(&failure) {
            error!(job_id = %self.job_id, url = %failure.url, "Failed to record failure: {}", e);
        }
    }

    async fn on_progress(&self, stats: CrawlStats) {
        let result = lock_db(&self.db).and_then(|db| {
            db.update_job_counters(
                &self.job_id,
                stats.pages_crawled,
                stats.pages_failed,
                stats.pages_queued,
            )
            .map_err(SeoError::from)
        });
        if let Err(e) = result {
            warn!(job_id = %self.job_id, "Failed to update job counters: {}", e);
        }
    }
}

/// Runs crawl jobs against a shared database.
///
/// Clones share the database handle, the host rate limiter and the job registry,
/// so every job started from one service is polite to the same hosts and can be
/// paused or cancelled by id.
#[derive(Clone)]
pub struct CrawlService {
    db: Arc<Mutex<Database>>,
    fetcher: Arc<dyn Fetcher>,
    settings: Settings,
    scoring: ScoringEngine,
    keywords: KeywordEngine,
    rate_limiter: RateLimiter,
    registry: JobRegistry,
    progress_callback: Option<ProgressCallback>,
}

impl CrawlService {
    pub fn new(db: Arc<Mutex<Database>>, fetcher: Arc<dyn Fetcher>, settings: Settings) -> Result<Self> {
        let weights = settings.weights.normalized()?;
        Ok(Self {
            db,
            fetcher,
            scoring: ScoringEngine::new(weights),
            keywords: KeywordEngine::from_settings(&settings),
            settings,
            rate_limiter: RateLimiter::new(),
            registry: JobRegistry::default(),
            progress_callback: None,
        })
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.db.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate a request and create its site and pending job.
    pub fn submit(&self, request: &CrawlRequest) -> Result<JobTicket> {
        let root = request.validate()?;
        let domain = site_domain(&root)
            .ok_or_else(|| SeoError::Validation(format!("url '{}' has no host", request.url)))?;

        let db = lock_db(&self.db)?;
        let site = db.upsert_site(&domain, &root, request.sitemap_url.as_deref())?;
        let now = current_timestamp();
        let job = CrawlJob {
            id: uuid::Uuid::new_v4().to_string(),
            site_id: site.id,
            status: JobStatus::Pending,
            max_depth: request.max_depth,
            max_pages: request.max_pages,
            use_js_rendering: request.use_js_rendering,
            respect_robots: request.respect_robots,
            rate_limit_rps: request.effective_rps(&self.settings),
            pages_crawled: 0,
            pages_failed: 0,
            pages_queued: 0,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
        };
        db.insert_job(&job)?;
        info!(job_id = %job.id, site_id = site.id, "Created crawl job for {}", root);

        Ok(JobTicket {
            job_id: job.id,
            site_id: site.id,
            status: job.status,
        })
    }

    /// Submit a request and run it in the background.
    pub fn start(&self, request: &CrawlRequest) -> Result<(JobTicket, JoinHandle<Result<CrawlJob>>)> {
        let ticket = self.submit(request)?;
        let handle = self.spawn(&ticket.job_id);
        Ok((ticket, handle))
    }

    pub fn spawn(&self, job_id: &str) -> JoinHandle<Result<CrawlJob>> {
        let service = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move { service.run(&job_id).await })
    }

    /// Drive a pending job to a terminal state.
    ///
    /// Job-level failures are reported through the returned job's status and
    /// `error_message`; `Err` means the job could not be started or stored.
    pub async fn run(&self, job_id: &str) -> Result<CrawlJob> {
        let (job, root_url, sitemap_url) = {
            let db = lock_db(&self.db)?;
            let job = db
                .get_job(job_id)?
                .ok_or_else(|| SeoError::NotFound(format!("crawl job {}", job_id)))?;
            let site = db
                .get_site(job.site_id)?
                .ok_or_else(|| SeoError::NotFound(format!("site {}", job.site_id)))?;
            let next = job.status.transition(JobStatus::Running)?;
            db.update_job_status(job_id, next, None)?;
            (job, site.root_url, site.sitemap_url)
        };

        let control = self.registry.register(job_id)?;
        let options = CrawlOptions {
            max_depth: job.max_depth,
            max_pages: job.max_pages,
            workers: self.settings.max_concurrent,
            render_js: job.use_js_rendering,
            respect_robots: job.respect_robots,
            rate_limit_rps: job.rate_limit_rps,
            fetch_timeout: self.settings.request_timeout,
            user_agent: self.settings.user_agent.clone(),
            sitemap_url,
        };
        let mut crawler = Crawler::new(self.fetcher.clone(), options)
            .with_rate_limiter(self.rate_limiter.clone())
            .with_control(control.clone());
        if let Some(callback) = &self.progress_callback {
            crawler = crawler.with_progress_callback(callback.clone());
        }
        let sink = Arc::new(JobSink {
            db: self.db.clone(),
            job_id: job_id.to_string(),
            site_id: job.site_id,
            scoring: self.scoring.clone(),
        });

        info!(job_id, "Running crawl of {}", root_url);
        let outcome = crawler.crawl(&root_url, sink).await;
        self.registry.remove(job_id)?;

        let (status, error_message, stats) = match outcome {
            Ok(summary) if summary.cancelled || control.is_cancelled() => {
                (JobStatus::Cancelled, None, Some(summary.stats))
            }
            Ok(summary) => (JobStatus::Completed, None, Some(summary.stats)),
            Err(ScanError::RootUnreachable(reason)) => {
                let fatal = SeoError::JobFatal(format!("root URL unreachable: {}", reason));
                error!(job_id, "{}", fatal);
                (JobStatus::Failed, Some(fatal.to_string()), None)
            }
            Err(e) => {
                let fatal = SeoError::JobFatal(e.to_string());
                error!(job_id, "{}", fatal);
                (JobStatus::Failed, Some(fatal.to_string()), None)
            }
        };

        if let Err(e) = self.analyze(job.site_id, job_id, &root_url, status == JobStatus::Completed) {
            error!(job_id, "Analysis pass failed: {}", e);
        }

        {
            let db = lock_db(&self.db)?;
            if let Some(stats) = stats {
                db.update_job_counters(
                    job_id,
                    stats.pages_crawled,
                    stats.pages_failed,
                    stats.pages_queued,
                )?;
            } else {
                let failed = db.list_failures(job_id)?.len();
                let crawled = db.list_pages_for_job(job_id)?.len();
                db.update_job_counters(job_id, crawled, failed, 0)?;
            }

            // A cancel request may already have written the terminal status.
            let current = db
                .get_job(job_id)?
                .ok_or_else(|| SeoError::NotFound(format!("crawl job {}", job_id)))?;
            if !current.status.is_terminal() {
                let next = current.status.transition(status)?;
                db.update_job_status(job_id, next, error_message.as_deref())?;
            }
        }

        let pruned = self.rate_limiter.prune_idle(self.settings.bucket_idle).await;
        if pruned > 0 {
            debug!("Pruned {} idle rate limit buckets", pruned);
        }

        let job = self.job_status(job_id)?;
        info!(
            job_id,
            status = %job.status,
            crawled = job.pages_crawled,
            failed = job.pages_failed,
            "Crawl job finished"
        );
        Ok(job)
    }

    pub fn job_status(&self, job_id: &str) -> Result<CrawlJob> {
        lock_db(&self.db)?
            .get_job(job_id)?
            .ok_or_else(|| SeoError::NotFound(format!("crawl job {}", job_id)))
    }

    fn set_status(&self, job_id: &str, next: JobStatus) -> Result<JobStatus> {
        let db = lock_db(&self.db)?;
        let job = db
            .get_job(job_id)?
            .ok_or_else(|| SeoError::NotFound(format!("crawl job {}", job_id)))?;
        let next = job.status.transition(next)?;
        db.update_job_status(job_id, next, None)?;
        Ok(next)
    }

    /// Pause a running job. The status is written first; a crawl running in this
    /// process stops dispatching at once, one in another process on its next
    /// [`CrawlService::sync_control`].
    pub fn pause(&self, job_id: &str) -> Result<JobStatus> {
        let status = self.set_status(job_id, JobStatus::Paused)?;
        if let Some(control) = self.registry.get(job_id)? {
            control.pause();
        }
        info!(job_id, "Paused crawl job");
        Ok(status)
    }

    pub fn resume(&self, job_id: &str) -> Result<JobStatus> {
        let status = self.set_status(job_id, JobStatus::Running)?;
        if let Some(control) = self.registry.get(job_id)? {
            control.resume();
        }
        info!(job_id, "Resumed crawl job");
        Ok(status)
    }

    /// Cancel a pending, running or paused job. Running jobs stop dispatching and
    /// drain their in-flight fetches; those results are discarded.
    pub fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        let status = self.set_status(job_id, JobStatus::Cancelled)?;
        if let Some(control) = self.registry.get(job_id)? {
            control.cancel();
            control.resume();
        }
        info!(job_id, "Cancelled crawl job");
        Ok(status)
    }

    /// Apply the stored status of `job_id` to its local crawl, picking up job
    /// control written by another process.
    pub fn sync_control(&self, job_id: &str) -> Result<CrawlJob> {
        let job = self.job_status(job_id)?;
        if let Some(control) = self.registry.get(job_id)? {
            match job.status {
                JobStatus::Paused if !control.is_paused() => {
                    debug!(job_id, "Pause requested externally");
                    control.pause();
                }
                JobStatus::Running if control.is_paused() => {
                    debug!(job_id, "Resume requested externally");
                    control.resume();
                }
                JobStatus::Cancelled if !control.is_cancelled() => {
                    debug!(job_id, "Cancel requested externally");
                    control.cancel();
                    control.resume();
                }
                _ => {}
            }
        }
        Ok(job)
    }

    /// Re-score the job's pages with full inbound counts, reconcile page and site
    /// issues, store the site score and recompute keywords.
    fn analyze(&self, site_id: i64, job_id: &str, root_url: &str, completed: bool) -> Result<()> {
        let db = lock_db(&self.db)?;
        let pages = db.list_pages(site_id)?;
        let links = db.list_links(site_id)?;
        let graph = LinkGraph::from_records(&pages, &links);
        let orphans: HashSet<String> = graph.orphans(root_url).into_iter().collect();
        let now = current_timestamp();

        let mut analyzed = 0;
        for page in pages
            .iter()
            .filter(|p| p.crawl_job_id.as_deref() == Some(job_id))
        {
            let inbound = graph.inbound_count(&page.url);
            db.set_inbound_count(page.id, inbound)?;
            let score = self.scoring.score_page(
                &page.signals,
                PageContext {
                    internal_links: page.internal_links_count,
                    inbound_links: inbound,
                },
            );
            db.upsert_score(&score.into_record(site_id, Some(page.id), now))?;

            let mut facts = PageFacts::new(&page.signals);
            facts.internal_links = page.internal_links_count;
            facts.inbound_links = inbound;
            facts.broken_outbound = db.broken_outbound_count(page.id)?;
            facts.is_orphan = orphans.contains(&page.url);
            reconcile(&db, site_id, Some(page.id), &detect_page_issues(&facts))?;
            analyzed += 1;
        }

        let page_scores: Vec<PageScore> = db
            .list_page_scores(site_id)?
            .into_iter()
            .map(PageScore::from)
            .collect();
        if let Some(site_score) = self.scoring.site_score(&page_scores) {
            db.upsert_score(&site_score.into_record(site_id, None, now))?;
        }

        let facts = SiteFacts::from_pages(pages.iter().map(|p| &p.signals));
        reconcile(&db, site_id, None, &detect_site_issues(&facts))?;

        db.update_site_totals(site_id, db.count_pages(site_id)?, completed.then_some(now))?;
        let keywords = self.compute_keywords(&db, site_id, &pages)?;
        info!(
            site_id,
            pages = analyzed,
            keywords,
            orphans = orphans.len(),
            "Analysis pass complete"
        );
        Ok(())
    }

    fn compute_keywords(&self, db: &Database, site_id: i64, pages: &[PageRecord]) -> Result<usize> {
        let inputs: Vec<PageKeywords> = pages
            .iter()
            .map(|p| PageKeywords {
                url: &p.url,
                frequencies: &p.signals.keyword_frequencies,
            })
            .collect();
        let ranked = self.keywords.analyze(site_id, &inputs);
        db.replace_keywords(site_id, &ranked)?;
        Ok(ranked.len())
    }

    /// Recompute a site's keyword set from its stored pages.
    pub fn refresh_keywords(&self, site_id: i64) -> Result<usize> {
        let db = lock_db(&self.db)?;
        if db.get_site(site_id)?.is_none() {
            return Err(SeoError::NotFound(format!("site {}", site_id)));
        }
        let pages = db.list_pages(site_id)?;
        self.compute_keywords(&db, site_id, &pages)
    }
}
