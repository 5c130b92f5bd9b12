use crate::model::{
    Breakdown, CrawlJob, DimensionScores, FailureRecord, IssueRecord, JobStatus, KeywordRecord,
    LinkRecord, PageRecord, ScoreRecord, Severity, Site,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use seolens_scanner::{OutboundLink, PageSignals};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Page key used for site-level score and issue rows.
pub const SITE_PAGE_KEY: i64 = 0;

#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Decode a JSON column. Unknown keys are ignored by the `#[serde(default)]` models.
fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn enum_column<T: std::str::FromStr>(row: &Row, idx: usize) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Filters for issue listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueFilter {
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
}

/// Text of a freshly detected issue, before it gets a row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub issue_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub fix_instructions: String,
    pub impact: String,
    pub affected_element: Option<String>,
}

const SITE_COLUMNS: &str =
    "id, domain, root_url, sitemap_url, last_crawled, total_pages, is_active, created_at";

const JOB_COLUMNS: &str = "id, site_id, status, max_depth, max_pages, use_js_rendering, respect_robots, \
     rate_limit_rps, pages_crawled, pages_failed, pages_queued, started_at, completed_at, \
     error_message, created_at";

const PAGE_COLUMNS: &str = "id, site_id, crawl_job_id, url, depth, internal_links_count, \
     external_links_count, inbound_links_count, signals, crawled_at";

const ISSUE_COLUMNS: &str = "i.id, i.site_id, i.page_id, p.url, i.issue_type, i.severity, i.title, \
     i.description, i.recommendation, i.fix_instructions, i.impact, i.affected_element, \
     i.is_resolved, i.detected_at, i.resolved_at";

fn site_from_row(row: &Row) -> Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        domain: row.get(1)?,
        root_url: row.get(2)?,
        sitemap_url: row.get(3)?,
        last_crawled: row.get(4)?,
        total_pages: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn job_from_row(row: &Row) -> Result<CrawlJob> {
    Ok(CrawlJob {
        id: row.get(0)?,
        site_id: row.get(1)?,
        status: enum_column::<JobStatus>(row, 2)?,
        max_depth: row.get::<_, i64>(3)? as usize,
        max_pages: row.get::<_, i64>(4)? as usize,
        use_js_rendering: row.get(5)?,
        respect_robots: row.get(6)?,
        rate_limit_rps: row.get(7)?,
        pages_crawled: row.get::<_, i64>(8)? as usize,
        pages_failed: row.get::<_, i64>(9)? as usize,
        pages_queued: row.get::<_, i64>(10)? as usize,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
        error_message: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn page_from_row(row: &Row) -> Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        crawl_job_id: row.get(2)?,
        url: row.get(3)?,
        depth: row.get::<_, i64>(4)? as usize,
        internal_links_count: row.get::<_, i64>(5)? as usize,
        external_links_count: row.get::<_, i64>(6)? as usize,
        inbound_links_count: row.get::<_, i64>(7)? as usize,
        signals: json_column::<PageSignals>(row, 8)?,
        crawled_at: row.get(9)?,
    })
}

fn issue_from_row(row: &Row) -> Result<IssueRecord> {
    let page_key: i64 = row.get(2)?;
    Ok(IssueRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        page_id: (page_key != SITE_PAGE_KEY).then_some(page_key),
        page_url: row.get(3)?,
        issue_type: row.get(4)?,
        severity: enum_column::<Severity>(row, 5)?,
        title: row.get(6)?,
        description: row.get(7)?,
        recommendation: row.get(8)?,
        fix_instructions: row.get(9)?,
        impact: row.get(10)?,
        affected_element: row.get(11)?,
        is_resolved: row.get(12)?,
        detected_at: row.get(13)?,
        resolved_at: row.get(14)?,
    })
}

fn score_from_row(row: &Row) -> Result<ScoreRecord> {
    let page_key: i64 = row.get(1)?;
    Ok(ScoreRecord {
        site_id: row.get(0)?,
        page_id: (page_key != SITE_PAGE_KEY).then_some(page_key),
        dimensions: DimensionScores {
            technical: row.get(2)?,
            content: row.get(3)?,
            authority: row.get(4)?,
            linking: row.get(5)?,
            ai_visibility: row.get(6)?,
        },
        overall: row.get(7)?,
        breakdown: json_column::<Breakdown>(row, 8)?,
        computed_at: row.get(9)?,
    })
}

fn keyword_from_row(row: &Row) -> Result<KeywordRecord> {
    Ok(KeywordRecord {
        site_id: row.get(0)?,
        keyword: row.get(1)?,
        frequency: row.get::<_, i64>(2)? as u64,
        density: row.get(3)?,
        estimated_volume: row.get::<_, i64>(4)? as u64,
        estimated_difficulty: row.get(5)?,
        estimated_ctr: row.get(6)?,
        current_rank: row.get::<_, Option<i64>>(7)?.map(|r| r as u32),
        target_rank: row.get::<_, i64>(8)? as u32,
        rank_gap: row.get(9)?,
        opportunity_score: row.get(10)?,
        is_opportunity: row.get(11)?,
        page_urls: json_column::<Vec<String>>(row, 12)?,
    })
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    root_url TEXT NOT NULL,
    sitemap_url TEXT,
    last_crawled INTEGER,
    total_pages INTEGER NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS crawl_jobs (
    id TEXT PRIMARY KEY,
    site_id INTEGER NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('pending', 'running', 'paused', 'completed', 'failed', 'cancelled')),
    max_depth INTEGER NOT NULL,
    max_pages INTEGER NOT NULL,
    use_js_rendering BOOLEAN NOT NULL DEFAULT 0,
    respect_robots BOOLEAN NOT NULL DEFAULT 1,
    rate_limit_rps REAL NOT NULL,
    pages_crawled INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    pages_queued INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER,
    completed_at INTEGER,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(site_id) REFERENCES sites(id)
);

CREATE INDEX IF NOT EXISTS idx_jobs_site ON crawl_jobs(site_id);

CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    crawl_job_id TEXT,
    url TEXT NOT NULL,
    depth INTEGER NOT NULL DEFAULT 0,
    status_code INTEGER NOT NULL,
    title TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    load_time_ms INTEGER NOT NULL DEFAULT 0,
    internal_links_count INTEGER NOT NULL DEFAULT 0,
    external_links_count INTEGER NOT NULL DEFAULT 0,
    inbound_links_count INTEGER NOT NULL DEFAULT 0,
    signals TEXT NOT NULL,    -- JSON PageSignals
    crawled_at INTEGER NOT NULL,
    FOREIGN KEY(site_id) REFERENCES sites(id),
    FOREIGN KEY(crawl_job_id) REFERENCES crawl_jobs(id) ON DELETE SET NULL,
    UNIQUE(site_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pages_job ON pages(crawl_job_id);

CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    source_page_id INTEGER NOT NULL,
    target_url TEXT NOT NULL,
    target_page_id INTEGER,
    anchor_text TEXT NOT NULL DEFAULT '',
    is_internal BOOLEAN NOT NULL,
    is_nofollow BOOLEAN NOT NULL DEFAULT 0,
    is_broken BOOLEAN NOT NULL DEFAULT 0,
    FOREIGN KEY(site_id) REFERENCES sites(id),
    FOREIGN KEY(source_page_id) REFERENCES pages(id) ON DELETE CASCADE,
    FOREIGN KEY(target_page_id) REFERENCES pages(id) ON DELETE SET NULL,
    UNIQUE(source_page_id, target_url)
);

CREATE INDEX IF NOT EXISTS idx_links_target ON links(site_id, target_url);

CREATE TABLE IF NOT EXISTS scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    page_key INTEGER NOT NULL,    -- page id, 0 for the site score
    technical REAL NOT NULL,
    content REAL NOT NULL,
    authority REAL NOT NULL,
    linking REAL NOT NULL,
    ai_visibility REAL NOT NULL,
    overall REAL NOT NULL,
    breakdown TEXT NOT NULL,      -- JSON dimension -> factor -> score
    computed_at INTEGER NOT NULL,
    FOREIGN KEY(site_id) REFERENCES sites(id),
    UNIQUE(site_id, page_key)
);

CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    page_id INTEGER NOT NULL,     -- 0 for site-level issues
    issue_type TEXT NOT NULL,
    severity TEXT NOT NULL CHECK(severity IN ('critical', 'high', 'medium', 'low', 'info')),
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    recommendation TEXT NOT NULL,
    fix_instructions TEXT NOT NULL,
    impact TEXT NOT NULL,
    affected_element TEXT,
    is_resolved BOOLEAN NOT NULL DEFAULT 0,
    detected_at INTEGER NOT NULL,
    resolved_at INTEGER,
    FOREIGN KEY(site_id) REFERENCES sites(id),
    UNIQUE(site_id, page_id, issue_type)
);

CREATE INDEX IF NOT EXISTS idx_issues_severity ON issues(site_id, severity);

CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    keyword TEXT NOT NULL,
    frequency INTEGER NOT NULL,
    density REAL NOT NULL,
    estimated_volume INTEGER NOT NULL,
    estimated_difficulty REAL NOT NULL,
    estimated_ctr REAL NOT NULL,
    current_rank INTEGER,
    target_rank INTEGER NOT NULL,
    rank_gap INTEGER NOT NULL,
    opportunity_score REAL NOT NULL CHECK(opportunity_score >= 0),
    is_opportunity BOOLEAN NOT NULL,
    page_urls TEXT NOT NULL,      -- JSON array
    FOREIGN KEY(site_id) REFERENCES sites(id),
    UNIQUE(site_id, keyword)
);

CREATE TABLE IF NOT EXISTS crawl_failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    site_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    status_code INTEGER,
    reason TEXT NOT NULL,
    failed_at INTEGER NOT NULL,
    FOREIGN KEY(job_id) REFERENCES crawl_jobs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_failures_url ON crawl_failures(site_id, url);
            ",
        )?;
        Ok(())
    }

    // Sites

    /// Create the site for `domain`, or refresh its root and sitemap URLs.
    pub fn upsert_site(&self, domain: &str, root_url: &str, sitemap_url: Option<&str>) -> Result<Site> {
        self.conn.execute(
            "INSERT INTO sites (domain, root_url, sitemap_url, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(domain) DO UPDATE SET
                root_url = excluded.root_url,
                sitemap_url = COALESCE(excluded.sitemap_url, sites.sitemap_url),
                is_active = 1",
            params![domain, root_url, sitemap_url, current_timestamp()],
        )?;
        self.conn.query_row(
            &format!("SELECT {} FROM sites WHERE domain = ?1", SITE_COLUMNS),
            params![domain],
            site_from_row,
        )
    }

    pub fn get_site(&self, site_id: i64) -> Result<Option<Site>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS),
                params![site_id],
                site_from_row,
            )
            .optional()
    }

    pub fn get_site_by_domain(&self, domain: &str) -> Result<Option<Site>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE domain = ?1", SITE_COLUMNS),
                params![domain],
                site_from_row,
            )
            .optional()
    }

    pub fn list_sites(&self) -> Result<Vec<Site>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM sites ORDER BY domain", SITE_COLUMNS))?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(sites)
    }

    /// Refresh the page total. `last_crawled` is only moved forward when given.
    pub fn update_site_totals(
        &self,
        site_id: i64,
        total_pages: i64,
        last_crawled: Option<i64>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sites SET total_pages = ?1, last_crawled = COALESCE(?2, last_crawled) WHERE id = ?3",
            params![total_pages, last_crawled, site_id],
        )?;
        Ok(())
    }

    // Crawl jobs

    pub fn insert_job(&self, job: &CrawlJob) -> Result<()> {
        self.conn.execute(
            "INSERT INTO crawl_jobs (
                id, site_id, status, max_depth, max_pages, use_js_rendering, respect_robots,
                rate_limit_rps, pages_crawled, pages_failed, pages_queued, started_at,
                completed_at, error_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                &job.id,
                job.site_id,
                job.status.as_str(),
                job.max_depth as i64,
                job.max_pages as i64,
                job.use_js_rendering,
                job.respect_robots,
                job.rate_limit_rps,
                job.pages_crawled as i64,
                job.pages_failed as i64,
                job.pages_queued as i64,
                job.started_at,
                job.completed_at,
                &job.error_message,
                job.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<CrawlJob>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_jobs WHERE id = ?1", JOB_COLUMNS),
                params![job_id],
                job_from_row,
            )
            .optional()
    }

    pub fn list_jobs(&self, site_id: i64) -> Result<Vec<CrawlJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_jobs WHERE site_id = ?1 ORDER BY created_at DESC, rowid DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![site_id], job_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Persist a status change. `started_at` is set on the first move to running,
    /// `completed_at` on any terminal status.
    pub fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = current_timestamp();
        let completed_at = status.is_terminal().then_some(now);
        let started_at = (status == JobStatus::Running).then_some(now);
        self.conn.execute(
            "UPDATE crawl_jobs SET
                status = ?1,
                started_at = COALESCE(started_at, ?2),
                completed_at = COALESCE(?3, completed_at),
                error_message = COALESCE(?4, error_message)
             WHERE id = ?5",
            params![status.as_str(), started_at, completed_at, error_message, job_id],
        )?;
        Ok(())
    }

    pub fn update_job_counters(
        &self,
        job_id: &str,
        pages_crawled: usize,
        pages_failed: usize,
        pages_queued: usize,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE crawl_jobs SET pages_crawled = ?1, pages_failed = ?2, pages_queued = ?3 WHERE id = ?4",
            params![
                pages_crawled as i64,
                pages_failed as i64,
                pages_queued as i64,
                job_id
            ],
        )?;
        Ok(())
    }

    // Pages

    /// Insert or overwrite the page for (site, url). Returns the page id.
    pub fn upsert_page(
        &self,
        site_id: i64,
        job_id: Option<&str>,
        url: &str,
        depth: usize,
        signals: &PageSignals,
        internal_links_count: usize,
        external_links_count: usize,
    ) -> Result<i64> {
        let signals_json = to_json(signals)?;
        self.conn.query_row(
            "INSERT INTO pages (
                site_id, crawl_job_id, url, depth, status_code, title, word_count, load_time_ms,
                internal_links_count, external_links_count, signals, crawled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(site_id, url) DO UPDATE SET
                crawl_job_id = excluded.crawl_job_id,
                depth = excluded.depth,
                status_code = excluded.status_code,
                title = excluded.title,
                word_count = excluded.word_count,
                load_time_ms = excluded.load_time_ms,
                internal_links_count = excluded.internal_links_count,
                external_links_count = excluded.external_links_count,
                signals = excluded.signals,
                crawled_at = excluded.crawled_at
            RETURNING id",
            params![
                site_id,
                job_id,
                url,
                depth as i64,
                signals.status_code,
                &signals.title,
                signals.word_count as i64,
                signals.load_time_ms as i64,
                internal_links_count as i64,
                external_links_count as i64,
                signals_json,
                current_timestamp(),
            ],
            |row| row.get(0),
        )
    }

    pub fn get_page(&self, page_id: i64) -> Result<Option<PageRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
                params![page_id],
                page_from_row,
            )
            .optional()
    }

    pub fn get_page_by_url(&self, site_id: i64, url: &str) -> Result<Option<PageRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE site_id = ?1 AND url = ?2", PAGE_COLUMNS),
                params![site_id, url],
                page_from_row,
            )
            .optional()
    }

    pub fn get_page_id(&self, site_id: i64, url: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM pages WHERE site_id = ?1 AND url = ?2",
                params![site_id, url],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn list_pages(&self, site_id: i64) -> Result<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages WHERE site_id = ?1 ORDER BY depth, url",
            PAGE_COLUMNS
        ))?;
        let pages = stmt
            .query_map(params![site_id], page_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(pages)
    }

    pub fn list_pages_for_job(&self, job_id: &str) -> Result<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages WHERE crawl_job_id = ?1 ORDER BY depth, url",
            PAGE_COLUMNS
        ))?;
        let pages = stmt
            .query_map(params![job_id], page_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(pages)
    }

    pub fn count_pages(&self, site_id: i64) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE site_id = ?1",
            params![site_id],
            |row| row.get(0),
        )
    }

    pub fn set_inbound_count(&self, page_id: i64, inbound: usize) -> Result<()> {
        self.conn.execute(
            "UPDATE pages SET inbound_links_count = ?1 WHERE id = ?2",
            params![inbound as i64, page_id],
        )?;
        Ok(())
    }

    // Links

    /// Replace the outbound edges of `source_page_id`. Targets that are already
    /// persisted pages are linked immediately, the rest wait for back-fill.
    ///
    /// An edge is broken when the target's latest fetch failed. A successful fetch clears
    /// the URL's failure rows, so a failure row outranks a page row from an older crawl.
    pub fn replace_links(
        &self,
        site_id: i64,
        source_page_id: i64,
        links: &[OutboundLink],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM links WHERE source_page_id = ?1",
            params![source_page_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO links (
                    site_id, source_page_id, target_url, target_page_id, anchor_text,
                    is_internal, is_nofollow, is_broken
                ) VALUES (
                    ?1, ?2, ?3,
                    (SELECT id FROM pages WHERE site_id = ?1 AND url = ?3),
                    ?4, ?5, ?6,
                    EXISTS (SELECT 1 FROM crawl_failures WHERE site_id = ?1 AND url = ?3)
                )",
            )?;
            for link in links {
                insert.execute(params![
                    site_id,
                    source_page_id,
                    &link.target_url,
                    &link.anchor_text,
                    link.is_internal,
                    link.nofollow,
                ])?;
            }
        }
        tx.commit()?;
        Ok(links.len())
    }

    /// Point dangling edges at a newly persisted page and clear any broken flag.
    pub fn backfill_link_targets(&self, site_id: i64, page_id: i64, url: &str) -> Result<usize> {
        self.conn.execute(
            "UPDATE links SET target_page_id = ?1, is_broken = 0 WHERE site_id = ?2 AND target_url = ?3",
            params![page_id, site_id, url],
        )
    }

    /// Flag every edge pointing at `target_url`, including edges to a page row left over
    /// from an earlier crawl.
    pub fn mark_links_broken(&self, site_id: i64, target_url: &str) -> Result<usize> {
        self.conn.execute(
            "UPDATE links SET is_broken = 1 WHERE site_id = ?1 AND target_url = ?2",
            params![site_id, target_url],
        )
    }

    pub fn list_links(&self, site_id: i64) -> Result<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, site_id, source_page_id, target_url, target_page_id, anchor_text,
                    is_internal, is_nofollow, is_broken
             FROM links WHERE site_id = ?1 ORDER BY source_page_id, id",
        )?;
        let links = stmt
            .query_map(params![site_id], |row| {
                Ok(LinkRecord {
                    id: row.get(0)?,
                    site_id: row.get(1)?,
                    source_page_id: row.get(2)?,
                    target_url: row.get(3)?,
                    target_page_id: row.get(4)?,
                    anchor_text: row.get(5)?,
                    is_internal: row.get(6)?,
                    is_nofollow: row.get(7)?,
                    is_broken: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(links)
    }

    /// Distinct pages with an internal link to `url`.
    pub fn inbound_link_count(&self, site_id: i64, url: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT source_page_id) FROM links
             WHERE site_id = ?1 AND target_url = ?2 AND is_internal = 1",
            params![site_id, url],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn broken_outbound_count(&self, page_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM links WHERE source_page_id = ?1 AND is_broken = 1",
            params![page_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // Failures

    pub fn insert_failure(&self, site_id: i64, failure: &FailureRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO crawl_failures (job_id, site_id, url, depth, status_code, reason, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &failure.job_id,
                site_id,
                &failure.url,
                failure.depth as i64,
                failure.status_code,
                &failure.reason,
                failure.failed_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_failures(&self, job_id: &str) -> Result<Vec<FailureRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, url, depth, status_code, reason, failed_at
             FROM crawl_failures WHERE job_id = ?1 ORDER BY id",
        )?;
        let failures = stmt
            .query_map(params![job_id], |row| {
                Ok(FailureRecord {
                    job_id: row.get(0)?,
                    url: row.get(1)?,
                    depth: row.get::<_, i64>(2)? as usize,
                    status_code: row.get(3)?,
                    reason: row.get(4)?,
                    failed_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(failures)
    }

    pub fn clear_failures_for_url(&self, site_id: i64, url: &str) -> Result<usize> {
        self.conn.execute(
            "DELETE FROM crawl_failures WHERE site_id = ?1 AND url = ?2",
            params![site_id, url],
        )
    }

    // Scores

    /// One live row per (site, page): a new computation replaces the previous one.
    pub fn upsert_score(&self, score: &ScoreRecord) -> Result<()> {
        let breakdown = to_json(&score.breakdown)?;
        self.conn.execute(
            "INSERT INTO scores (
                site_id, page_key, technical, content, authority, linking, ai_visibility,
                overall, breakdown, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(site_id, page_key) DO UPDATE SET
                technical = excluded.technical,
                content = excluded.content,
                authority = excluded.authority,
                linking = excluded.linking,
                ai_visibility = excluded.ai_visibility,
                overall = excluded.overall,
                breakdown = excluded.breakdown,
                computed_at = excluded.computed_at",
            params![
                score.site_id,
                score.page_id.unwrap_or(SITE_PAGE_KEY),
                score.dimensions.technical,
                score.dimensions.content,
                score.dimensions.authority,
                score.dimensions.linking,
                score.dimensions.ai_visibility,
                score.overall,
                breakdown,
                score.computed_at,
            ],
        )?;
        Ok(())
    }

    fn get_score(&self, site_id: i64, page_key: i64) -> Result<Option<ScoreRecord>> {
        self.conn
            .query_row(
                "SELECT site_id, page_key, technical, content, authority, linking, ai_visibility,
                        overall, breakdown, computed_at
                 FROM scores WHERE site_id = ?1 AND page_key = ?2",
                params![site_id, page_key],
                score_from_row,
            )
            .optional()
    }

    pub fn get_page_score(&self, site_id: i64, page_id: i64) -> Result<Option<ScoreRecord>> {
        self.get_score(site_id, page_id)
    }

    pub fn get_site_score(&self, site_id: i64) -> Result<Option<ScoreRecord>> {
        self.get_score(site_id, SITE_PAGE_KEY)
    }

    pub fn list_page_scores(&self, site_id: i64) -> Result<Vec<ScoreRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, page_key, technical, content, authority, linking, ai_visibility,
                    overall, breakdown, computed_at
             FROM scores WHERE site_id = ?1 AND page_key != 0 ORDER BY page_key",
        )?;
        let scores = stmt
            .query_map(params![site_id], score_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(scores)
    }

    // Issues

    /// Every issue row for one page (or the site when `page_id` is `None`), resolved or not.
    pub fn issues_for_page(&self, site_id: i64, page_id: Option<i64>) -> Result<Vec<IssueRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM issues i LEFT JOIN pages p ON p.id = i.page_id
             WHERE i.site_id = ?1 AND i.page_id = ?2 ORDER BY i.id",
            ISSUE_COLUMNS
        ))?;
        let issues = stmt
            .query_map(
                params![site_id, page_id.unwrap_or(SITE_PAGE_KEY)],
                issue_from_row,
            )?
            .collect::<Result<Vec<_>>>()?;
        Ok(issues)
    }

    pub fn insert_issue(&self, site_id: i64, page_id: Option<i64>, issue: &NewIssue) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO issues (
                site_id, page_id, issue_type, severity, title, description, recommendation,
                fix_instructions, impact, affected_element, detected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                site_id,
                page_id.unwrap_or(SITE_PAGE_KEY),
                &issue.issue_type,
                issue.severity.as_str(),
                &issue.title,
                &issue.description,
                &issue.recommendation,
                &issue.fix_instructions,
                &issue.impact,
                &issue.affected_element,
                current_timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Refresh the text of an issue that still holds, reopening it if it was resolved.
    /// Severity is left untouched.
    pub fn refresh_issue(&self, issue_id: i64, issue: &NewIssue) -> Result<()> {
        self.conn.execute(
            "UPDATE issues SET
                title = ?1, description = ?2, recommendation = ?3, fix_instructions = ?4,
                impact = ?5, affected_element = ?6,
                detected_at = CASE WHEN is_resolved THEN ?7 ELSE detected_at END,
                is_resolved = 0, resolved_at = NULL
             WHERE id = ?8",
            params![
                &issue.title,
                &issue.description,
                &issue.recommendation,
                &issue.fix_instructions,
                &issue.impact,
                &issue.affected_element,
                current_timestamp(),
                issue_id,
            ],
        )?;
        Ok(())
    }

    pub fn resolve_issue(&self, issue_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE issues SET is_resolved = 1, resolved_at = ?1 WHERE id = ?2 AND is_resolved = 0",
            params![current_timestamp(), issue_id],
        )?;
        Ok(())
    }

    pub fn list_issues(&self, site_id: i64, filter: IssueFilter) -> Result<Vec<IssueRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM issues i LEFT JOIN pages p ON p.id = i.page_id
             WHERE i.site_id = ?1
               AND (?2 IS NULL OR i.severity = ?2)
               AND (?3 IS NULL OR i.is_resolved = ?3)
             ORDER BY CASE i.severity
                WHEN 'critical' THEN 1
                WHEN 'high' THEN 2
                WHEN 'medium' THEN 3
                WHEN 'low' THEN 4
                WHEN 'info' THEN 5
             END, i.id",
            ISSUE_COLUMNS
        ))?;
        let issues = stmt
            .query_map(
                params![
                    site_id,
                    filter.severity.map(|s| s.as_str()),
                    filter.resolved
                ],
                issue_from_row,
            )?
            .collect::<Result<Vec<_>>>()?;
        Ok(issues)
    }

    /// Open issue counts per severity. Every severity is present, zero or not.
    pub fn issue_counts(&self, site_id: i64) -> Result<BTreeMap<Severity, usize>> {
        let mut counts: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut stmt = self.conn.prepare(
            "SELECT severity, COUNT(*) FROM issues WHERE site_id = ?1 AND is_resolved = 0 GROUP BY severity",
        )?;
        let rows = stmt
            .query_map(params![site_id], |row| {
                Ok((enum_column::<Severity>(row, 0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>>>()?;
        for (severity, count) in rows {
            counts.insert(severity, count as usize);
        }
        Ok(counts)
    }

    // Keywords

    /// Replace the site's keyword set in one transaction.
    pub fn replace_keywords(&self, site_id: i64, keywords: &[KeywordRecord]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM keywords WHERE site_id = ?1", params![site_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO keywords (
                    site_id, keyword, frequency, density, estimated_volume, estimated_difficulty,
                    estimated_ctr, current_rank, target_rank, rank_gap, opportunity_score,
                    is_opportunity, page_urls
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for keyword in keywords {
                insert.execute(params![
                    site_id,
                    &keyword.keyword,
                    keyword.frequency as i64,
                    keyword.density,
                    keyword.estimated_volume as i64,
                    keyword.estimated_difficulty,
                    keyword.estimated_ctr,
                    keyword.current_rank.map(|r| r as i64),
                    keyword.target_rank as i64,
                    keyword.rank_gap,
                    keyword.opportunity_score,
                    keyword.is_opportunity,
                    to_json(&keyword.page_urls)?,
                ])?;
            }
        }
        tx.commit()
    }

    /// Keywords ordered by opportunity score, then volume, then keyword.
    pub fn list_keywords(
        &self,
        site_id: i64,
        min_score: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<KeywordRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, keyword, frequency, density, estimated_volume, estimated_difficulty,
                    estimated_ctr, current_rank, target_rank, rank_gap, opportunity_score,
                    is_opportunity, page_urls
             FROM keywords
             WHERE site_id = ?1 AND (?2 IS NULL OR opportunity_score >= ?2)
             ORDER BY opportunity_score DESC, estimated_volume DESC, keyword ASC
             LIMIT ?3",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let keywords = stmt
            .query_map(params![site_id, min_score, limit], keyword_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(keywords)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
