use anyhow::{Context, anyhow, bail};
use clap::ArgMatches;
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use pager::Pager;
use seolens_core::crawl::lock_db;
use seolens_core::data::{Database, IssueFilter};
use seolens_core::model::{CrawlJob, IssueRecord, JobStatus, KeywordRecord, Severity, Site};
use seolens_core::report::{
    ReportFormat, format_timestamp, gather_site_report, render_report, resolve_site, save_report,
};
use seolens_core::{CrawlRequest, CrawlService, Settings};
use seolens_scanner::HttpFetcher;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DB_FILE_NAME: &str = "seolens.db";

const REPORT_KEYWORDS: usize = 20;
const CONTROL_POLL: Duration = Duration::from_millis(500);

// Helper functions

/// Expand `~` and point directories at the database file inside them.
pub fn resolve_db_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if raw.ends_with('/') || path.is_dir() {
        path.join(DB_FILE_NAME)
    } else {
        path
    }
}

pub fn open_database(path: &Path) -> anyhow::Result<Database> {
    if !Database::exists(path) {
        bail!(
            "No database found at {}. Run `seolens init` first or pass --db.",
            path.display()
        );
    }
    Database::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Path and query of a URL, for compact progress output.
pub fn short_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// `--resolved` lists resolved issues, `--all` lists everything, default is open ones.
pub fn parse_issue_filter(
    severity: Option<&str>,
    resolved: bool,
    all: bool,
) -> anyhow::Result<IssueFilter> {
    let severity = severity
        .map(|s| s.parse::<Severity>())
        .transpose()
        .map_err(|e| anyhow!("{}", e))?;
    let resolved = if all { None } else { Some(resolved) };
    Ok(IssueFilter { severity, resolved })
}

pub fn build_crawl_request(args: &ArgMatches) -> CrawlRequest {
    let mut request = CrawlRequest::new(
        args.get_one::<Url>("url")
            .map(|u| u.as_str())
            .unwrap_or_default(),
    );
    if let Some(depth) = args.get_one::<usize>("max-depth") {
        request.max_depth = *depth;
    }
    if let Some(pages) = args.get_one::<usize>("max-pages") {
        request.max_pages = *pages;
    }
    request.rate_limit_rps = args.get_one::<f64>("rps").copied();
    request.sitemap_url = args.get_one::<Url>("sitemap").map(|u| u.to_string());
    request.use_js_rendering = args.get_flag("render-js");
    request.respect_robots = !args.get_flag("ignore-robots");
    request
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("{:<8}", severity.as_str().to_uppercase());
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.bright_red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.cyan(),
        Severity::Info => label.dimmed(),
    }
}

fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Completed => status.as_str().green().bold(),
        JobStatus::Failed => status.as_str().red().bold(),
        JobStatus::Cancelled => status.as_str().yellow().bold(),
        JobStatus::Running => status.as_str().bright_cyan().bold(),
        JobStatus::Paused => status.as_str().magenta().bold(),
        JobStatus::Pending => status.as_str().white(),
    }
}

pub fn render_job_status(job: &CrawlJob, domain: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", "Job:".bold(), job.id));
    if let Some(domain) = domain {
        out.push_str(&format!("{} {}\n", "Site:".bold(), domain));
    }
    out.push_str(&format!("{} {}\n", "Status:".bold(), status_label(job.status)));
    out.push_str(&format!(
        "{} {} crawled, {} failed, {} queued\n",
        "Pages:".bold(),
        job.pages_crawled,
        job.pages_failed,
        job.pages_queued
    ));
    out.push_str(&format!(
        "{} depth {}, max {} pages, {} req/s{}{}\n",
        "Limits:".bold(),
        job.max_depth,
        job.max_pages,
        job.rate_limit_rps,
        if job.respect_robots { "" } else { ", robots ignored" },
        if job.use_js_rendering { ", js rendering" } else { "" },
    ));
    if let Some(started) = job.started_at {
        out.push_str(&format!("{} {}\n", "Started:".bold(), format_timestamp(started)));
    }
    if let Some(completed) = job.completed_at {
        out.push_str(&format!("{} {}\n", "Finished:".bold(), format_timestamp(completed)));
    }
    if let Some(err) = &job.error_message {
        out.push_str(&format!("{} {}\n", "Error:".bold(), err.red()));
    }
    out
}

pub fn render_sites(sites: &[(Site, Option<CrawlJob>)]) -> String {
    if sites.is_empty() {
        return format!("{}\n", "No sites crawled yet.".dimmed());
    }
    let mut out = String::new();
    for (site, job) in sites {
        let crawled = site
            .last_crawled
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string());
        out.push_str(&format!(
            "{:>4}  {}  {} pages, last crawled {}\n",
            site.id,
            site.domain.bright_white().bold(),
            site.total_pages,
            crawled
        ));
        if let Some(job) = job {
            out.push_str(&format!(
                "      {} {} [{}]\n",
                "↳".blue(),
                job.id,
                status_label(job.status)
            ));
        }
    }
    out
}

pub fn render_issue_listing(issues: &[IssueRecord]) -> String {
    if issues.is_empty() {
        return format!("{}\n", "No issues found.".green());
    }
    let mut out = String::new();
    for issue in issues {
        let location = issue
            .page_url
            .as_deref()
            .map(short_path)
            .unwrap_or_else(|| "(site)".to_string());
        let state = if issue.is_resolved {
            " resolved".green().to_string()
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{} {} {}{}\n",
            severity_label(issue.severity),
            issue.title.bold(),
            location.dimmed(),
            state
        ));
        out.push_str(&format!("         {}\n", issue.recommendation));
    }
    out.push_str(&format!("\n{} issue(s)\n", issues.len()));
    out
}

pub fn render_keyword_listing(keywords: &[KeywordRecord]) -> String {
    if keywords.is_empty() {
        return format!("{}\n", "No keywords recorded for this site.".dimmed());
    }
    let mut out = format!(
        "{}\n",
        format!(
            "{:<30} {:>9} {:>8} {:>6} {:>5} {:>4}",
            "KEYWORD", "SCORE", "VOLUME", "DIFF", "RANK", "GAP"
        )
        .bold()
    );
    for kw in keywords {
        let rank = kw
            .current_rank
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let line = format!(
            "{:<30} {:>9.2} {:>8} {:>6.0} {:>5} {:>4}",
            kw.keyword, kw.opportunity_score, kw.estimated_volume, kw.estimated_difficulty, rank, kw.rank_gap
        );
        if kw.is_opportunity {
            out.push_str(&format!("{}\n", line.green()));
        } else {
            out.push_str(&format!("{}\n", line));
        }
    }
    out
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn show(content: &str, no_pager: bool) {
    if !no_pager {
        Pager::with_pager("less -R").setup();
    }
    println!("{}", content);
}

fn output_report(content: &str, output: Option<&PathBuf>, no_pager: bool) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            save_report(content, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => show(content, no_pager),
    }
    Ok(())
}

fn report_format(args: &ArgMatches) -> anyhow::Result<ReportFormat> {
    let raw = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    ReportFormat::parse(raw).ok_or_else(|| anyhow!("Unknown report format '{}'", raw))
}

/// A service over an existing database, for commands that never fetch.
fn service_for(db_path: &Path) -> anyhow::Result<CrawlService> {
    let settings = Settings::from_env();
    let fetcher = HttpFetcher::with_options(settings.request_timeout.as_secs(), &settings.user_agent)?;
    let db = Arc::new(Mutex::new(open_database(db_path)?));
    Ok(CrawlService::new(db, Arc::new(fetcher), settings)?)
}

// Handler functions

pub fn handle_init(args: &ArgMatches) -> anyhow::Result<()> {
    print_divider();
    println!("{}", "  SEOLENS INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let raw_dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR);
    let force = args.get_flag("force");
    let expanded = shellexpand::tilde(raw_dir);
    let config_dir = Path::new(expanded.as_ref());
    let db_path = config_dir.join(DB_FILE_NAME);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    if Database::exists(&db_path) {
        if !force {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!(
                "A database already exists at {}",
                db_path.display().to_string().bright_white()
            );
            println!("{}", "All crawl data in it will be deleted.".yellow());

            let response = print_prompt("Do you want to continue? [y/N]:")?;
            println!();
            if response != "y" && response != "yes" {
                println!("{} Initialization cancelled.", "✗".red().bold());
                return Ok(());
            }
        }
        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Removed existing database", "✓".green().bold());
    }

    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    println!("{} Configuration directory ready", "✓".green().bold());

    Database::new(&db_path)
        .with_context(|| format!("Failed to create database {}", db_path.display()))?;
    println!(
        "{} Database initialized at {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    print_divider();
    println!("  Next: {}", "seolens crawl --url https://example.com".bright_cyan());
    print_divider();
    Ok(())
}

pub async fn handle_crawl(args: &ArgMatches, db_path: &Path, quiet: bool) -> anyhow::Result<()> {
    let request = build_crawl_request(args);
    let format = report_format(args)?;
    let output = args.get_one::<PathBuf>("output");
    let no_pager = args.get_flag("no-pager");

    let settings = Settings::from_env();
    let fetcher = HttpFetcher::with_options(settings.request_timeout.as_secs(), &settings.user_agent)?;
    let db = Arc::new(Mutex::new(open_database(db_path)?));

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {prefix:.bold} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Starting crawl...");

    let progress = spinner.clone();
    let service = CrawlService::new(db.clone(), Arc::new(fetcher), settings)?
        .with_progress_callback(Arc::new(move |_worker: usize, url: String| {
            progress.set_message(short_path(&url));
        }));

    let (ticket, mut handle) = service.start(&request)?;
    spinner.println(format!(
        "{} Crawling {} as job {}",
        "→".blue(),
        request.url.bright_white(),
        ticket.job_id.bright_white()
    ));

    let mut ticker = tokio::time::interval(CONTROL_POLL);
    let mut interrupted = false;
    let job = loop {
        tokio::select! {
            joined = &mut handle => {
                break joined.context("Crawl task panicked")??;
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!("Failed to listen for interrupt: {}", e);
                    continue;
                }
                spinner.println(format!("{} Interrupted, cancelling crawl...", "⚠".yellow().bold()));
                if let Err(e) = service.cancel(&ticket.job_id) {
                    warn!(job_id = %ticket.job_id, "Cancel failed: {}", e);
                }
            }
            _ = ticker.tick() => {
                match service.sync_control(&ticket.job_id) {
                    Ok(job) => spinner.set_prefix(format!(
                        "[{}] {} crawled, {} failed, {} queued",
                        job.status, job.pages_crawled, job.pages_failed, job.pages_queued
                    )),
                    Err(e) => debug!("Status poll failed: {}", e),
                }
            }
        }
    };
    spinner.finish_and_clear();

    print_divider();
    print!("{}", render_job_status(&job, None));
    print_divider();

    if job.status == JobStatus::Failed {
        bail!(
            "Crawl failed: {}",
            job.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    let content = {
        let db = lock_db(&db)?;
        let report = gather_site_report(&db, ticket.site_id, REPORT_KEYWORDS)?;
        render_report(&report, format)?
    };
    output_report(&content, output, no_pager)
}

pub fn handle_status(args: &ArgMatches, db_path: &Path) -> anyhow::Result<()> {
    let db = open_database(db_path)?;
    match args.get_one::<String>("JOB_ID") {
        Some(job_id) => {
            let job = db
                .get_job(job_id)?
                .ok_or_else(|| anyhow!("No crawl job with id {}", job_id))?;
            let domain = db.get_site(job.site_id)?.map(|s| s.domain);
            print!("{}", render_job_status(&job, domain.as_deref()));
            let failures = db.list_failures(job_id)?;
            if !failures.is_empty() {
                println!("{}", "Failures:".bold());
                for failure in failures.iter().take(20) {
                    let code = failure
                        .status_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "---".to_string());
                    println!("  {} {} {}", code.red(), failure.url, failure.reason.dimmed());
                }
                if failures.len() > 20 {
                    println!("  ... and {} more", failures.len() - 20);
                }
            }
        }
        None => {
            let mut rows = Vec::new();
            for site in db.list_sites()? {
                let latest = db.list_jobs(site.id)?.into_iter().next();
                rows.push((site, latest));
            }
            print!("{}", render_sites(&rows));
        }
    }
    Ok(())
}

pub fn handle_report(args: &ArgMatches, db_path: &Path) -> anyhow::Result<()> {
    let db = open_database(db_path)?;
    let target = args
        .get_one::<String>("SITE")
        .ok_or_else(|| anyhow!("A site is required"))?;
    let keyword_limit = args
        .get_one::<usize>("keywords")
        .copied()
        .unwrap_or(REPORT_KEYWORDS);
    let site = resolve_site(&db, target)?;
    let report = gather_site_report(&db, site.id, keyword_limit)?;
    let content = render_report(&report, report_format(args)?)?;
    output_report(&content, args.get_one::<PathBuf>("output"), args.get_flag("no-pager"))
}

pub fn handle_issues(args: &ArgMatches, db_path: &Path) -> anyhow::Result<()> {
    let db = open_database(db_path)?;
    let target = args
        .get_one::<String>("SITE")
        .ok_or_else(|| anyhow!("A site is required"))?;
    let filter = parse_issue_filter(
        args.get_one::<String>("severity").map(String::as_str),
        args.get_flag("resolved"),
        args.get_flag("all"),
    )?;
    let site = resolve_site(&db, target)?;
    let issues = db.list_issues(site.id, filter)?;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else {
        println!("{} {}\n", "Issues for".bold(), site.domain.bright_white().bold());
        print!("{}", render_issue_listing(&issues));
    }
    Ok(())
}

pub fn handle_keywords(args: &ArgMatches, db_path: &Path) -> anyhow::Result<()> {
    let target = args
        .get_one::<String>("SITE")
        .ok_or_else(|| anyhow!("A site is required"))?;
    let min_score = args.get_one::<f64>("min-score").copied();
    let limit = args.get_one::<usize>("limit").copied();

    let service = service_for(db_path)?;
    let db = service.database();
    let site = resolve_site(&*lock_db(&db)?, target)?;
    if args.get_flag("refresh") {
        let count = service.refresh_keywords(site.id)?;
        println!("{} Recomputed {} keywords", "✓".green().bold(), count);
    }

    let keywords = lock_db(&db)?.list_keywords(site.id, min_score, limit)?;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&keywords)?);
    } else {
        println!(
            "{} {}\n",
            "Keyword opportunities for".bold(),
            site.domain.bright_white().bold()
        );
        print!("{}", render_keyword_listing(&keywords));
    }
    Ok(())
}

/// `pause`, `resume` and `cancel`. A crawl running in another seolens process
/// picks the new status up on its next poll.
pub fn handle_job_control(action: &str, args: &ArgMatches, db_path: &Path) -> anyhow::Result<()> {
    let job_id = args
        .get_one::<String>("JOB_ID")
        .ok_or_else(|| anyhow!("A job id is required"))?;
    let service = service_for(db_path)?;
    let status = match action {
        "pause" => service.pause(job_id)?,
        "resume" => service.resume(job_id)?,
        "cancel" => service.cancel(job_id)?,
        other => bail!("Unknown job action '{}'", other),
    };
    println!(
        "{} Job {} is now {}",
        "✓".green().bold(),
        job_id.bright_white(),
        status_label(status)
    );
    Ok(())
}
