// Tests for the CLI helpers that do not need a terminal or the network

use seolens::commands::command_argument_builder;
use seolens::handlers::{DB_FILE_NAME, handle_keywords};
use seolens::{
    build_crawl_request, open_database, parse_issue_filter, render_issue_listing,
    render_job_status, render_keyword_listing, render_sites, resolve_db_path, short_path,
};
use seolens_core::data::Database;
use seolens_core::model::{CrawlJob, IssueRecord, JobStatus, KeywordRecord, Severity, Site};
use tempfile::TempDir;

fn no_colors() {
    colored::control::set_override(false);
}

fn job(status: JobStatus) -> CrawlJob {
    CrawlJob {
        id: "job-1".to_string(),
        site_id: 1,
        status,
        max_depth: 3,
        max_pages: 100,
        use_js_rendering: false,
        respect_robots: true,
        rate_limit_rps: 5.0,
        pages_crawled: 12,
        pages_failed: 2,
        pages_queued: 0,
        started_at: None,
        completed_at: None,
        error_message: None,
        created_at: 0,
    }
}

// ============================================================================
// Path Helper Tests
// ============================================================================

#[test]
fn test_resolve_db_path_file() {
    let path = resolve_db_path("/tmp/custom.db");
    assert_eq!(path.to_str().unwrap(), "/tmp/custom.db");
}

#[test]
fn test_resolve_db_path_directory() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().to_str().unwrap().to_string();
    assert_eq!(resolve_db_path(&raw), temp_dir.path().join(DB_FILE_NAME));
    assert_eq!(
        resolve_db_path("/not/there/yet/"),
        std::path::PathBuf::from("/not/there/yet/").join(DB_FILE_NAME)
    );
}

#[test]
fn test_resolve_db_path_expands_tilde() {
    let path = resolve_db_path("~/seolens-test.db");
    assert!(!path.to_str().unwrap().starts_with('~'));
    assert!(path.ends_with("seolens-test.db"));
}

#[test]
fn test_open_database_requires_init() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join(DB_FILE_NAME);
    let err = open_database(&db_path).unwrap_err();
    assert!(err.to_string().contains("seolens init"));

    Database::new(&db_path).unwrap();
    assert!(open_database(&db_path).is_ok());
}

#[test]
fn test_keywords_handler_resolves_site() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join(DB_FILE_NAME);
    Database::new(&db_path)
        .unwrap()
        .upsert_site("s.test", "https://s.test/", None)
        .unwrap();

    let keywords = |site: &str| {
        let matches = command_argument_builder().get_matches_from([
            "seolens", "keywords", site, "--json",
        ]);
        let (_, sub) = matches.subcommand().unwrap();
        handle_keywords(sub, &db_path)
    };
    assert!(keywords("s.test").is_ok());
    assert!(keywords("unknown.test").is_err());
}

#[test]
fn test_short_path() {
    assert_eq!(short_path("https://s.test/blog/post"), "/blog/post");
    assert_eq!(short_path("https://s.test/search?q=x"), "/search?q=x");
    assert_eq!(short_path("https://s.test"), "/");
    assert_eq!(short_path("not a url"), "not a url");
}

// ============================================================================
// Argument Tests
// ============================================================================

#[test]
fn test_crawl_arguments_build_request() {
    let matches = command_argument_builder().get_matches_from([
        "seolens",
        "crawl",
        "--url",
        "https://s.test/",
        "--max-depth",
        "3",
        "--rps",
        "2.5",
        "--ignore-robots",
    ]);
    let (_, sub) = matches.subcommand().unwrap();
    let request = build_crawl_request(sub);
    assert_eq!(request.url, "https://s.test/");
    assert_eq!(request.max_depth, 3);
    assert_eq!(request.max_pages, 1000);
    assert_eq!(request.rate_limit_rps, Some(2.5));
    assert!(!request.respect_robots);
    assert!(!request.use_js_rendering);
    assert!(request.validate().is_ok());
}

#[test]
fn test_crawl_rejects_non_url() {
    let result =
        command_argument_builder().try_get_matches_from(["seolens", "crawl", "--url", "nope"]);
    assert!(result.is_err());
}

#[test]
fn test_db_flag_is_global() {
    let matches = command_argument_builder().get_matches_from([
        "seolens", "status", "--db", "/tmp/x.db",
    ]);
    let (name, sub) = matches.subcommand().unwrap();
    assert_eq!(name, "status");
    assert_eq!(sub.get_one::<String>("db").unwrap(), "/tmp/x.db");
}

#[test]
fn test_job_control_requires_id() {
    for action in ["pause", "resume", "cancel"] {
        assert!(command_argument_builder()
            .try_get_matches_from(["seolens", action])
            .is_err());
        assert!(command_argument_builder()
            .try_get_matches_from(["seolens", action, "job-1"])
            .is_ok());
    }
}

#[test]
fn test_issue_filter() {
    let open = parse_issue_filter(None, false, false).unwrap();
    assert_eq!(open.resolved, Some(false));
    assert!(open.severity.is_none());

    let resolved = parse_issue_filter(Some("high"), true, false).unwrap();
    assert_eq!(resolved.resolved, Some(true));
    assert_eq!(resolved.severity, Some(Severity::High));

    assert!(parse_issue_filter(None, false, true).unwrap().resolved.is_none());
    assert!(parse_issue_filter(Some("urgent"), false, false).is_err());
}

// ============================================================================
// Rendering Tests
// ============================================================================

#[test]
fn test_render_job_status() {
    no_colors();
    let mut failed = job(JobStatus::Failed);
    failed.error_message = Some("root URL unreachable".to_string());

    let text = render_job_status(&failed, Some("s.test"));
    assert!(text.contains("Job: job-1"));
    assert!(text.contains("Site: s.test"));
    assert!(text.contains("Status: failed"));
    assert!(text.contains("12 crawled, 2 failed"));
    assert!(text.contains("Error: root URL unreachable"));
}

#[test]
fn test_render_sites() {
    no_colors();
    assert!(render_sites(&[]).contains("No sites crawled yet."));

    let site = Site {
        id: 7,
        domain: "s.test".to_string(),
        root_url: "https://s.test/".to_string(),
        sitemap_url: None,
        last_crawled: None,
        total_pages: 3,
        is_active: true,
        created_at: 0,
    };
    let text = render_sites(&[(site, Some(job(JobStatus::Completed)))]);
    assert!(text.contains("s.test"));
    assert!(text.contains("3 pages, last crawled never"));
    assert!(text.contains("job-1 [completed]"));
}

#[test]
fn test_render_issue_listing() {
    no_colors();
    assert!(render_issue_listing(&[]).contains("No issues found."));

    let issue = IssueRecord {
        id: 1,
        site_id: 1,
        page_id: Some(1),
        page_url: Some("https://s.test/about".to_string()),
        issue_type: "missing_title".to_string(),
        severity: Severity::High,
        title: "Missing title tag".to_string(),
        description: String::new(),
        recommendation: "Add a title".to_string(),
        fix_instructions: String::new(),
        impact: String::new(),
        affected_element: None,
        is_resolved: false,
        detected_at: 0,
        resolved_at: None,
    };
    let text = render_issue_listing(&[issue]);
    assert!(text.contains("HIGH"));
    assert!(text.contains("Missing title tag /about"));
    assert!(text.contains("Add a title"));
    assert!(text.contains("1 issue(s)"));
}

#[test]
fn test_render_keyword_listing() {
    no_colors();
    assert!(render_keyword_listing(&[]).contains("No keywords"));

    let keyword = KeywordRecord {
        site_id: 1,
        keyword: "widgets".to_string(),
        frequency: 12,
        density: 1.2,
        estimated_volume: 1000,
        estimated_difficulty: 40.0,
        estimated_ctr: 0.05,
        current_rank: None,
        target_rank: 3,
        rank_gap: 5,
        opportunity_score: 6.25,
        is_opportunity: false,
        page_urls: vec![],
    };
    let text = render_keyword_listing(&[keyword]);
    assert!(text.starts_with("KEYWORD"));
    let row = text.lines().nth(1).unwrap();
    assert!(row.starts_with("widgets"));
    assert!(row.contains("6.25"));
    assert!(row.contains("1000"));
    assert!(row.contains(" - "));
}
