// Tests for crawl orchestration against scripted sites

use seolens_core::config::{CrawlRequest, Settings};
use seolens_core::crawl::CrawlService;
use seolens_core::data::{Database, IssueFilter};
use seolens_core::model::{JobStatus, Severity};
use seolens_core::SeoError;
use seolens_scanner::{Replay, ReplayFetcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn create_test_db() -> (TempDir, Arc<Mutex<Database>>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, Arc::new(Mutex::new(db)))
}

fn service(db: Arc<Mutex<Database>>, fetcher: &ReplayFetcher, workers: usize) -> CrawlService {
    let settings = Settings {
        max_concurrent: workers,
        ..Settings::default()
    };
    CrawlService::new(db, Arc::new(fetcher.clone()), settings).unwrap()
}

fn request(url: &str) -> CrawlRequest {
    CrawlRequest {
        respect_robots: false,
        rate_limit_rps: Some(1000.0),
        ..CrawlRequest::new(url)
    }
}

fn page(title: &str, links: &[&str]) -> Replay {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">{}</a>", href, href))
        .collect();
    Replay::html(&format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1><p>widgets and gadgets</p>{}</body></html>",
        title, title, anchors
    ))
}

fn three_page_site() -> ReplayFetcher {
    ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/a", "/b"]))
        .with("https://s.test/a", page("Page A", &["/b"]))
        .with("https://s.test/b", page("Page B", &[]))
}

// ============================================================================
// Site Crawl Scenarios
// ============================================================================

#[tokio::test]
async fn test_three_page_site() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = three_page_site();
    let svc = service(db.clone(), &fetcher, 4);

    let mut req = request("https://s.test/");
    req.max_depth = 2;
    req.max_pages = 10;
    let ticket = svc.submit(&req).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages_crawled, 3);
    assert_eq!(job.pages_failed, 0);

    let db = db.lock().unwrap();
    let pages = db.list_pages(ticket.site_id).unwrap();
    assert_eq!(pages.len(), 3);

    let urls: HashMap<i64, String> = pages.iter().map(|p| (p.id, p.url.clone())).collect();
    let mut edges: Vec<(String, String)> = db
        .list_links(ticket.site_id)
        .unwrap()
        .into_iter()
        .map(|l| (urls[&l.source_page_id].clone(), l.target_url))
        .collect();
    edges.sort();
    assert_eq!(
        edges,
        vec![
            ("https://s.test/".to_string(), "https://s.test/a".to_string()),
            ("https://s.test/".to_string(), "https://s.test/b".to_string()),
            ("https://s.test/a".to_string(), "https://s.test/b".to_string()),
        ]
    );

    let site = db.get_site(ticket.site_id).unwrap().unwrap();
    assert_eq!(site.total_pages, 3);
    assert!(site.last_crawled.is_some());

    let b = db.get_page_by_url(ticket.site_id, "https://s.test/b").unwrap().unwrap();
    assert_eq!(b.inbound_links_count, 2);
    assert!(db.get_site_score(ticket.site_id).unwrap().is_some());
}

#[tokio::test]
async fn test_no_url_fetched_twice() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/a", "/a/", "/a#top", "/a?utm_source=x", "/"]))
        .with("https://s.test/a", page("Page A", &["/", "/a", "https://S.TEST/a/"]));
    let svc = service(db, &fetcher, 4);

    let ticket = svc.submit(&request("https://s.test/")).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();

    assert_eq!(job.pages_crawled, 2);
    assert_eq!(fetcher.calls("https://s.test/"), 1);
    assert_eq!(fetcher.calls("https://s.test/a"), 1);
    assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test]
async fn test_page_budget_is_respected() {
    let (_temp_dir, db) = create_test_db();
    let children: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
    let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();
    let mut fetcher = ReplayFetcher::new().with("https://s.test/", page("Home", &child_refs));
    for child in &children {
        fetcher = fetcher.with(&format!("https://s.test{}", child), page(child, &[]));
    }
    let svc = service(db.clone(), &fetcher, 4);

    let mut req = request("https://s.test/");
    req.max_pages = 3;
    let ticket = svc.submit(&req).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.pages_crawled + job.pages_failed <= 3);
    assert_eq!(fetcher.total_calls(), 3);
    assert_eq!(db.lock().unwrap().count_pages(ticket.site_id).unwrap(), 3);
}

#[tokio::test]
async fn test_breadth_first_order() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/a", "/b"]))
        .with("https://s.test/a", page("A", &["/c"]))
        .with("https://s.test/b", page("B", &["/d"]))
        .with("https://s.test/c", page("C", &[]))
        .with("https://s.test/d", page("D", &[]));
    let svc = service(db, &fetcher, 1);

    let ticket = svc.submit(&request("https://s.test/")).unwrap();
    svc.run(&ticket.job_id).await.unwrap();

    let depth = |url: &str| match url {
        "https://s.test/" => 0,
        "https://s.test/a" | "https://s.test/b" => 1,
        _ => 2,
    };
    let order = fetcher.fetch_order();
    assert_eq!(order.len(), 5);
    let depths: Vec<usize> = order.iter().map(|u| depth(u)).collect();
    let mut sorted = depths.clone();
    sorted.sort();
    assert_eq!(depths, sorted);
}

#[tokio::test]
async fn test_depth_limit() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/a"]))
        .with("https://s.test/a", page("A", &["/deep"]))
        .with("https://s.test/deep", page("Deep", &[]));
    let svc = service(db, &fetcher, 2);

    let mut req = request("https://s.test/");
    req.max_depth = 1;
    let ticket = svc.submit(&req).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();

    assert_eq!(job.pages_crawled, 2);
    assert_eq!(fetcher.calls("https://s.test/deep"), 0);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_unreachable_root_fails_job() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new();
    let svc = service(db.clone(), &fetcher, 2);

    let ticket = svc.submit(&request("https://down.test/")).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("root URL unreachable"), "{}", message);
    assert!(job.completed_at.is_some());

    let failures = db.lock().unwrap().list_failures(&ticket.job_id).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].status_code, Some(404));
}

#[tokio::test]
async fn test_page_failures_do_not_fail_job() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/ok", "/missing", "/boom"]))
        .with("https://s.test/ok", page("Ok", &[]))
        .with("https://s.test/boom", Replay::status(500));
    let svc = service(db.clone(), &fetcher, 2);

    let ticket = svc.submit(&request("https://s.test/")).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages_crawled, 2);
    assert_eq!(job.pages_failed, 2);

    let db = db.lock().unwrap();
    let broken: Vec<String> = db
        .list_links(ticket.site_id)
        .unwrap()
        .into_iter()
        .filter(|l| l.is_broken)
        .map(|l| l.target_url)
        .collect();
    assert_eq!(broken.len(), 2);

    let root_issues = db
        .list_issues(ticket.site_id, IssueFilter::default())
        .unwrap()
        .into_iter()
        .filter(|i| i.issue_type == "broken_outbound_links")
        .count();
    assert_eq!(root_issues, 1);
}

#[tokio::test]
async fn test_recrawl_marks_link_to_vanished_page_broken() {
    let (_temp_dir, db) = create_test_db();
    let first = ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/gone"]))
        .with("https://s.test/gone", page("Soon gone", &[]));
    let svc = service(db.clone(), &first, 2);
    let ticket = svc.submit(&request("https://s.test/")).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();
    assert_eq!(job.pages_crawled, 2);

    // Second crawl: the page row for /gone survives but the URL now answers 404
    let second = ReplayFetcher::new().with("https://s.test/", page("Home", &["/gone"]));
    let svc = service(db.clone(), &second, 2);
    let ticket = svc.submit(&request("https://s.test/")).unwrap();
    let job = svc.run(&ticket.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages_crawled, 1);
    assert_eq!(job.pages_failed, 1);
    assert_eq!(second.calls("https://s.test/gone"), 1);

    let db = db.lock().unwrap();
    let link = db
        .list_links(ticket.site_id)
        .unwrap()
        .into_iter()
        .find(|l| l.target_url == "https://s.test/gone")
        .unwrap();
    assert!(link.target_page_id.is_some());
    assert!(link.is_broken);

    let open_broken = db
        .list_issues(
            ticket.site_id,
            IssueFilter {
                resolved: Some(false),
                ..IssueFilter::default()
            },
        )
        .unwrap()
        .into_iter()
        .filter(|i| i.issue_type == "broken_outbound_links")
        .count();
    assert_eq!(open_broken, 1);
}

#[test]
fn test_invalid_request_creates_nothing() {
    let (_temp_dir, db) = create_test_db();
    let svc = service(db.clone(), &ReplayFetcher::new(), 2);

    let err = svc.submit(&CrawlRequest::new("mailto:someone@s.test")).unwrap_err();
    assert!(matches!(err, SeoError::Validation(_)));
    assert!(db.lock().unwrap().list_sites().unwrap().is_empty());
}

// ============================================================================
// Job Control Tests
// ============================================================================

#[tokio::test]
async fn test_cancel_running_job() {
    let (_temp_dir, db) = create_test_db();
    let children: Vec<String> = (0..10).map(|i| format!("/slow{}", i)).collect();
    let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();
    let mut fetcher = ReplayFetcher::new().with("https://s.test/", page("Home", &child_refs));
    for child in &children {
        fetcher = fetcher.with(
            &format!("https://s.test{}", child),
            page(child, &[]).delayed(Duration::from_millis(200)),
        );
    }
    let svc = service(db.clone(), &fetcher, 1);

    let (ticket, handle) = svc.start(&request("https://s.test/")).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(svc.cancel(&ticket.job_id).unwrap(), JobStatus::Cancelled);

    let job = handle.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_some());
    assert!(fetcher.total_calls() < 11);

    let stored = db.lock().unwrap().count_pages(ticket.site_id).unwrap();
    assert!(stored < 11);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/a", "/b"]))
        .with(
            "https://s.test/a",
            page("A", &[]).delayed(Duration::from_millis(100)),
        )
        .with(
            "https://s.test/b",
            page("B", &[]).delayed(Duration::from_millis(100)),
        );
    let svc = service(db, &fetcher, 1);

    let (ticket, handle) = svc.start(&request("https://s.test/")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(svc.pause(&ticket.job_id).unwrap(), JobStatus::Paused);
    assert_eq!(svc.job_status(&ticket.job_id).unwrap().status, JobStatus::Paused);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(fetcher.total_calls() < 3);

    assert_eq!(svc.resume(&ticket.job_id).unwrap(), JobStatus::Running);
    let job = handle.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages_crawled, 3);
}

// ============================================================================
// Analysis Tests
// ============================================================================

#[tokio::test]
async fn test_untitled_page_gets_high_missing_title() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new().with(
        "https://s.test/",
        Replay::html("<html><head></head><body><p>no title here</p></body></html>"),
    );
    let svc = service(db.clone(), &fetcher, 1);

    let ticket = svc.submit(&request("https://s.test/")).unwrap();
    svc.run(&ticket.job_id).await.unwrap();

    let db = db.lock().unwrap();
    let high = db
        .list_issues(
            ticket.site_id,
            IssueFilter {
                severity: Some(Severity::High),
                resolved: Some(false),
            },
        )
        .unwrap();
    assert!(high.iter().any(|i| i.issue_type == "missing_title"));
    assert!(high.iter().any(|i| i.issue_type == "missing_meta_description"));

    let page_id = db.get_page_id(ticket.site_id, "https://s.test/").unwrap().unwrap();
    let score = db.get_page_score(ticket.site_id, page_id).unwrap().unwrap();
    assert_eq!(score.breakdown["content"]["title"].value, 0.0);
    assert_eq!(score.breakdown["content"]["meta_description"].value, 0.0);
}

#[tokio::test]
async fn test_recrawl_is_idempotent_and_resolves_fixed_issues() {
    let (_temp_dir, db) = create_test_db();
    let broken = ReplayFetcher::new().with(
        "https://s.test/",
        Replay::html("<html><body><p>untitled</p></body></html>"),
    );
    let svc = service(db.clone(), &broken, 1);

    let first = svc.submit(&request("https://s.test/")).unwrap();
    svc.run(&first.job_id).await.unwrap();
    let before = db
        .lock()
        .unwrap()
        .list_issues(first.site_id, IssueFilter::default())
        .unwrap();

    let second = svc.submit(&request("https://s.test/")).unwrap();
    assert_eq!(second.site_id, first.site_id);
    svc.run(&second.job_id).await.unwrap();
    let after = db
        .lock()
        .unwrap()
        .list_issues(first.site_id, IssueFilter::default())
        .unwrap();
    let types = |issues: &[seolens_core::IssueRecord]| {
        let mut t: Vec<(String, bool)> = issues
            .iter()
            .map(|i| (i.issue_type.clone(), i.is_resolved))
            .collect();
        t.sort();
        t
    };
    assert_eq!(types(&before), types(&after));

    let fixed = ReplayFetcher::new().with(
        "https://s.test/",
        page("A perfectly reasonable page title", &[]),
    );
    let svc = service(db.clone(), &fixed, 1);
    let third = svc.submit(&request("https://s.test/")).unwrap();
    svc.run(&third.job_id).await.unwrap();

    let issues = db
        .lock()
        .unwrap()
        .list_issues(first.site_id, IssueFilter::default())
        .unwrap();
    let missing_title: Vec<_> = issues
        .iter()
        .filter(|i| i.issue_type == "missing_title")
        .collect();
    assert_eq!(missing_title.len(), 1);
    assert!(missing_title[0].is_resolved);
    assert!(missing_title[0].resolved_at.is_some());
}

#[tokio::test]
async fn test_keywords_computed_after_crawl() {
    let (_temp_dir, db) = create_test_db();
    let body = "widgets ".repeat(60);
    let fetcher = ReplayFetcher::new().with(
        "https://s.test/",
        Replay::html(&format!(
            "<html><head><title>Widgets</title></head><body><p>{}</p></body></html>",
            body
        )),
    );
    let svc = service(db.clone(), &fetcher, 1);

    let ticket = svc.submit(&request("https://s.test/")).unwrap();
    svc.run(&ticket.job_id).await.unwrap();

    let keywords = db
        .lock()
        .unwrap()
        .list_keywords(ticket.site_id, None, None)
        .unwrap();
    let widgets = keywords.iter().find(|k| k.keyword == "widgets").unwrap();
    assert!(widgets.frequency >= 60);
    assert_eq!(widgets.page_urls, vec!["https://s.test/"]);
    assert!(widgets.opportunity_score >= 0.0);

    assert_eq!(svc.refresh_keywords(ticket.site_id).unwrap(), keywords.len());
    assert!(matches!(
        svc.refresh_keywords(9999),
        Err(SeoError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_job_control_from_another_service() {
    let (_temp_dir, db) = create_test_db();
    let fetcher = ReplayFetcher::new()
        .with("https://s.test/", page("Home", &["/a", "/b"]))
        .with(
            "https://s.test/a",
            page("A", &[]).delayed(Duration::from_millis(100)),
        )
        .with(
            "https://s.test/b",
            page("B", &[]).delayed(Duration::from_millis(100)),
        );
    let crawling = service(db.clone(), &fetcher, 1);
    let controller = service(db, &ReplayFetcher::new(), 1);

    let (ticket, handle) = crawling.start(&request("https://s.test/")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(controller.cancel(&ticket.job_id).unwrap(), JobStatus::Cancelled);
    let seen = crawling.sync_control(&ticket.job_id).unwrap();
    assert_eq!(seen.status, JobStatus::Cancelled);

    let job = handle.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(fetcher.total_calls() < 3);
}
