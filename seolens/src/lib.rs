pub mod commands;
pub mod handlers;

// Re-export the helpers the binary and tests use directly
pub use handlers::{
    build_crawl_request, open_database, parse_issue_filter, render_issue_listing,
    render_job_status, render_keyword_listing, render_sites, resolve_db_path, short_path,
};
