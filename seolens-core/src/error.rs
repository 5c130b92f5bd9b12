use seolens_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeoError {
    #[error("Invalid crawl request: {0}")]
    Validation(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] ScanError),

    #[error("Crawl job failed: {0}")]
    JobFatal(String),

    #[error("Timed out waiting for a rate limit token on {0}")]
    RateLimitTimeout(String),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SeoError>;
