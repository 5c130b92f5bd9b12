pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod frontier;
pub mod links;
pub mod normalize;
pub mod rate_limit;
#[cfg(any(test, feature = "testing"))]
pub mod replay;
pub mod result;
pub mod robots;
pub mod sitemap;

pub use crawler::{
    CrawlControl, CrawlFailure, CrawlOptions, CrawlSink, CrawlStats, CrawlSummary, CrawledPage,
    Crawler,
};
pub use error::ScanError;
pub use extract::{Headings, PageSignals, RawLink};
pub use fetcher::{Fetcher, HttpFetcher};
pub use links::{ClassifiedLinks, OutboundLink};
pub use rate_limit::RateLimiter;
#[cfg(any(test, feature = "testing"))]
pub use replay::{Replay, ReplayFetcher};
pub use result::FetchResponse;
