pub mod config;
pub mod crawl;
pub mod data;
pub mod error;
pub mod issues;
pub mod keywords;
pub mod link_graph;
pub mod model;
pub mod report;
pub mod scoring;

pub use config::{CrawlRequest, ScoreWeights, Settings};
pub use crawl::{CrawlService, JobTicket};
pub use data::Database;
pub use error::{Result, SeoError};
pub use model::{CrawlJob, IssueRecord, JobStatus, KeywordRecord, ScoreRecord, Severity, Site};

const BANNER: &str = r#"
                 _
  ___  ___  ___ | | ___ _ __  ___
 / __|/ _ \/ _ \| |/ _ \ '_ \/ __|
 \__ \  __/ (_) | |  __/ | | \__ \
 |___/\___|\___/|_|\___|_| |_|___/
"#;

pub fn print_banner() {
    println!("{}", BANNER);
    println!(
        "  crawl, score and find keyword opportunities  v{}\n",
        env!("CARGO_PKG_VERSION")
    );
}
