use crate::error::{Result, SeoError};
use seolens_scanner::PageSignals;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl FromStr for Severity {
    type Err = SeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(SeoError::Validation(format!("unknown severity '{}'", other))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a crawl job.
///
/// ```text
/// pending -> running -> completed | failed | cancelled
///            running <-> paused
/// ```
/// A paused job may also be cancelled, fail, or complete once its page budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Completed)
                | (Paused, Cancelled)
                | (Paused, Failed)
        )
    }

    pub fn transition(self, next: JobStatus) -> Result<JobStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SeoError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl FromStr for JobStatus {
    type Err = SeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(SeoError::Internal(format!("unknown job status '{}'", other))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub domain: String,
    pub root_url: String,
    pub sitemap_url: Option<String>,
    pub last_crawled: Option<i64>,
    pub total_pages: i64,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: String,
    pub site_id: i64,
    pub status: JobStatus,
    pub max_depth: usize,
    pub max_pages: usize,
    pub use_js_rendering: bool,
    pub respect_robots: bool,
    pub rate_limit_rps: f64,
    pub pages_crawled: usize,
    pub pages_failed: usize,
    pub pages_queued: usize,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
}

/// A persisted page. `signals` holds the full extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: i64,
    pub site_id: i64,
    pub crawl_job_id: Option<String>,
    pub url: String,
    pub depth: usize,
    pub internal_links_count: usize,
    pub external_links_count: usize,
    pub inbound_links_count: usize,
    pub signals: PageSignals,
    pub crawled_at: i64,
}

impl PageRecord {
    pub fn status_code(&self) -> u16 {
        self.signals.status_code
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: i64,
    pub site_id: i64,
    pub source_page_id: i64,
    pub target_url: String,
    pub target_page_id: Option<i64>,
    pub anchor_text: String,
    pub is_internal: bool,
    pub is_nofollow: bool,
    pub is_broken: bool,
}

/// One scoring factor. For site scores `value` is the average over pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorScore {
    #[serde(alias = "avg_score")]
    pub value: f64,
    pub max: f64,
    pub percentage: f64,
}

impl FactorScore {
    pub fn new(value: f64, max: f64) -> Self {
        let percentage = if max > 0.0 {
            round1(value / max * 100.0)
        } else {
            0.0
        };
        Self {
            value: round1(value),
            max,
            percentage,
        }
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// dimension -> factor -> score
pub type Breakdown = BTreeMap<String, BTreeMap<String, FactorScore>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionScores {
    pub technical: f64,
    pub content: f64,
    pub authority: f64,
    pub linking: f64,
    pub ai_visibility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub site_id: i64,
    /// `None` for the site-level score.
    pub page_id: Option<i64>,
    pub dimensions: DimensionScores,
    pub overall: f64,
    pub breakdown: Breakdown,
    pub computed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: i64,
    pub site_id: i64,
    pub page_id: Option<i64>,
    pub page_url: Option<String>,
    pub issue_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub fix_instructions: String,
    pub impact: String,
    pub affected_element: Option<String>,
    pub is_resolved: bool,
    pub detected_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub site_id: i64,
    pub keyword: String,
    pub frequency: u64,
    pub density: f64,
    pub estimated_volume: u64,
    pub estimated_difficulty: f64,
    pub estimated_ctr: f64,
    pub current_rank: Option<u32>,
    pub target_rank: u32,
    pub rank_gap: i64,
    pub opportunity_score: f64,
    pub is_opportunity: bool,
    pub page_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub job_id: String,
    pub url: String,
    pub depth: usize,
    pub status_code: Option<u16>,
    pub reason: String,
    pub failed_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_transitions() {
        assert_eq!(
            JobStatus::Pending.transition(JobStatus::Running).unwrap(),
            JobStatus::Running
        );
        assert!(JobStatus::Running.can_transition_to(JobStatus::Paused));
        assert!(JobStatus::Paused.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));

        let err = JobStatus::Cancelled
            .transition(JobStatus::Running)
            .unwrap_err();
        assert!(matches!(err, SeoError::InvalidTransition { .. }));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
    }

    #[test]
    fn test_severity_roundtrip_and_order() {
        for severity in Severity::ALL {
            assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
        }
        assert!(Severity::Critical < Severity::Info);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_factor_score_percentage() {
        let factor = FactorScore::new(7.0, 10.0);
        assert_eq!(factor.percentage, 70.0);
        assert_eq!(FactorScore::new(0.0, 0.0).percentage, 0.0);
    }

    #[test]
    fn test_factor_score_reads_avg_score_key() {
        let factor: FactorScore =
            serde_json::from_str(r#"{"avg_score": 4.5, "max": 10, "percentage": 45, "x": 1}"#).unwrap();
        assert_eq!(factor.value, 4.5);
    }
}
