// Site reports built from the database

use crate::data::{Database, IssueFilter};
use crate::error::{Result, SeoError};
use crate::model::{CrawlJob, IssueRecord, KeywordRecord, ScoreRecord, Severity, Site};
use seolens_scanner::normalize::site_domain;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const TOP_ISSUES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

/// Aggregate view of one site: latest score, open issues, keyword opportunities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteReport {
    pub site: Site,
    pub latest_job: Option<CrawlJob>,
    pub score: Option<ScoreRecord>,
    pub total_pages: i64,
    pub severity_counts: SeverityCounts,
    pub top_issues: Vec<IssueRecord>,
    pub top_keywords: Vec<KeywordRecord>,
}

/// Find a site by numeric id, domain, or any URL on it.
pub fn resolve_site(db: &Database, target: &str) -> Result<Site> {
    let target = target.trim();
    if let Ok(id) = target.parse::<i64>()
        && let Some(site) = db.get_site(id)?
    {
        return Ok(site);
    }
    let domain = if target.contains("://") {
        site_domain(target).unwrap_or_else(|| target.to_string())
    } else {
        target.trim_start_matches("www.").to_lowercase()
    };
    db.get_site_by_domain(&domain)?
        .ok_or_else(|| SeoError::NotFound(format!("site '{}'", target)))
}

pub fn gather_site_report(db: &Database, site_id: i64, keyword_limit: usize) -> Result<SiteReport> {
    let site = db
        .get_site(site_id)?
        .ok_or_else(|| SeoError::NotFound(format!("site {}", site_id)))?;

    let raw_counts = db.issue_counts(site_id)?;
    let count = |s: Severity| raw_counts.get(&s).copied().unwrap_or(0);
    let severity_counts = SeverityCounts {
        critical: count(Severity::Critical),
        high: count(Severity::High),
        medium: count(Severity::Medium),
        low: count(Severity::Low),
        info: count(Severity::Info),
    };

    let mut top_issues = db.list_issues(
        site_id,
        IssueFilter {
            severity: None,
            resolved: Some(false),
        },
    )?;
    top_issues.truncate(TOP_ISSUES);

    Ok(SiteReport {
        latest_job: db.list_jobs(site_id)?.into_iter().next(),
        score: db.get_site_score(site_id)?,
        total_pages: db.count_pages(site_id)?,
        severity_counts,
        top_issues,
        top_keywords: db.list_keywords(site_id, None, Some(keyword_limit))?,
        site,
    })
}

pub fn render_report(report: &SiteReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Markdown => Ok(generate_markdown_report(report)),
        ReportFormat::Json => Ok(generate_json_report(report)?),
    }
}

pub fn generate_text_report(data: &SiteReport) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                           SEOLENS SITE REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Site:         {}\n", data.site.domain));
    report.push_str(&format!("Root URL:     {}\n", data.site.root_url));
    report.push_str(&format!(
        "Last Crawled: {}\n",
        data.site
            .last_crawled
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string())
    ));
    report.push_str(&format!("Pages:        {}\n", data.total_pages));
    if let Some(ref job) = data.latest_job {
        report.push_str(&format!(
            "Latest Job:   {} ({}, {} crawled, {} failed)\n",
            job.id, job.status, job.pages_crawled, job.pages_failed
        ));
        if let Some(ref message) = job.error_message {
            report.push_str(&format!("Error:        {}\n", message));
        }
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str("SCORES\n");
    report.push_str(RULE);
    report.push('\n');
    match data.score {
        Some(ref score) => {
            report.push_str(&format!("  Overall        {:>6.1}\n", score.overall));
            report.push_str(&format!("  Technical      {:>6.1}\n", score.dimensions.technical));
            report.push_str(&format!("  Content        {:>6.1}\n", score.dimensions.content));
            report.push_str(&format!("  Authority      {:>6.1}\n", score.dimensions.authority));
            report.push_str(&format!("  Linking        {:>6.1}\n", score.dimensions.linking));
            report.push_str(&format!(
                "  AI Visibility  {:>6.1}\n",
                score.dimensions.ai_visibility
            ));
        }
        None => report.push_str("  No score computed yet.\n"),
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str("ISSUES\n");
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&format!(
        "Open Issues: {}\n\n",
        data.severity_counts.total()
    ));
    for severity in Severity::ALL {
        let count = data.severity_counts.get(severity);
        if count > 0 {
            report.push_str(&format!(
                "  {:<10} {}\n",
                format!("[{}]", severity.as_str().to_uppercase()),
                count
            ));
        }
    }
    report.push('\n');
    for (idx, issue) in data.top_issues.iter().enumerate() {
        report.push_str(&format!("[{}] {}\n", idx + 1, issue.title));
        report.push_str(&format!("Severity:     {}\n", issue.severity.as_str().to_uppercase()));
        report.push_str(&format!("Type:         {}\n", issue.issue_type));
        report.push_str(&format!(
            "Page:         {}\n",
            issue.page_url.as_deref().unwrap_or("(site-wide)")
        ));
        report.push_str("Recommendation:\n");
        report.push_str(&wrap_text(&issue.recommendation, 80, "  "));
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("KEYWORD OPPORTUNITIES\n");
    report.push_str(RULE);
    report.push('\n');
    if data.top_keywords.is_empty() {
        report.push_str("  No keywords yet.\n");
    }
    for keyword in &data.top_keywords {
        report.push_str(&format!(
            "  {:<30} score {:>8.2}  volume {:>6}  rank {:>3} -> {}{}\n",
            keyword.keyword,
            keyword.opportunity_score,
            keyword.estimated_volume,
            keyword
                .current_rank
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            keyword.target_rank,
            if keyword.is_opportunity { "  *" } else { "" }
        ));
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str("                              End of Report\n");
    report.push_str(RULE);
    report
}

pub fn generate_markdown_report(data: &SiteReport) -> String {
    let mut md = String::new();
    md.push_str(&format!("# SEO report: {}\n\n", data.site.domain));
    md.push_str(&format!("- **Root URL:** {}\n", data.site.root_url));
    md.push_str(&format!("- **Pages:** {}\n", data.total_pages));
    if let Some(ts) = data.site.last_crawled {
        md.push_str(&format!("- **Last crawled:** {}\n", format_timestamp(ts)));
    }
    if let Some(ref job) = data.latest_job {
        md.push_str(&format!("- **Latest job:** `{}` ({})\n", job.id, job.status));
    }

    md.push_str("\n## Scores\n\n");
    if let Some(ref score) = data.score {
        md.push_str("| Dimension | Score |\n|---|---:|\n");
        md.push_str(&format!("| Overall | {:.1} |\n", score.overall));
        md.push_str(&format!("| Technical | {:.1} |\n", score.dimensions.technical));
        md.push_str(&format!("| Content | {:.1} |\n", score.dimensions.content));
        md.push_str(&format!("| Authority | {:.1} |\n", score.dimensions.authority));
        md.push_str(&format!("| Linking | {:.1} |\n", score.dimensions.linking));
        md.push_str(&format!(
            "| AI visibility | {:.1} |\n",
            score.dimensions.ai_visibility
        ));
    } else {
        md.push_str("_No score computed yet._\n");
    }

    md.push_str("\n## Issues\n\n");
    md.push_str("| Severity | Open |\n|---|---:|\n");
    for severity in Severity::ALL {
        md.push_str(&format!(
            "| {} | {} |\n",
            severity,
            data.severity_counts.get(severity)
        ));
    }
    if !data.top_issues.is_empty() {
        md.push('\n');
        for issue in &data.top_issues {
            md.push_str(&format!(
                "- **{}** `{}` {} ({})\n",
                issue.severity.as_str().to_uppercase(),
                issue.issue_type,
                issue.title,
                issue.page_url.as_deref().unwrap_or("site-wide")
            ));
        }
    }

    md.push_str("\n## Keyword opportunities\n\n");
    if data.top_keywords.is_empty() {
        md.push_str("_No keywords yet._\n");
    } else {
        md.push_str("| Keyword | Score | Volume | Difficulty | Rank | Opportunity |\n");
        md.push_str("|---|---:|---:|---:|---:|:---:|\n");
        for k in &data.top_keywords {
            md.push_str(&format!(
                "| {} | {:.2} | {} | {:.0} | {} | {} |\n",
                k.keyword,
                k.opportunity_score,
                k.estimated_volume,
                k.estimated_difficulty,
                k.current_rank
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                if k.is_opportunity { "yes" } else { "" }
            ));
        }
    }
    md
}

pub fn generate_json_report(data: &SiteReport) -> std::result::Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Seolens",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "site": data.site,
            "latest_job": data.latest_job,
            "summary": {
                "total_pages": data.total_pages,
                "open_issues": data.severity_counts.total(),
                "severity_breakdown": data.severity_counts,
            },
            "score": data.score,
            "top_issues": data.top_issues,
            "top_keywords": data.top_keywords,
        }
    });
    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn format_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.len() + word.len() + 1 > width - indent.len() && !current_line.is_empty() {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }
        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(ReportFormat::parse("MD"), Some(ReportFormat::Markdown));
        assert_eq!(ReportFormat::parse("json"), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::parse("pdf"), None);
    }

    #[test]
    fn test_wrap_text() {
        let wrapped = wrap_text("one two three four", 12, "  ");
        assert_eq!(wrapped, "  one two\n  three four\n");
    }
}
