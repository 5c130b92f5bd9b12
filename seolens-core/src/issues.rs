// Rule-based SEO issue detection and reconciliation

use crate::data::{Database, NewIssue};
use crate::error::Result;
use crate::model::Severity;
use seolens_scanner::PageSignals;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const SLOW_LOAD_MS: u64 = 3000;
pub const THIN_CONTENT_WORDS: usize = 300;
pub const VERY_THIN_CONTENT_WORDS: usize = 150;

/// Everything a page rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct PageFacts<'a> {
    pub signals: &'a PageSignals,
    pub internal_links: usize,
    pub inbound_links: usize,
    pub broken_outbound: usize,
    pub is_orphan: bool,
}

impl<'a> PageFacts<'a> {
    pub fn new(signals: &'a PageSignals) -> Self {
        Self {
            signals,
            internal_links: 0,
            inbound_links: 0,
            broken_outbound: 0,
            is_orphan: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageRule {
    MissingTitle,
    TitleTooLong,
    TitleTooShort,
    MissingMetaDescription,
    MetaDescriptionTooLong,
    MissingH1,
    MultipleH1,
    ThinContent,
    VeryThinContent,
    ImagesMissingAlt,
    NotHttps,
    MissingViewport,
    SlowPageLoad,
    MissingSchema,
    MissingOpenGraph,
    NoInternalLinks,
    NoindexPage,
    CanonicalMismatch,
    BrokenOutboundLinks,
    OrphanPage,
}

impl PageRule {
    pub const ALL: [PageRule; 20] = [
        PageRule::MissingTitle,
        PageRule::TitleTooLong,
        PageRule::TitleTooShort,
        PageRule::MissingMetaDescription,
        PageRule::MetaDescriptionTooLong,
        PageRule::MissingH1,
        PageRule::MultipleH1,
        PageRule::ThinContent,
        PageRule::VeryThinContent,
        PageRule::ImagesMissingAlt,
        PageRule::NotHttps,
        PageRule::MissingViewport,
        PageRule::SlowPageLoad,
        PageRule::MissingSchema,
        PageRule::MissingOpenGraph,
        PageRule::NoInternalLinks,
        PageRule::NoindexPage,
        PageRule::CanonicalMismatch,
        PageRule::BrokenOutboundLinks,
        PageRule::OrphanPage,
    ];

    pub fn issue_type(&self) -> &'static str {
        match self {
            PageRule::MissingTitle => "missing_title",
            PageRule::TitleTooLong => "title_too_long",
            PageRule::TitleTooShort => "title_too_short",
            PageRule::MissingMetaDescription => "missing_meta_description",
            PageRule::MetaDescriptionTooLong => "meta_description_too_long",
            PageRule::MissingH1 => "missing_h1",
            PageRule::MultipleH1 => "multiple_h1",
            PageRule::ThinContent => "thin_content",
            PageRule::VeryThinContent => "very_thin_content",
            PageRule::ImagesMissingAlt => "images_missing_alt",
            PageRule::NotHttps => "not_https",
            PageRule::MissingViewport => "missing_viewport",
            PageRule::SlowPageLoad => "slow_page_load",
            PageRule::MissingSchema => "missing_schema",
            PageRule::MissingOpenGraph => "missing_open_graph",
            PageRule::NoInternalLinks => "no_internal_links",
            PageRule::NoindexPage => "noindex_page",
            PageRule::CanonicalMismatch => "canonical_mismatch",
            PageRule::BrokenOutboundLinks => "broken_outbound_links",
            PageRule::OrphanPage => "orphan_page",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PageRule::NotHttps => Severity::Critical,
            PageRule::MissingTitle
            | PageRule::MissingMetaDescription
            | PageRule::MissingH1
            | PageRule::VeryThinContent
            | PageRule::MissingViewport
            | PageRule::SlowPageLoad
            | PageRule::BrokenOutboundLinks => Severity::High,
            PageRule::TitleTooLong
            | PageRule::TitleTooShort
            | PageRule::MultipleH1
            | PageRule::ThinContent
            | PageRule::ImagesMissingAlt
            | PageRule::MissingSchema
            | PageRule::NoInternalLinks
            | PageRule::OrphanPage => Severity::Medium,
            PageRule::MetaDescriptionTooLong
            | PageRule::MissingOpenGraph
            | PageRule::CanonicalMismatch => Severity::Low,
            PageRule::NoindexPage => Severity::Info,
        }
    }

    fn matches(&self, facts: &PageFacts) -> bool {
        let s = facts.signals;
        match self {
            PageRule::MissingTitle => !s.has_title(),
            PageRule::TitleTooLong => s.has_title() && s.title_length > 60,
            PageRule::TitleTooShort => s.has_title() && s.title_length < 30,
            PageRule::MissingMetaDescription => !s.has_meta_description(),
            PageRule::MetaDescriptionTooLong => {
                s.has_meta_description() && s.meta_description_length > 160
            }
            PageRule::MissingH1 => s.headings.h1.is_empty(),
            PageRule::MultipleH1 => s.headings.h1.len() > 1,
            PageRule::ThinContent => {
                s.is_indexable
                    && (VERY_THIN_CONTENT_WORDS..THIN_CONTENT_WORDS).contains(&s.word_count)
            }
            PageRule::VeryThinContent => s.is_indexable && s.word_count < VERY_THIN_CONTENT_WORDS,
            PageRule::ImagesMissingAlt => s.images_missing_alt > 0,
            PageRule::NotHttps => !s.is_https,
            PageRule::MissingViewport => !s.has_viewport,
            PageRule::SlowPageLoad => s.load_time_ms > SLOW_LOAD_MS,
            PageRule::MissingSchema => !s.has_schema(),
            PageRule::MissingOpenGraph => !s.has_open_graph,
            PageRule::NoInternalLinks => facts.internal_links == 0 && s.word_count > 100,
            PageRule::NoindexPage => !s.is_indexable,
            PageRule::CanonicalMismatch => s.canonical_mismatch,
            PageRule::BrokenOutboundLinks => facts.broken_outbound > 0,
            PageRule::OrphanPage => facts.is_orphan,
        }
    }

    fn describe(&self, facts: &PageFacts) -> NewIssue {
        let s = facts.signals;
        let title = s.title.as_deref().unwrap_or_default();
        let (heading, description, recommendation, fix, impact, element): (
            String,
            String,
            &str,
            String,
            &str,
            Option<String>,
        ) = match self {
            PageRule::MissingTitle => (
                "Missing title tag".into(),
                "This page has no <title> tag.".into(),
                "Add a unique, descriptive title of 30-60 characters with the primary keyword.",
                "Add <title>Primary Keyword - Brand</title> inside <head>.".into(),
                "Pages without a title rank poorly and show an auto-generated SERP heading.",
                Some("<title>".into()),
            ),
            PageRule::TitleTooLong => (
                format!("Title too long ({} characters)", s.title_length),
                format!(
                    "The title is {} characters. Search results truncate titles past 60 characters.",
                    s.title_length
                ),
                "Shorten the title to 30-60 characters and keep the primary keyword first.",
                format!("Current title: '{}'.", title),
                "A title that displays in full earns more clicks.",
                Some(format!("<title>{}</title>", title)),
            ),
            PageRule::TitleTooShort => (
                format!("Title too short ({} characters)", s.title_length),
                "Short titles waste SERP space and miss keyword context.".into(),
                "Expand the title to 30-60 characters with descriptive keywords.",
                format!("Current title: '{}'.", title),
                "Descriptive titles improve relevance and click-through.",
                Some(format!("<title>{}</title>", title)),
            ),
            PageRule::MissingMetaDescription => (
                "Missing meta description".into(),
                "No meta description was found; search engines will improvise a snippet.".into(),
                "Write a meta description of 150-160 characters with a call to action.",
                "Add <meta name=\"description\" content=\"...\"> inside <head>.".into(),
                "The description is the SERP snippet and drives click-through.",
                Some("<meta name=\"description\">".into()),
            ),
            PageRule::MetaDescriptionTooLong => (
                format!(
                    "Meta description too long ({} characters)",
                    s.meta_description_length
                ),
                "Descriptions past 160 characters are truncated in search results.".into(),
                "Trim the description to 150-160 characters, most important words first.",
                format!(
                    "Current length is {}. Cut it below 160.",
                    s.meta_description_length
                ),
                "A complete snippet shows the full value proposition.",
                Some("<meta name=\"description\">".into()),
            ),
            PageRule::MissingH1 => (
                "Missing H1 heading".into(),
                "No H1 heading was found. The H1 is the main topic signal of a page.".into(),
                "Add exactly one H1 that contains the primary keyword.",
                "Add <h1>Primary Keyword</h1> as the main heading.".into(),
                "Without an H1 the page topic is less clear to search engines.",
                Some("<h1>".into()),
            ),
            PageRule::MultipleH1 => (
                format!("Multiple H1 headings ({} found)", s.headings.h1.len()),
                format!(
                    "Found {} H1 headings where one is expected.",
                    s.headings.h1.len()
                ),
                "Keep one H1 and demote the others to H2-H6.",
                format!(
                    "H1 headings: {}.",
                    s.headings
                        .h1
                        .iter()
                        .take(3)
                        .map(|h| format!("'{}'", h))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                "Several H1s dilute the topic signal.",
                Some("<h1>".into()),
            ),
            PageRule::ThinContent | PageRule::VeryThinContent => (
                format!("Thin content ({} words)", s.word_count),
                format!(
                    "The page has {} words. Pages under {} words struggle to rank.",
                    s.word_count, THIN_CONTENT_WORDS
                ),
                "Expand the content to at least 800 useful words, or consolidate the page.",
                "Answer the questions searchers ask, add examples and data, and aim for 800-2000 words on competitive topics.".into(),
                "Content depth correlates strongly with ranking ability.",
                Some("page body".into()),
            ),
            PageRule::ImagesMissingAlt => (
                format!("{} images missing alt text", s.images_missing_alt),
                format!(
                    "{} of {} images have no alt attribute.",
                    s.images_missing_alt, s.images_total
                ),
                "Give every meaningful image a descriptive alt attribute.",
                "Add alt=\"...\" to each <img>; use alt=\"\" for decorative images.".into(),
                "Alt text drives image search and accessibility.",
                Some("<img>".into()),
            ),
            PageRule::NotHttps => (
                "Page not served over HTTPS".into(),
                format!("{} is served over plain HTTP.", s.url),
                "Serve the page over HTTPS and redirect HTTP to it.",
                "Install a TLS certificate, add a 301 redirect from HTTP, and update internal links, canonicals and the sitemap.".into(),
                "HTTPS is a ranking signal and a trust requirement.",
                Some("URL scheme".into()),
            ),
            PageRule::MissingViewport => (
                "Missing viewport meta tag".into(),
                "Without a viewport tag the page is not mobile friendly.".into(),
                "Declare a responsive viewport.",
                "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"> inside <head>.".into(),
                "Mobile friendliness is a major ranking factor.",
                Some("<meta name=\"viewport\">".into()),
            ),
            PageRule::SlowPageLoad => (
                format!("Slow page load ({}ms)", s.load_time_ms),
                format!(
                    "The page took {}ms to load; aim for under 2500ms.",
                    s.load_time_ms
                ),
                "Compress images, minify assets, enable caching and use a CDN.",
                "Serve WebP images, enable gzip or brotli, minify CSS/JS, cache static assets and cut server response time.".into(),
                "Page speed is a ranking factor and shapes user experience.",
                Some("page load".into()),
            ),
            PageRule::MissingSchema => (
                "No structured data".into(),
                "No schema.org markup was found on the page.".into(),
                "Add JSON-LD markup for the page type (Article, Product, FAQPage...).",
                "Add a <script type=\"application/ld+json\"> block and validate it with a rich results test.".into(),
                "Structured data unlocks rich results.",
                Some("<script type=\"application/ld+json\">".into()),
            ),
            PageRule::MissingOpenGraph => (
                "Missing Open Graph tags".into(),
                "No og: meta tags were found; social shares will look generic.".into(),
                "Add og:title, og:description, og:image and og:url.",
                "Add <meta property=\"og:title\" content=\"...\"> and friends inside <head>.".into(),
                "Better share previews drive referral traffic.",
                Some("Open Graph meta tags".into()),
            ),
            PageRule::NoInternalLinks => (
                "No outgoing internal links".into(),
                "The page links to no other page of the site.".into(),
                "Add 3-5 contextual links to related pages.",
                "Link related pages with descriptive anchor text rather than 'click here'.".into(),
                "Internal links spread authority and help crawlers.",
                Some("<a href>".into()),
            ),
            PageRule::NoindexPage => (
                "Page excluded from indexing".into(),
                format!(
                    "The robots meta tag ({}) keeps this page out of the index.",
                    s.meta_robots.as_deref().unwrap_or("noindex")
                ),
                "Confirm the page is meant to be hidden from search.",
                "Remove noindex from <meta name=\"robots\"> if the page should rank.".into(),
                "Noindexed pages receive no organic traffic.",
                Some("<meta name=\"robots\">".into()),
            ),
            PageRule::CanonicalMismatch => (
                "Canonical points elsewhere".into(),
                format!(
                    "The canonical URL {} differs from the page URL.",
                    s.canonical_url.as_deref().unwrap_or_default()
                ),
                "Point the canonical at this page unless it is a deliberate duplicate.",
                "Set <link rel=\"canonical\"> to the page's own URL.".into(),
                "A foreign canonical asks search engines to index another URL instead.",
                Some("<link rel=\"canonical\">".into()),
            ),
            PageRule::BrokenOutboundLinks => (
                format!("{} broken links", facts.broken_outbound),
                format!(
                    "{} links on this page point at URLs that failed to load.",
                    facts.broken_outbound
                ),
                "Fix or remove links to failing URLs.",
                "Update each broken href to a live page or drop the link.".into(),
                "Broken links waste crawl budget and frustrate visitors.",
                Some("<a href>".into()),
            ),
            PageRule::OrphanPage => (
                "Orphan page".into(),
                "No crawled page links to this page.".into(),
                "Link to this page from related content or navigation.",
                "Add at least one contextual internal link pointing here.".into(),
                "Orphan pages are hard to discover and receive no internal authority.",
                None,
            ),
        };

        NewIssue {
            issue_type: self.issue_type().to_string(),
            severity: self.severity(),
            title: heading,
            description,
            recommendation: recommendation.to_string(),
            fix_instructions: fix,
            impact: impact.to_string(),
            affected_element: element,
        }
    }
}

/// Evaluate every page rule. Rules are independent, so order does not matter.
pub fn detect_page_issues(facts: &PageFacts) -> Vec<NewIssue> {
    PageRule::ALL
        .iter()
        .filter(|rule| rule.matches(facts))
        .map(|rule| rule.describe(facts))
        .collect()
}

/// Aggregate counts over a site's pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteFacts {
    pub total_pages: usize,
    pub missing_title: usize,
    pub missing_meta: usize,
    pub thin_content: usize,
    pub missing_schema: usize,
    pub not_https: usize,
}

impl SiteFacts {
    pub fn from_pages<'a, I>(pages: I) -> Self
    where
        I: IntoIterator<Item = &'a PageSignals>,
    {
        let mut facts = SiteFacts::default();
        for page in pages {
            facts.total_pages += 1;
            facts.missing_title += usize::from(!page.has_title());
            facts.missing_meta += usize::from(!page.has_meta_description());
            facts.thin_content += usize::from(page.word_count < THIN_CONTENT_WORDS);
            facts.missing_schema += usize::from(!page.has_schema());
            facts.not_https += usize::from(!page.is_https);
        }
        facts
    }

    fn pct(&self, count: usize) -> f64 {
        if self.total_pages == 0 {
            0.0
        } else {
            count as f64 / self.total_pages as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteRule {
    HttpsMixed,
    MissingTitlesBulk,
    MissingMetaBulk,
    ThinContentBulk,
    MissingSchemaBulk,
}

impl SiteRule {
    pub const ALL: [SiteRule; 5] = [
        SiteRule::HttpsMixed,
        SiteRule::MissingTitlesBulk,
        SiteRule::MissingMetaBulk,
        SiteRule::ThinContentBulk,
        SiteRule::MissingSchemaBulk,
    ];

    pub fn issue_type(&self) -> &'static str {
        match self {
            SiteRule::HttpsMixed => "https_mixed",
            SiteRule::MissingTitlesBulk => "missing_titles_bulk",
            SiteRule::MissingMetaBulk => "missing_meta_bulk",
            SiteRule::ThinContentBulk => "thin_content_bulk",
            SiteRule::MissingSchemaBulk => "missing_schema_bulk",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SiteRule::HttpsMixed | SiteRule::MissingTitlesBulk => Severity::Critical,
            SiteRule::MissingMetaBulk | SiteRule::ThinContentBulk => Severity::High,
            SiteRule::MissingSchemaBulk => Severity::Medium,
        }
    }

    fn matches(&self, f: &SiteFacts) -> bool {
        if f.total_pages == 0 {
            return false;
        }
        match self {
            SiteRule::HttpsMixed => f.not_https > 0,
            SiteRule::MissingTitlesBulk => f.pct(f.missing_title) > 5.0,
            SiteRule::MissingMetaBulk => f.pct(f.missing_meta) > 10.0,
            SiteRule::ThinContentBulk => f.pct(f.thin_content) > 30.0,
            SiteRule::MissingSchemaBulk => f.pct(f.missing_schema) > 80.0,
        }
    }

    fn describe(&self, f: &SiteFacts) -> NewIssue {
        let (count, title, description, recommendation, fix, impact) = match self {
            SiteRule::HttpsMixed => (
                f.not_https,
                format!("{} pages not served over HTTPS", f.not_https),
                format!(
                    "{} of {} pages use plain HTTP.",
                    f.not_https, f.total_pages
                ),
                "Move the whole site to HTTPS with 301 redirects from HTTP.",
                "Install a certificate, redirect all HTTP traffic, then update internal links and the sitemap.",
                "HTTPS is a direct ranking signal.",
            ),
            SiteRule::MissingTitlesBulk => (
                f.missing_title,
                format!(
                    "{} pages missing title tags ({:.0}%)",
                    f.missing_title,
                    f.pct(f.missing_title)
                ),
                "Title tags are among the most important on-page factors.".to_string(),
                "Give every page a unique, descriptive title.",
                "List the pages without titles and write 30-60 character titles led by the primary keyword.",
                "Titles drive both rankings and click-through.",
            ),
            SiteRule::MissingMetaBulk => (
                f.missing_meta,
                format!(
                    "{} pages missing meta descriptions ({:.0}%)",
                    f.missing_meta,
                    f.pct(f.missing_meta)
                ),
                "Meta descriptions shape the search snippet of each page.".to_string(),
                "Write a unique meta description for every important page.",
                "Write 150-160 character descriptions with the target keyword and a call to action.",
                "Better snippets raise organic click-through.",
            ),
            SiteRule::ThinContentBulk => (
                f.thin_content,
                format!(
                    "{} pages have thin content (<{} words)",
                    f.thin_content, THIN_CONTENT_WORDS
                ),
                format!(
                    "{} of {} pages have fewer than {} words.",
                    f.thin_content, f.total_pages, THIN_CONTENT_WORDS
                ),
                "Expand valuable thin pages and consolidate or noindex the rest.",
                "Find thin pages with search value, grow them past 800 words and merge near-duplicates.",
                "Thin content across a site drags down its quality signals.",
            ),
            SiteRule::MissingSchemaBulk => (
                f.missing_schema,
                "Most pages lack structured data".to_string(),
                format!(
                    "Only {} of {} pages carry schema markup.",
                    f.total_pages - f.missing_schema,
                    f.total_pages
                ),
                "Roll out schema.org markup across page templates.",
                "Add Organization or WebSite markup to the home page, Article to posts and BreadcrumbList site-wide.",
                "Rich results improve visibility and click-through.",
            ),
        };
        NewIssue {
            issue_type: self.issue_type().to_string(),
            severity: self.severity(),
            title,
            description,
            recommendation: recommendation.to_string(),
            fix_instructions: fix.to_string(),
            impact: impact.to_string(),
            affected_element: Some(format!("{} pages", count)),
        }
    }
}

pub fn detect_site_issues(facts: &SiteFacts) -> Vec<NewIssue> {
    SiteRule::ALL
        .iter()
        .filter(|rule| rule.matches(facts))
        .map(|rule| rule.describe(facts))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub inserted: usize,
    pub refreshed: usize,
    pub reopened: usize,
    pub resolved: usize,
}

/// Bring the stored issues of one page (or the site, for `None`) in line with a
/// fresh detection run. Issues are matched by type: new matches are inserted,
/// held matches are refreshed (resolved ones reopened in place), and open issues
/// that no longer match are resolved.
pub fn reconcile(
    db: &Database,
    site_id: i64,
    page_id: Option<i64>,
    detected: &[NewIssue],
) -> Result<Reconciliation> {
    let existing = db.issues_for_page(site_id, page_id)?;
    let by_type: HashMap<&str, _> = existing
        .iter()
        .map(|issue| (issue.issue_type.as_str(), issue))
        .collect();

    let mut outcome = Reconciliation::default();
    let mut seen = HashSet::new();
    for issue in detected {
        if !seen.insert(issue.issue_type.as_str()) {
            continue;
        }
        match by_type.get(issue.issue_type.as_str()) {
            Some(stored) => {
                db.refresh_issue(stored.id, issue)?;
                if stored.is_resolved {
                    outcome.reopened += 1;
                } else {
                    outcome.refreshed += 1;
                }
            }
            None => {
                db.insert_issue(site_id, page_id, issue)?;
                outcome.inserted += 1;
            }
        }
    }

    for stored in &existing {
        if !stored.is_resolved && !seen.contains(stored.issue_type.as_str()) {
            db.resolve_issue(stored.id)?;
            outcome.resolved += 1;
        }
    }

    debug!(
        site_id,
        ?page_id,
        inserted = outcome.inserted,
        reopened = outcome.reopened,
        resolved = outcome.resolved,
        "Reconciled issues"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_page() -> PageSignals {
        let mut s = PageSignals::default();
        s.url = "https://s.test/".into();
        s.status_code = 200;
        s.title = Some("A perfectly reasonable page title here".into());
        s.title_length = 38;
        s.meta_description = Some("d".repeat(155));
        s.meta_description_length = 155;
        s.headings.h1 = vec!["Heading".into()];
        s.word_count = 900;
        s.is_https = true;
        s.has_viewport = true;
        s.is_indexable = true;
        s.schema_types = vec!["Article".into()];
        s.has_open_graph = true;
        s
    }

    fn types(issues: &[NewIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.issue_type.as_str()).collect()
    }

    #[test]
    fn test_clean_page_has_no_issues() {
        let page = clean_page();
        let mut facts = PageFacts::new(&page);
        facts.internal_links = 4;
        assert!(detect_page_issues(&facts).is_empty());
    }

    #[test]
    fn test_missing_title_is_high() {
        let mut page = clean_page();
        page.title = None;
        page.title_length = 0;
        let mut facts = PageFacts::new(&page);
        facts.internal_links = 1;
        let issues = detect_page_issues(&facts);
        assert_eq!(types(&issues), vec!["missing_title"]);
        assert_eq!(issues[0].severity, Severity::High);
    }

    #[test]
    fn test_thin_content_tiers_are_exclusive() {
        let mut page = clean_page();
        page.word_count = 200;
        let mut facts = PageFacts::new(&page);
        facts.internal_links = 1;
        assert_eq!(types(&detect_page_issues(&facts)), vec!["thin_content"]);

        page.word_count = 20;
        let mut facts = PageFacts::new(&page);
        facts.internal_links = 1;
        assert_eq!(types(&detect_page_issues(&facts)), vec!["very_thin_content"]);
    }

    #[test]
    fn test_graph_rules() {
        let page = clean_page();
        let mut facts = PageFacts::new(&page);
        facts.internal_links = 2;
        facts.broken_outbound = 3;
        facts.is_orphan = true;
        let issues = detect_page_issues(&facts);
        assert_eq!(types(&issues), vec!["broken_outbound_links", "orphan_page"]);
        assert_eq!(issues[0].title, "3 broken links");
    }

    #[test]
    fn test_site_rules_thresholds() {
        let facts = SiteFacts {
            total_pages: 20,
            missing_title: 1,
            missing_meta: 3,
            thin_content: 6,
            missing_schema: 17,
            not_https: 0,
        };
        assert_eq!(
            types(&detect_site_issues(&facts)),
            vec!["missing_meta_bulk", "missing_schema_bulk"]
        );
        assert!(detect_site_issues(&SiteFacts::default()).is_empty());
    }

    #[test]
    fn test_rule_metadata_is_unique() {
        let types: HashSet<&str> = PageRule::ALL.iter().map(|r| r.issue_type()).collect();
        assert_eq!(types.len(), PageRule::ALL.len());
    }
}
