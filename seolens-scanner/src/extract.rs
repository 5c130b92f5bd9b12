// Signal extraction: raw HTML plus fetch metadata into a page signal set.
//
// Parsing is best effort. scraper never rejects a document, so malformed markup
// degrades to whatever the tree builder recovered instead of failing the page.

use crate::normalize::{is_https, normalize_url, resolve_href};
use crate::result::FetchResponse;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const READING_WORDS_PER_MINUTE: f64 = 225.0;

const TOP_UNIGRAMS: usize = 150;
const TOP_BIGRAMS: usize = 50;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "about", "into", "through", "during", "is", "are", "was", "were", "be", "been",
    "being", "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "may",
    "might", "shall", "can", "need", "dare", "ought", "used", "it", "its", "this", "that",
    "these", "those", "i", "me", "my", "we", "our", "you", "your", "he", "his", "she", "her",
    "they", "their", "what", "which", "who", "when", "where", "why", "how", "all", "each",
    "every", "both", "few", "more", "most", "other", "some", "such", "no", "not", "only", "same",
    "so", "than", "too", "very", "just", "also", "as", "if", "then",
];

pub const SEO_SCHEMA_TYPES: &[&str] = &[
    "Article",
    "NewsArticle",
    "BlogPosting",
    "WebPage",
    "Product",
    "LocalBusiness",
    "Organization",
    "Person",
    "Event",
    "FAQPage",
    "HowTo",
    "Review",
    "AggregateRating",
    "BreadcrumbList",
    "Recipe",
    "VideoObject",
    "ImageObject",
    "SoftwareApplication",
    "Course",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub h4: Vec<String>,
    pub h5: Vec<String>,
    pub h6: Vec<String>,
}

impl Headings {
    fn level_mut(&mut self, level: usize) -> &mut Vec<String> {
        match level {
            1 => &mut self.h1,
            2 => &mut self.h2,
            3 => &mut self.h3,
            4 => &mut self.h4,
            5 => &mut self.h5,
            _ => &mut self.h6,
        }
    }
}

/// An `<a href>` as found on the page, resolved against the page URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLink {
    pub href: String,
    /// Absolute normalized target, `None` when the href is not an http(s) URL.
    pub url: Option<String>,
    pub anchor_text: String,
    pub rel: Option<String>,
    pub nofollow: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSignals {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub load_time_ms: u64,
    pub page_size_bytes: u64,

    pub title: Option<String>,
    pub title_length: usize,
    pub meta_description: Option<String>,
    pub meta_description_length: usize,
    pub meta_robots: Option<String>,
    pub is_indexable: bool,
    pub canonical_url: Option<String>,
    pub canonical_mismatch: bool,
    pub lang: Option<String>,
    pub has_hreflang: bool,

    pub headings: Headings,

    pub schema_types: Vec<String>,
    pub structured_data: Vec<serde_json::Value>,
    pub has_open_graph: bool,
    pub has_twitter_card: bool,

    pub images_total: usize,
    pub images_with_alt: usize,
    pub images_missing_alt: usize,

    pub is_https: bool,
    pub has_viewport: bool,

    pub word_count: usize,
    pub text_html_ratio: f64,
    pub reading_time_seconds: u64,

    pub links: Vec<RawLink>,
    pub keyword_frequencies: BTreeMap<String, u32>,
}

impl PageSignals {
    pub fn has_title(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_meta_description(&self) -> bool {
        self.meta_description.as_deref().is_some_and(|d| !d.is_empty())
    }

    pub fn has_schema(&self) -> bool {
        !self.structured_data.is_empty() || !self.schema_types.is_empty()
    }
}

fn selector(css: &str) -> Selector {
    // Only called with literal selectors below
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid built-in selector {}", css))
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Extract signals for a fetched page.
pub fn extract_signals(response: &FetchResponse) -> PageSignals {
    let mut signals = extract_html(&response.final_url, &response.html);
    signals.url = response.url.clone();
    signals.status_code = response.status_code;
    signals.load_time_ms = response.elapsed_ms;
    signals.page_size_bytes = response.size_bytes();
    signals.is_https = is_https(&response.url);
    signals
}

/// Extract signals from raw HTML served at `page_url`.
pub fn extract_html(page_url: &str, html: &str) -> PageSignals {
    let mut signals = PageSignals {
        url: page_url.to_string(),
        final_url: page_url.to_string(),
        page_size_bytes: html.len() as u64,
        is_https: is_https(page_url),
        is_indexable: true,
        ..Default::default()
    };
    if html.trim().is_empty() {
        return signals;
    }

    let document = Html::parse_document(html);
    extract_basic(&mut signals, &document, page_url);
    extract_headings(&mut signals, &document);
    extract_content(&mut signals, &document, html);
    extract_images(&mut signals, &document);
    extract_links(&mut signals, &document, page_url);
    extract_structured_data(&mut signals, &document);
    extract_social(&mut signals, &document);
    signals
}

fn meta_content(document: &Html, attr: &str, name: &str) -> Option<String> {
    let meta = selector("meta");
    document
        .select(&meta)
        .find(|el| {
            el.value()
                .attr(attr)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case(name))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn extract_basic(signals: &mut PageSignals, document: &Html, page_url: &str) {
    if let Some(title) = document.select(&selector("title")).next() {
        let text = element_text(&title);
        if !text.is_empty() {
            signals.title_length = text.chars().count();
            signals.title = Some(truncate_chars(&text, 512));
        }
    }

    if let Some(description) = meta_content(document, "name", "description") {
        signals.meta_description_length = description.chars().count();
        signals.meta_description = Some(description);
    }

    if let Some(robots) = meta_content(document, "name", "robots") {
        let robots = robots.to_ascii_lowercase();
        signals.is_indexable = !robots.contains("noindex");
        signals.meta_robots = Some(robots);
    }

    let canonical = document
        .select(&selector("link[rel][href]"))
        .find(|el| {
            el.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
        })
        .and_then(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty());
    if let Some(canonical) = canonical {
        let resolved = resolve_href(page_url, &canonical);
        signals.canonical_mismatch = match (&resolved, normalize_url(page_url)) {
            (Some(target), Some(current)) => *target != current,
            _ => true,
        };
        signals.canonical_url = Some(resolved.unwrap_or(canonical));
    }

    signals.lang = document
        .select(&selector("html[lang]"))
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|lang| truncate_chars(lang.trim(), 10))
        .filter(|lang| !lang.is_empty());

    signals.has_hreflang = document.select(&selector("link[hreflang]")).next().is_some();
    signals.has_viewport = meta_content(document, "name", "viewport").is_some()
        || document.select(&selector("meta[name=viewport]")).next().is_some();
}

fn extract_headings(signals: &mut PageSignals, document: &Html) {
    for level in 1..=6 {
        let css = format!("h{}", level);
        let texts = document
            .select(&selector(&css))
            .map(|el| truncate_chars(&element_text(&el), 255))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>();
        *signals.headings.level_mut(level) = texts;
    }
}

/// Visible text of the document: text nodes outside script, style, noscript and template.
fn visible_text(document: &Html) -> String {
    let body = selector("body");
    let root = document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|el| {
                matches!(el.name(), "script" | "style" | "noscript" | "template")
            })
        });
        if !hidden {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }
    parts.join(" ")
}

fn extract_content(signals: &mut PageSignals, document: &Html, raw_html: &str) {
    let text = visible_text(document);
    signals.word_count = text.split_whitespace().count();
    if signals.word_count > 0 {
        let minutes = signals.word_count as f64 / READING_WORDS_PER_MINUTE;
        signals.reading_time_seconds = ((minutes * 60.0) as u64).max(1);
    }

    if !raw_html.is_empty() {
        let ratio = text.len() as f64 / raw_html.len() as f64;
        signals.text_html_ratio = (ratio * 1000.0).round() / 1000.0;
    }

    signals.keyword_frequencies = keyword_frequencies(&text);
}

fn extract_images(signals: &mut PageSignals, document: &Html) {
    for img in document.select(&selector("img")) {
        signals.images_total += 1;
        match img.value().attr("alt") {
            Some(alt) if !alt.trim().is_empty() => signals.images_with_alt += 1,
            _ => signals.images_missing_alt += 1,
        }
    }
}

fn extract_links(signals: &mut PageSignals, document: &Html, page_url: &str) {
    for anchor in document.select(&selector("a[href]")) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let rel = anchor
            .value()
            .attr("rel")
            .map(|r| r.trim().to_ascii_lowercase())
            .filter(|r| !r.is_empty());
        let nofollow = rel
            .as_deref()
            .is_some_and(|r| r.split_whitespace().any(|token| token == "nofollow"));

        signals.links.push(RawLink {
            href: href.to_string(),
            url: resolve_href(page_url, href),
            anchor_text: truncate_chars(&element_text(&anchor), 255),
            rel,
            nofollow,
        });
    }
}

fn collect_json_ld_types(value: &serde_json::Value, out: &mut HashSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            match map.get("@type") {
                Some(serde_json::Value::String(t)) => {
                    out.insert(t.clone());
                }
                Some(serde_json::Value::Array(types)) => {
                    out.extend(types.iter().filter_map(|t| t.as_str().map(str::to_string)));
                }
                _ => {}
            }
            if let Some(graph) = map.get("@graph") {
                collect_json_ld_types(graph, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_ld_types(item, out);
            }
        }
        _ => {}
    }
}

fn extract_structured_data(signals: &mut PageSignals, document: &Html) {
    let mut types = HashSet::new();

    for script in document.select(&selector("script[type]")) {
        let is_json_ld = script
            .value()
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"));
        if !is_json_ld {
            continue;
        }
        let body = script.text().collect::<String>();
        // Broken JSON-LD is ignored, the page still counts as having no schema from it
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body.trim()) {
            collect_json_ld_types(&value, &mut types);
            signals.structured_data.push(value);
        }
    }

    for item in document.select(&selector("[itemscope][itemtype]")) {
        let Some(itemtype) = item.value().attr("itemtype") else {
            continue;
        };
        for url in itemtype.split_whitespace() {
            if let Some(name) = url.trim_end_matches('/').rsplit('/').next() {
                types.insert(name.to_string());
                signals
                    .structured_data
                    .push(serde_json::json!({ "@type": name, "source": "microdata" }));
            }
        }
    }

    let mut filtered = types
        .into_iter()
        .filter(|t| SEO_SCHEMA_TYPES.contains(&t.as_str()))
        .collect::<Vec<_>>();
    filtered.sort();
    signals.schema_types = filtered;
}

fn extract_social(signals: &mut PageSignals, document: &Html) {
    let meta = selector("meta[content]");
    for tag in document.select(&meta) {
        let content = tag.value().attr("content").unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        if let Some(property) = tag.value().attr("property")
            && property.to_ascii_lowercase().starts_with("og:")
        {
            signals.has_open_graph = true;
        }
        if let Some(name) = tag.value().attr("name")
            && name.to_ascii_lowercase().starts_with("twitter:")
        {
            signals.has_twitter_card = true;
        }
    }
}

/// Top unigrams (stop words and short tokens removed) plus repeated bigrams.
pub fn keyword_frequencies(text: &str) -> BTreeMap<String, u32> {
    let lowered = text.to_lowercase();
    let cleaned = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '\'' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>();

    let tokens = cleaned
        .split_whitespace()
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .filter(|t| !t.trim_matches(|c| c == '\'' || c == '-').is_empty())
        .collect::<Vec<_>>();

    let mut unigrams: HashMap<&str, u32> = HashMap::new();
    for token in &tokens {
        *unigrams.entry(*token).or_insert(0) += 1;
    }

    let mut bigrams: HashMap<String, u32> = HashMap::new();
    for pair in tokens.windows(2) {
        *bigrams.entry(format!("{} {}", pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut combined = BTreeMap::new();
    for (term, count) in most_common(unigrams.into_iter().map(|(k, v)| (k.to_string(), v)), TOP_UNIGRAMS) {
        combined.insert(term, count);
    }
    for (term, count) in most_common(bigrams.into_iter(), TOP_BIGRAMS) {
        if count >= 2 {
            combined.insert(term, count);
        }
    }
    combined
}

fn most_common(counts: impl Iterator<Item = (String, u32)>, limit: usize) -> Vec<(String, u32)> {
    let mut counts = counts.collect::<Vec<_>>();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(limit);
    counts
}
