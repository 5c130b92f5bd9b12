//! Five-dimension page scoring.
//!
//! Every dimension is a sum of graded factors scaled to [0, 100]. A missing
//! signal earns zero for its factor; it is never dropped from the maximum.

use crate::config::ScoreWeights;
use crate::model::{Breakdown, DimensionScores, FactorScore, ScoreRecord};
use seolens_scanner::PageSignals;
use std::collections::BTreeMap;

pub const HIGH_VALUE_SCHEMA_TYPES: &[&str] =
    &["FAQPage", "HowTo", "Article", "Product", "LocalBusiness"];

/// Site aggregate data a page score depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageContext {
    /// Distinct internal link targets on the page.
    pub internal_links: usize,
    /// Distinct crawled pages linking to the page.
    pub inbound_links: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageScore {
    pub dimensions: DimensionScores,
    pub overall: f64,
    pub breakdown: Breakdown,
}

impl PageScore {
    pub fn into_record(self, site_id: i64, page_id: Option<i64>, computed_at: i64) -> ScoreRecord {
        ScoreRecord {
            site_id,
            page_id,
            dimensions: self.dimensions,
            overall: self.overall,
            breakdown: self.breakdown,
            computed_at,
        }
    }
}

impl From<ScoreRecord> for PageScore {
    fn from(record: ScoreRecord) -> Self {
        Self {
            dimensions: record.dimensions,
            overall: record.overall,
            breakdown: record.breakdown,
        }
    }
}

fn clamp(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Default)]
struct Tally {
    factors: BTreeMap<String, FactorScore>,
    earned: f64,
    max: f64,
}

impl Tally {
    fn add(&mut self, name: &str, value: f64, max: f64) {
        self.earned += value;
        self.max += max;
        self.factors.insert(name.to_string(), FactorScore::new(value, max));
    }

    /// Earned points scaled against the summed maximum.
    fn scaled(&self) -> f64 {
        if self.max <= 0.0 {
            return 0.0;
        }
        round2(clamp(self.earned / self.max * 100.0))
    }

    /// Earned points taken as-is, capped at 100.
    fn capped(&self) -> f64 {
        round2(clamp(self.earned))
    }
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: ScoreWeights,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}

impl ScoringEngine {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn overall(&self, dims: &DimensionScores) -> f64 {
        let w = &self.weights;
        round2(clamp(
            dims.technical * w.technical
                + dims.content * w.content
                + dims.authority * w.authority
                + dims.linking * w.linking
                + dims.ai_visibility * w.ai_visibility,
        ))
    }

    pub fn score_page(&self, signals: &PageSignals, ctx: PageContext) -> PageScore {
        let technical = technical(signals);
        let content = content(signals);
        let linking = linking(ctx);
        let authority = authority(ctx.inbound_links);
        let ai = ai_visibility(signals);

        let dimensions = DimensionScores {
            technical: technical.scaled(),
            content: content.scaled(),
            authority: authority.capped(),
            linking: linking.capped(),
            ai_visibility: ai.capped(),
        };
        let overall = self.overall(&dimensions);

        let mut breakdown = Breakdown::new();
        breakdown.insert("technical".to_string(), technical.factors);
        breakdown.insert("content".to_string(), content.factors);
        breakdown.insert("authority".to_string(), authority.factors);
        breakdown.insert("linking".to_string(), linking.factors);
        breakdown.insert("ai_visibility".to_string(), ai.factors);

        PageScore {
            dimensions,
            overall,
            breakdown,
        }
    }

    /// Average page scores into a site score. Factor values become per-factor
    /// averages. Returns `None` for a site without pages.
    pub fn site_score(&self, pages: &[PageScore]) -> Option<PageScore> {
        if pages.is_empty() {
            return None;
        }
        let n = pages.len() as f64;
        let avg = |f: fn(&DimensionScores) -> f64| {
            round2(pages.iter().map(|p| f(&p.dimensions)).sum::<f64>() / n)
        };
        let dimensions = DimensionScores {
            technical: avg(|d| d.technical),
            content: avg(|d| d.content),
            authority: avg(|d| d.authority),
            linking: avg(|d| d.linking),
            ai_visibility: avg(|d| d.ai_visibility),
        };
        let overall = round2(pages.iter().map(|p| p.overall).sum::<f64>() / n);

        let mut sums: BTreeMap<(String, String), (f64, f64, usize)> = BTreeMap::new();
        for page in pages {
            for (dimension, factors) in &page.breakdown {
                for (name, factor) in factors {
                    let entry = sums
                        .entry((dimension.clone(), name.clone()))
                        .or_insert((0.0, factor.max, 0));
                    entry.0 += factor.value;
                    entry.2 += 1;
                }
            }
        }
        let mut breakdown = Breakdown::new();
        for ((dimension, name), (total, max, count)) in sums {
            breakdown
                .entry(dimension)
                .or_default()
                .insert(name, FactorScore::new(total / count as f64, max));
        }

        Some(PageScore {
            dimensions,
            overall,
            breakdown,
        })
    }
}

fn points(flag: bool, value: f64) -> f64 {
    if flag { value } else { 0.0 }
}

fn technical(s: &PageSignals) -> Tally {
    let mut t = Tally::default();
    t.add("https", points(s.is_https, 10.0), 10.0);

    let status = match s.status_code {
        200 => 10.0,
        201..=399 => 5.0,
        _ => 0.0,
    };
    t.add("status_code", status, 10.0);
    t.add("indexable", points(s.is_indexable, 15.0), 15.0);
    t.add("viewport", points(s.has_viewport, 5.0), 5.0);

    let load = match s.load_time_ms {
        0..=1000 => 10.0,
        1001..=2000 => 7.0,
        2001..=3000 => 5.0,
        3001..=5000 => 2.0,
        _ => 0.0,
    };
    t.add("load_time", load, 10.0);

    let size_kb = s.page_size_bytes as f64 / 1024.0;
    let size = if size_kb < 500.0 {
        10.0
    } else if size_kb < 1024.0 {
        7.0
    } else if size_kb < 2048.0 {
        3.0
    } else {
        0.0
    };
    t.add("page_size", size, 10.0);

    t.add("canonical", points(s.canonical_url.is_some(), 5.0), 5.0);
    t.add("schema_markup", points(s.has_schema(), 10.0), 10.0);
    t.add("open_graph", points(s.has_open_graph, 5.0), 5.0);
    t.add("twitter_card", points(s.has_twitter_card, 5.0), 5.0);
    t.add("hreflang", points(s.has_hreflang, 5.0), 5.0);
    t
}

fn content(s: &PageSignals) -> Tally {
    let mut t = Tally::default();

    let title = if !s.has_title() {
        0.0
    } else {
        match s.title_length {
            30..=60 => 20.0,
            20..=70 => 15.0,
            _ => 8.0,
        }
    };
    t.add("title", title, 20.0);

    let meta = if !s.has_meta_description() {
        0.0
    } else {
        match s.meta_description_length {
            150..=160 => 15.0,
            100..=180 => 10.0,
            _ => 5.0,
        }
    };
    t.add("meta_description", meta, 15.0);

    let h1 = match s.headings.h1.len() {
        0 => 0.0,
        1 => 15.0,
        _ => 8.0,
    };
    t.add("h1", h1, 15.0);

    let h2 = match s.headings.h2.len() {
        0 => 0.0,
        1 => 2.0,
        _ => 5.0,
    };
    t.add("h2", h2, 5.0);

    let words = match s.word_count {
        1500.. => 20.0,
        800.. => 15.0,
        400.. => 10.0,
        200.. => 5.0,
        _ => 0.0,
    };
    t.add("word_count", words, 20.0);

    let alt = if s.images_total == 0 {
        10.0
    } else {
        (s.images_with_alt as f64 / s.images_total as f64 * 10.0).round()
    };
    t.add("image_alt", alt, 10.0);

    let ratio = if s.text_html_ratio >= 0.3 {
        10.0
    } else if s.text_html_ratio >= 0.15 {
        5.0
    } else {
        0.0
    };
    t.add("text_ratio", ratio, 10.0);
    t
}

fn linking(ctx: PageContext) -> Tally {
    let mut t = Tally::default();
    let outgoing = match ctx.internal_links {
        5.. => 30.0,
        2.. => 20.0,
        1 => 10.0,
        _ => 0.0,
    };
    t.add("outgoing_internal", outgoing, 30.0);

    let quality = match ctx.internal_links {
        1..=50 => 20.0,
        101.. => 5.0,
        _ => 0.0,
    };
    t.add("link_count_quality", quality, 20.0);

    let inbound = match ctx.inbound_links {
        10.. => 50.0,
        5.. => 35.0,
        2.. => 20.0,
        1 => 10.0,
        _ => 0.0,
    };
    t.add("inbound_links", inbound, 50.0);
    t
}

fn authority(inbound: usize) -> Tally {
    let value = match inbound {
        50.. => 90.0,
        20.. => 75.0,
        10.. => 60.0,
        5.. => 45.0,
        2.. => 30.0,
        1 => 15.0,
        _ => 5.0,
    };
    let mut t = Tally::default();
    t.add("inbound_link_ladder", value, 100.0);
    t
}

fn ai_visibility(s: &PageSignals) -> Tally {
    let mut t = Tally::default();
    t.add("schema_markup", points(s.has_schema(), 40.0), 40.0);

    let high_value = if s.has_schema() {
        HIGH_VALUE_SCHEMA_TYPES
            .iter()
            .filter(|kind| s.schema_types.iter().any(|found| found.as_str() == **kind))
            .count() as f64
            * 10.0
    } else {
        0.0
    };
    t.add(
        "high_value_schema",
        high_value,
        HIGH_VALUE_SCHEMA_TYPES.len() as f64 * 10.0,
    );
    t.add("single_h1", points(s.headings.h1.len() == 1, 15.0), 15.0);
    t.add("h2_structure", points(s.headings.h2.len() >= 2, 15.0), 15.0);
    t.add("open_graph", points(s.has_open_graph, 10.0), 10.0);
    t.add("long_form", points(s.word_count >= 1000, 10.0), 10.0);
    t
}
