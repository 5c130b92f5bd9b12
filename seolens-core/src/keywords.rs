//! Keyword opportunity engine.
//!
//! `opportunity = volume * ctr * rank_gap / max(difficulty, 1.0)`, with the
//! CTR read off a position curve at the keyword's current rank. Volume,
//! difficulty and rank are heuristic estimates from on-site frequency.

use crate::config::Settings;
use crate::model::KeywordRecord;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Organic click-through rate by search position. Gaps are interpolated linearly.
pub const CTR_CURVE: &[(u32, f64)] = &[
    (1, 0.284),
    (2, 0.152),
    (3, 0.099),
    (4, 0.073),
    (5, 0.058),
    (6, 0.046),
    (7, 0.036),
    (8, 0.031),
    (9, 0.027),
    (10, 0.024),
    (11, 0.018),
    (12, 0.015),
    (13, 0.013),
    (14, 0.011),
    (15, 0.009),
    (20, 0.006),
    (30, 0.003),
    (50, 0.001),
];

/// CTR past the end of the curve and for keywords without a rank.
pub const FLOOR_CTR: f64 = 0.0005;
pub const DIFFICULTY_EPSILON: f64 = 1.0;
pub const MAX_PAGE_URLS: usize = 5;
pub const MIN_KEYWORD_CHARS: usize = 3;

pub fn ctr_for_position(position: Option<u32>) -> f64 {
    let Some(position) = position else {
        return FLOOR_CTR;
    };
    if position == 0 {
        return 0.0;
    }
    for pair in CTR_CURVE.windows(2) {
        let (p1, c1) = pair[0];
        let (p2, c2) = pair[1];
        if position == p1 {
            return c1;
        }
        if position < p2 {
            let ratio = (position - p1) as f64 / (p2 - p1) as f64;
            return c1 + ratio * (c2 - c1);
        }
    }
    match CTR_CURVE.last() {
        Some((last, ctr)) if position == *last => *ctr,
        _ => FLOOR_CTR,
    }
}

/// Zero whenever the keyword already ranks at or above target.
pub fn opportunity_score(volume: u64, ctr: f64, rank_gap: i64, difficulty: f64) -> f64 {
    if rank_gap <= 0 || volume == 0 || !(ctr > 0.0) {
        return 0.0;
    }
    let difficulty = if difficulty.is_nan() {
        DIFFICULTY_EPSILON
    } else {
        difficulty.max(DIFFICULTY_EPSILON)
    };
    let raw = volume as f64 * ctr * rank_gap as f64 / difficulty;
    ((raw * 100.0).round() / 100.0).max(0.0)
}

fn word_count(keyword: &str) -> usize {
    keyword.split_whitespace().count()
}

pub fn estimate_volume(keyword: &str, site_frequency: u64) -> u64 {
    let multiplier = match word_count(keyword) {
        0 | 1 => 10,
        2 => 4,
        3 => 2,
        _ => 1,
    };
    1000 * multiplier + (site_frequency * 50).min(5000)
}

pub fn estimate_difficulty(keyword: &str) -> f64 {
    match word_count(keyword) {
        0 | 1 => 75.0,
        2 => 55.0,
        3 => 40.0,
        _ => 25.0,
    }
}

pub fn estimate_current_rank(site_frequency: u64) -> u32 {
    match site_frequency {
        50.. => 8,
        20.. => 15,
        10.. => 25,
        5.. => 40,
        _ => 60,
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_rankable(keyword: &str) -> bool {
    keyword.chars().count() >= MIN_KEYWORD_CHARS
        && !keyword.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
}

/// Ordering for ranked keyword lists: score, then volume, then keyword.
pub fn rank_order(a: &KeywordRecord, b: &KeywordRecord) -> Ordering {
    b.opportunity_score
        .total_cmp(&a.opportunity_score)
        .then_with(|| b.estimated_volume.cmp(&a.estimated_volume))
        .then_with(|| a.keyword.cmp(&b.keyword))
}

/// Keyword frequencies of one crawled page.
#[derive(Debug, Clone, Copy)]
pub struct PageKeywords<'a> {
    pub url: &'a str,
    pub frequencies: &'a BTreeMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct KeywordEngine {
    target_rank: u32,
    threshold: f64,
    limit: usize,
}

impl Default for KeywordEngine {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl KeywordEngine {
    pub fn new(target_rank: u32, threshold: f64, limit: usize) -> Self {
        Self {
            target_rank,
            threshold,
            limit,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.target_rank,
            settings.opportunity_threshold,
            settings.keyword_limit,
        )
    }

    /// Score a single keyword from explicit estimates.
    pub fn score(
        &self,
        site_id: i64,
        keyword: &str,
        estimated_volume: u64,
        estimated_difficulty: f64,
        current_rank: Option<u32>,
    ) -> KeywordRecord {
        let estimated_ctr = ctr_for_position(current_rank);
        let rank_gap = current_rank
            .map(|rank| rank as i64 - self.target_rank as i64)
            .unwrap_or(0);
        let opportunity_score =
            opportunity_score(estimated_volume, estimated_ctr, rank_gap, estimated_difficulty);
        KeywordRecord {
            site_id,
            keyword: keyword.to_string(),
            frequency: 0,
            density: 0.0,
            estimated_volume,
            estimated_difficulty,
            estimated_ctr,
            current_rank,
            target_rank: self.target_rank,
            rank_gap,
            opportunity_score,
            is_opportunity: opportunity_score > self.threshold,
            page_urls: Vec::new(),
        }
    }

    /// Aggregate keyword frequencies across pages into a ranked, truncated list.
    pub fn analyze(&self, site_id: i64, pages: &[PageKeywords]) -> Vec<KeywordRecord> {
        let mut totals: HashMap<String, u64> = HashMap::new();
        let mut urls: HashMap<String, Vec<String>> = HashMap::new();
        let mut total_words: u64 = 0;

        for page in pages {
            for (raw, count) in page.frequencies {
                let keyword = normalize_keyword(raw);
                if keyword.is_empty() || *count == 0 {
                    continue;
                }
                total_words += u64::from(*count);
                *totals.entry(keyword.clone()).or_default() += u64::from(*count);
                let page_urls = urls.entry(keyword).or_default();
                if page_urls.len() < MAX_PAGE_URLS && !page_urls.iter().any(|u| u == page.url) {
                    page_urls.push(page.url.to_string());
                }
            }
        }

        let mut ranked: Vec<KeywordRecord> = totals
            .into_iter()
            .filter(|(keyword, _)| is_rankable(keyword))
            .map(|(keyword, frequency)| {
                let mut record = self.score(
                    site_id,
                    &keyword,
                    estimate_volume(&keyword, frequency),
                    estimate_difficulty(&keyword),
                    Some(estimate_current_rank(frequency)),
                );
                record.frequency = frequency;
                record.density = if total_words == 0 {
                    0.0
                } else {
                    (frequency as f64 / total_words as f64 * 100.0 * 10_000.0).round() / 10_000.0
                };
                record.page_urls = urls.remove(&keyword).unwrap_or_default();
                record
            })
            .collect();

        ranked.sort_by(rank_order);
        ranked.truncate(self.limit);
        ranked
    }
}
