// Outbound link classification for one crawled page

use crate::extract::RawLink;
use crate::normalize::{is_crawlable_url, is_same_site};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundLink {
    pub target_url: String,
    pub anchor_text: String,
    pub is_internal: bool,
    pub nofollow: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifiedLinks {
    /// Every distinct http(s) target on the page, in document order.
    pub edges: Vec<OutboundLink>,
    /// Internal page URLs worth queueing at `depth + 1`.
    pub crawl_candidates: Vec<String>,
}

impl ClassifiedLinks {
    pub fn internal_count(&self) -> usize {
        self.edges.iter().filter(|l| l.is_internal).count()
    }

    pub fn external_count(&self) -> usize {
        self.edges.iter().filter(|l| !l.is_internal).count()
    }
}

/// Split a page's raw links into graph edges and crawl candidates.
///
/// The first occurrence of a target wins, so duplicate anchors to the same URL
/// produce a single edge. Links back to the page itself are not edges.
pub fn classify_links(page_url: &str, links: &[RawLink], site_domain: &str) -> ClassifiedLinks {
    let mut seen = HashSet::new();
    let mut classified = ClassifiedLinks::default();

    for link in links {
        let Some(target) = &link.url else {
            continue;
        };
        if target == page_url || !seen.insert(target.clone()) {
            continue;
        }

        let is_internal = is_same_site(target, site_domain);
        if is_internal && is_crawlable_url(target) {
            classified.crawl_candidates.push(target.clone());
        }
        classified.edges.push(OutboundLink {
            target_url: target.clone(),
            anchor_text: link.anchor_text.clone(),
            is_internal,
            nofollow: link.nofollow,
        });
    }

    classified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, anchor: &str) -> RawLink {
        RawLink {
            href: url.to_string(),
            url: Some(url.to_string()),
            anchor_text: anchor.to_string(),
            rel: None,
            nofollow: false,
        }
    }

    #[test]
    fn test_classifies_internal_and_external() {
        let links = vec![
            link("https://example.com/a", "A"),
            link("https://blog.example.com/post", "Post"),
            link("https://other.org/", "Other"),
        ];
        let classified = classify_links("https://example.com/", &links, "example.com");

        assert_eq!(classified.internal_count(), 2);
        assert_eq!(classified.external_count(), 1);
        assert_eq!(
            classified.crawl_candidates,
            vec!["https://example.com/a", "https://blog.example.com/post"]
        );
    }

    #[test]
    fn test_dedups_targets_and_skips_self() {
        let links = vec![
            link("https://example.com/a", "first"),
            link("https://example.com/a", "second"),
            link("https://example.com/", "home"),
        ];
        let classified = classify_links("https://example.com/", &links, "example.com");

        assert_eq!(classified.edges.len(), 1);
        assert_eq!(classified.edges[0].anchor_text, "first");
    }

    #[test]
    fn test_assets_are_edges_but_not_candidates() {
        let links = vec![link("https://example.com/brochure.pdf", "PDF")];
        let classified = classify_links("https://example.com/", &links, "example.com");

        assert_eq!(classified.edges.len(), 1);
        assert!(classified.crawl_candidates.is_empty());
    }

    #[test]
    fn test_unresolvable_links_are_ignored() {
        let mut mail = link("mailto:x@example.com", "mail");
        mail.url = None;
        let classified = classify_links("https://example.com/", &[mail], "example.com");
        assert!(classified.edges.is_empty());
    }
}
