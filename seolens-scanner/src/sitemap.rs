// Sitemap seeding: <urlset> pages and one level of <sitemapindex> children

use crate::fetcher::Fetcher;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub fn extract_xml_loc_values(xml: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0usize;
    while let Some(open_idx) = xml[start..].find("<loc>") {
        let open = start + open_idx + 5;
        let Some(close_rel) = xml[open..].find("</loc>") else {
            break;
        };
        let close = open + close_rel;
        let value = xml[open..close].trim();
        if !value.is_empty() {
            out.push(unescape_xml(value));
        }
        start = close + 6;
    }
    out
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

fn is_sitemap_index(xml: &str) -> bool {
    xml.contains("<sitemapindex")
}

/// Fetch every page URL listed by the given sitemaps.
pub async fn collect_sitemap_urls(fetcher: &dyn Fetcher, sitemap_urls: &[String]) -> Vec<String> {
    let mut processed = HashSet::new();
    let mut pages = Vec::new();
    let mut pending: Vec<(String, bool)> = sitemap_urls.iter().map(|u| (u.clone(), true)).collect();

    while let Some((sitemap_url, may_recurse)) = pending.pop() {
        if !processed.insert(sitemap_url.clone()) {
            continue;
        }

        let body = match fetcher.fetch(&sitemap_url, false).await {
            Ok(response) if response.is_success() => response.html,
            Ok(response) => {
                debug!(
                    "Sitemap {} answered {}",
                    sitemap_url, response.status_code
                );
                continue;
            }
            Err(e) => {
                warn!("Failed to fetch sitemap {}: {}", sitemap_url, e);
                continue;
            }
        };

        let locs = extract_xml_loc_values(&body);
        if is_sitemap_index(&body) {
            if may_recurse {
                pending.extend(locs.into_iter().map(|loc| (loc, false)));
            }
        } else {
            pages.extend(locs);
        }
    }

    pages.sort();
    pages.dedup();
    info!("Found {} URLs from sitemaps", pages.len());
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{Replay, ReplayFetcher};

    #[test]
    fn test_extract_loc_values() {
        let xml = "<urlset><url><loc> https://example.com/a </loc></url><url><loc>https://example.com/b?x=1&amp;y=2</loc></url></urlset>";
        assert_eq!(
            extract_xml_loc_values(xml),
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/b?x=1&y=2".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_follows_index_one_level() {
        let fetcher = ReplayFetcher::new()
            .with(
                "https://example.com/sitemap.xml",
                Replay::text("<sitemapindex><sitemap><loc>https://example.com/pages.xml</loc></sitemap></sitemapindex>"),
            )
            .with(
                "https://example.com/pages.xml",
                Replay::text("<urlset><url><loc>https://example.com/one</loc></url><url><loc>https://example.com/two</loc></url></urlset>"),
            );

        let urls = collect_sitemap_urls(&fetcher, &["https://example.com/sitemap.xml".to_string()]).await;
        assert_eq!(urls, vec!["https://example.com/one", "https://example.com/two"]);
    }
}
