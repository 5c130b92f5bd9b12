// URL normalization and classification shared by the frontier and link graph

use url::Url;

const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".pdf", ".zip", ".tar", ".gz",
    ".mp4", ".mp3", ".avi", ".css", ".js", ".woff", ".woff2", ".ttf", ".eot", ".xlsx", ".docx",
    ".pptx", ".csv", ".xml",
];

/// Canonical form used for dedup: lowercased scheme/host, no fragment, no trailing
/// slash (root keeps its single `/`), tracking parameters removed.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = Url::parse(trimmed).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str()?;

    url.set_fragment(None);

    let kept_params = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_query_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect::<Vec<_>>();
    if kept_params.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in kept_params {
            serializer.append_pair(&k, &v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    let trimmed_path = url.path().trim_end_matches('/').to_string();
    if trimmed_path.is_empty() {
        url.set_path("/");
    } else {
        url.set_path(&trimmed_path);
    }

    Some(url.to_string())
}

fn is_tracking_query_param(param: &str) -> bool {
    let name = param.to_ascii_lowercase();
    if name.starts_with("utm_") {
        return true;
    }
    matches!(
        name.as_str(),
        "gclid" | "fbclid" | "gbraid" | "wbraid" | "_gl" | "mc_cid" | "mc_eid"
    )
}

/// Resolve an href found on `base` into an absolute, normalized URL.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let base_url = Url::parse(base).ok()?;
    let resolved = base_url.join(href).ok()?;
    normalize_url(resolved.as_str())
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// The site key a crawl is scoped to: the root host without a leading `www.`.
pub fn site_domain(url: &str) -> Option<String> {
    host_of(url).map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
}

/// True when `url` lives on `domain` or one of its subdomains.
pub fn is_same_site(url: &str, domain: &str) -> bool {
    match site_domain(url) {
        Some(host) => host == domain || host.ends_with(&format!(".{}", domain)),
        None => false,
    }
}

/// Filters out non-page resources the crawler should never enqueue.
pub fn is_crawlable_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    let path = parsed.path().to_ascii_lowercase();
    !EXCLUDED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn is_https(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.scheme() == "https")
        .unwrap_or(false)
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}
