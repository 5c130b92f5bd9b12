use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a fetch adapter hands back for one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub html: String,
    pub headers: HashMap<String, String>,
    pub elapsed_ms: u64,
}

impl FetchResponse {
    pub fn new(url: String) -> Self {
        Self {
            final_url: url.clone(),
            url,
            status_code: 0,
            html: String::new(),
            headers: HashMap::new(),
            elapsed_ms: 0,
        }
    }

    pub fn with_html(url: &str, status_code: u16, html: &str) -> Self {
        let mut response = Self::new(url.to_string());
        response.status_code = status_code;
        response.html = html.to_string();
        response
            .headers
            .insert("content-type".to_string(), "text/html".to_string());
        response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(true)
    }

    pub fn size_bytes(&self) -> u64 {
        self.html.len() as u64
    }
}
