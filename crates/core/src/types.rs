use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A unit of frontier work: a normalized URL at a given crawl depth.
/// Immutable; created on seed or link discovery, consumed when a worker
/// pops it off the frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlItem {
    pub url: String,
    pub depth: u32,
}

/// One fetched-and-parsed page, ready to hand to the result store.
///
/// Invariant: for any successful `status_code in [200, 400)`, if the
/// content type is HTML then `title`/`description`/`language`/
/// `canonical`/`link_count` reflect the extractor's output; otherwise
/// they may be left empty. `error` is non-empty iff the fetch failed or
/// returned a non-recoverable HTTP status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub url_hash: u64,
    pub depth: u32,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body_hash: Option<u64>,
    pub body_compressed: Option<Vec<u8>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub canonical: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub server: Option<String>,
    pub redirect_url: Option<String>,
    pub link_count: u32,
    pub fetch_time_ms: u64,
    pub crawled_at: chrono::DateTime<chrono::Utc>,
    pub error: Option<String>,
}

/// One extracted hyperlink edge. `source_hash` equals the source page's
/// `url_hash`; `target_url` is fully resolved against the source's
/// effective base. Duplicates across pages are allowed — they describe
/// different edges, not the same fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source_hash: u64,
    pub target_url: String,
    pub anchor_text: Option<String>,
    pub rel: Option<String>,
    pub is_internal: bool,
}

/// A single hyperlink edge discovered by the HTML extractor (C4), before
/// the worker attaches the source page's `url_hash` and turns it into a
/// persisted `LinkRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub target_url: String,
    pub anchor_text: Option<String>,
    pub rel: Option<String>,
    pub is_internal: bool,
}

/// Everything the HTML extractor (C4) produces from one page body.
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub canonical: Option<String>,
    pub links: Vec<ExtractedLink>,
}

impl ExtractResult {
    pub fn link_count(&self) -> u32 {
        self.links.len() as u32
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_body_size: 512 * 1024,
            user_agent: "spindle/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetch_time_ms: u64,
}
