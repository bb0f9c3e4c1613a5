//! Fetch -> parse -> extract -> record (C7).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use spindle_core::{hash, CrawlerConfig, ExtractResult, LinkRecord, PageRecord};
use spindle_frontier::Frontier;
use spindle_networks::TransportPool;
use spindle_storage::ResultStore;

use crate::stats::Stats;

/// A single non-keyed token bucket shared by every worker — `rate_limit`
/// in the spec is a crawl-wide cap, not per-worker.
pub fn build_rate_limiter(requests_per_second: u32) -> Option<Arc<DefaultDirectRateLimiter>> {
    let n = NonZeroU32::new(requests_per_second)?;
    Some(Arc::new(RateLimiter::direct(Quota::per_second(n))))
}

pub struct Worker {
    pub id: usize,
    pub frontier: Arc<Frontier>,
    pub transport: Arc<TransportPool>,
    pub store: Arc<ResultStore>,
    pub stats: Arc<Stats>,
    pub config: Arc<CrawlerConfig>,
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

/// Decrements the in-flight counter on every exit path, including early
/// `return`s — mirrors the "ensure decrement on all exits" requirement.
struct InFlightGuard<'a>(&'a Stats);

impl<'a> InFlightGuard<'a> {
    fn new(stats: &'a Stats) -> Self {
        stats.inc_in_flight();
        Self(stats)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.dec_in_flight();
    }
}

impl Worker {
    /// Runs until `cancel` fires or the frontier closes (every sender
    /// dropped — does not happen in normal operation since the frontier
    /// outlives every worker, but guards against leaks in tests).
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(worker_id = self.id, "worker shutting down");
                    return;
                }
                item = self.frontier.pop() => {
                    let Some(item) = item else {
                        debug!(worker_id = self.id, "frontier closed");
                        return;
                    };
                    if let Some(limiter) = &self.limiter {
                        limiter.until_ready().await;
                    }
                    self.fetch_and_process(item.url, item.depth).await;
                }
            }
        }
    }

    async fn fetch_and_process(&self, url: String, depth: u32) {
        let _guard = InFlightGuard::new(&self.stats);
        let start = Instant::now();
        let url_hash = hash::xxhash64(url.as_bytes());

        let client = self.transport.shard(self.id);
        let request = client
            .get(&url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Encoding", "gzip");

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let fetch_ms = start.elapsed().as_millis() as u64;
                if e.is_timeout() {
                    self.stats.record_timeout(fetch_ms);
                } else {
                    self.stats.record_failed(fetch_ms, 0);
                }
                let record = PageRecord {
                    url,
                    url_hash,
                    depth,
                    status_code: 0,
                    content_type: None,
                    content_length: None,
                    body_hash: None,
                    body_compressed: None,
                    title: None,
                    description: None,
                    language: None,
                    canonical: None,
                    etag: None,
                    last_modified: None,
                    server: None,
                    redirect_url: None,
                    link_count: 0,
                    fetch_time_ms: fetch_ms,
                    crawled_at: chrono::Utc::now(),
                    error: Some(e.to_string()),
                };
                self.persist(record).await;
                return;
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let redirect_url = if final_url != url { Some(final_url.clone()) } else { None };
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let etag = header_string(&response, "etag");
        let last_modified = header_string(&response, "last-modified");
        let server = header_string(&response, "server");
        let gzipped = response
            .headers()
            .get("content-encoding")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false);

        if status == 429 || status == 503 {
            let fetch_ms = start.elapsed().as_millis() as u64;
            self.stats.record_failed(fetch_ms, status);
            let record = PageRecord {
                url,
                url_hash,
                depth,
                status_code: status,
                content_type,
                content_length: None,
                body_hash: None,
                body_compressed: None,
                title: None,
                description: None,
                language: None,
                canonical: None,
                etag,
                last_modified,
                server,
                redirect_url,
                link_count: 0,
                fetch_time_ms: fetch_ms,
                crawled_at: chrono::Utc::now(),
                error: Some(format!("HTTP {status}")),
            };
            self.persist(record).await;
            return;
        }

        let raw_body = match read_body(response, self.config.max_body_size).await {
            Ok(b) => b,
            Err(e) => {
                let fetch_ms = start.elapsed().as_millis() as u64;
                self.stats.record_failed(fetch_ms, status);
                let record = PageRecord {
                    url,
                    url_hash,
                    depth,
                    status_code: status,
                    content_type,
                    content_length: None,
                    body_hash: None,
                    body_compressed: None,
                    title: None,
                    description: None,
                    language: None,
                    canonical: None,
                    etag,
                    last_modified,
                    server,
                    redirect_url,
                    link_count: 0,
                    fetch_time_ms: fetch_ms,
                    crawled_at: chrono::Utc::now(),
                    error: Some(e),
                };
                self.persist(record).await;
                return;
            }
        };

        let body = if gzipped {
            decode_gzip_capped(&raw_body, self.config.max_body_size)
        } else {
            let mut raw_body = raw_body;
            raw_body.truncate(self.config.max_body_size);
            raw_body
        };

        let body_hash = if body.is_empty() { None } else { Some(hash::xxhash64(&body)) };
        let fetch_ms = start.elapsed().as_millis() as u64;

        let mut record = PageRecord {
            url: url.clone(),
            url_hash,
            depth,
            status_code: status,
            content_type: content_type.clone(),
            content_length: Some(body.len() as u64),
            body_hash,
            body_compressed: None,
            title: None,
            description: None,
            language: None,
            canonical: None,
            etag,
            last_modified,
            server,
            redirect_url,
            link_count: 0,
            fetch_time_ms: fetch_ms,
            crawled_at: chrono::Utc::now(),
            error: if (200..400).contains(&status) { None } else { Some(format!("HTTP {status}")) },
        };

        let should_extract = (200..400).contains(&status)
            && spindle_core::is_html(content_type.as_deref())
            && !body.is_empty();

        let mut links_for_store: Vec<LinkRecord> = Vec::new();
        let mut link_count = 0u32;

        if should_extract {
            let effective_base = if record.redirect_url.is_some() { final_url.as_str() } else { url.as_str() };
            let extracted: ExtractResult =
                spindle_parser::extract(&body, effective_base, &self.config.domain, self.config.extract_images);

            record.title = extracted.title.clone();
            record.description = extracted.description.clone();
            record.language = extracted.language.clone();
            record.canonical = extracted.canonical.clone();
            link_count = extracted.link_count();

            if self.config.store_body {
                record.body_compressed = zstd::encode_all(body.as_slice(), 0).ok();
            }

            let max_depth = self.config.max_depth;
            for link in &extracted.links {
                if link.is_internal && (max_depth == 0 || depth < max_depth) {
                    self.frontier.try_add(&link.target_url, depth + 1).await;
                }
            }

            if self.config.store_links {
                links_for_store = extracted
                    .links
                    .into_iter()
                    .map(|l| LinkRecord {
                        source_hash: url_hash,
                        target_url: l.target_url,
                        anchor_text: l.anchor_text,
                        rel: l.rel,
                        is_internal: l.is_internal,
                    })
                    .collect();
            }
        }

        record.link_count = link_count;

        if !links_for_store.is_empty() {
            if let Err(e) = self.store.add_links(links_for_store).await {
                warn!(worker_id = self.id, url = %url, error = %e, "link store failed");
            }
        }

        self.stats.record_success(body.len() as u64, fetch_ms, status, depth, link_count);
        self.persist(record).await;
    }

    async fn persist(&self, record: PageRecord) {
        if let Err(e) = self.store.add_page(record).await {
            warn!(worker_id = self.id, error = %e, "page store failed");
        }
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Reads the response body in chunks, stopping once `max_body_size * 8`
/// raw bytes have been read — a safety cap against a misbehaving or
/// compressed-bomb origin, independent of the post-decode cap applied in
/// `decode_gzip_capped`.
async fn read_body(mut response: reqwest::Response, max_body_size: usize) -> Result<Vec<u8>, String> {
    let raw_cap = max_body_size.saturating_mul(8).max(max_body_size);
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
        buf.extend_from_slice(&chunk);
        if buf.len() >= raw_cap {
            break;
        }
    }
    Ok(buf)
}

/// Decodes gzip-compressed `raw`, truncating the decompressed output at
/// `max_body_size` bytes rather than erroring — a clipped page body is
/// still useful for extraction.
fn decode_gzip_capped(raw: &[u8], max_body_size: usize) -> Vec<u8> {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(raw).take(max_body_size as u64);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => out,
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_roundtrip_is_capped() {
        let original = b"hello world, this is a test body".repeat(10);
        let compressed = {
            use std::io::Write;
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&original).unwrap();
            encoder.finish().unwrap()
        };
        let decoded = decode_gzip_capped(&compressed, 16);
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn build_rate_limiter_none_when_zero() {
        assert!(build_rate_limiter(0).is_none());
        assert!(build_rate_limiter(5).is_some());
    }
}
