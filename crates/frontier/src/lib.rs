use std::sync::Arc;

use growable_bloom_filter::GrowableBloom;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use spindle_core::types::CrawlItem;
use spindle_core::urlnorm::{is_same_domain, normalize};

/// A callback-shaped robots contract so the frontier can consult
/// politeness rules without depending on the discovery crate directly —
/// the crawler wires a concrete implementation in at construction time,
/// the way the teacher's network drivers are handed in as trait objects
/// rather than imported by name.
pub trait RobotsCheck: Send + Sync {
    fn allowed(&self, path: &str) -> bool;
}

/// A permissive default — used when `respect_robots` is off, or before
/// a real robots contract has been fetched.
pub struct AllowAll;

impl RobotsCheck for AllowAll {
    fn allowed(&self, _path: &str) -> bool {
        true
    }
}

pub struct FrontierConfig {
    pub capacity: usize,
    pub bloom_capacity: usize,
    pub bloom_fpr: f64,
    pub domain: String,
    pub include_subdomain: bool,
}

/// The single-domain frontier: a bounded FIFO of `CrawlItem` guarded by a
/// bloom filter of URLs ever admitted. See `try_add` for the
/// bloom-after-enqueue ordering that makes a full queue delay discovery
/// rather than lose it.
pub struct Frontier {
    sender: mpsc::Sender<CrawlItem>,
    receiver: Mutex<mpsc::Receiver<CrawlItem>>,
    seen: Mutex<GrowableBloom>,
    robots: Arc<dyn RobotsCheck>,
    domain: String,
    include_subdomain: bool,
    rejected_robots: std::sync::atomic::AtomicU64,
    rejected_domain: std::sync::atomic::AtomicU64,
}

impl Frontier {
    pub fn new(config: FrontierConfig, robots: Arc<dyn RobotsCheck>) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            seen: Mutex::new(GrowableBloom::new(config.bloom_fpr, config.bloom_capacity)),
            robots,
            domain: config.domain,
            include_subdomain: config.include_subdomain,
            rejected_robots: std::sync::atomic::AtomicU64::new(0),
            rejected_domain: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Normalizes `raw_url`, checks same-origin and robots, and — only if
    /// the bounded FIFO actually accepts the item — marks it seen in the
    /// bloom. The bloom lock is held across the send so the
    /// check-and-enqueue is atomic: no other caller can observe the URL
    /// as "seen but not enqueued".
    pub async fn try_add(&self, raw_url: &str, depth: u32) -> bool {
        let canonical = normalize(raw_url);
        if canonical.is_empty() {
            return false;
        }

        let parsed = match url::Url::parse(&canonical) {
            Ok(u) => u,
            Err(_) => return false,
        };
        let host = match parsed.host_str() {
            Some(h) => h.to_string(),
            None => return false,
        };
        if !is_same_domain(&host, &self.domain, self.include_subdomain) {
            self.rejected_domain
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return false;
        }

        let mut path = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            path.push('?');
            path.push_str(q);
        }
        if !self.robots.allowed(&path) {
            self.rejected_robots
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return false;
        }

        let mut seen = self.seen.lock().await;
        if seen.contains(&canonical) {
            return false;
        }

        let item = CrawlItem {
            url: canonical.clone(),
            depth,
        };
        match self.sender.try_send(item) {
            Ok(()) => {
                seen.insert(&canonical);
                true
            }
            Err(_) => false,
        }
    }

    /// Marks a URL seen without enqueueing — used by resume to replay
    /// already-crawled URLs, and by any caller that wants to suppress
    /// future rediscovery of a specific URL.
    pub async fn mark_seen(&self, raw_url: &str) {
        let canonical = normalize(raw_url);
        if canonical.is_empty() {
            return;
        }
        self.seen.lock().await.insert(&canonical);
    }

    /// Bypasses dedup/domain checks entirely — used when restoring a
    /// saved frontier from `state.duckdb`'s `frontier` table at startup.
    pub async fn push_direct(&self, item: CrawlItem) -> bool {
        let mut seen = self.seen.lock().await;
        match self.sender.try_send(item.clone()) {
            Ok(()) => {
                seen.insert(&item.url);
                true
            }
            Err(_) => false,
        }
    }

    /// Blocks until an item is available or every sender has dropped
    /// (the worker-facing stream).
    pub async fn pop(&self) -> Option<CrawlItem> {
        self.receiver.lock().await.recv().await
    }

    /// Non-blocking removal of everything currently queued — used at
    /// shutdown to persist the remainder into `state.duckdb`'s
    /// `frontier` table.
    pub async fn drain(&self) -> Vec<CrawlItem> {
        let mut rx = self.receiver.lock().await;
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    /// Number of items currently queued. Used by the coordinator's idle
    /// check; racy by nature (a pop can land between the check and the
    /// caller's next read), which is fine since idleness is only declared
    /// after several consecutive empty+no-in-flight ticks.
    pub async fn len(&self) -> usize {
        self.receiver.lock().await.len()
    }

    pub fn rejected_robots_count(&self) -> u64 {
        self.rejected_robots.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn rejected_domain_count(&self) -> u64 {
        self.rejected_domain.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize) -> FrontierConfig {
        FrontierConfig {
            capacity,
            bloom_capacity: 1000,
            bloom_fpr: 0.01,
            domain: "example.com".to_string(),
            include_subdomain: false,
        }
    }

    #[tokio::test]
    async fn try_add_dedups() {
        let f = Frontier::new(config(8), Arc::new(AllowAll));
        assert!(f.try_add("http://example.com/a", 0).await);
        assert!(!f.try_add("http://example.com/a", 0).await);
    }

    #[tokio::test]
    async fn try_add_rejects_other_domains() {
        let f = Frontier::new(config(8), Arc::new(AllowAll));
        assert!(!f.try_add("http://other.com/a", 0).await);
        assert_eq!(f.rejected_domain_count(), 1);
    }

    #[tokio::test]
    async fn bloom_after_enqueue_on_full_queue() {
        let f = Frontier::new(config(1), Arc::new(AllowAll));
        assert!(f.try_add("http://example.com/a", 0).await);
        // queue capacity 1 is now full; a second distinct URL must fail
        // to enqueue AND must not be marked seen, so it can be
        // rediscovered once the queue drains.
        assert!(!f.try_add("http://example.com/b", 0).await);
        let _ = f.pop().await;
        assert!(f.try_add("http://example.com/b", 0).await);
    }

    #[tokio::test]
    async fn mark_seen_suppresses_future_add() {
        let f = Frontier::new(config(8), Arc::new(AllowAll));
        f.mark_seen("http://example.com/a").await;
        assert!(!f.try_add("http://example.com/a", 0).await);
    }

    #[tokio::test]
    async fn drain_returns_all_queued_without_blocking() {
        let f = Frontier::new(config(8), Arc::new(AllowAll));
        f.try_add("http://example.com/a", 0).await;
        f.try_add("http://example.com/b", 0).await;
        let drained = f.drain().await;
        assert_eq!(drained.len(), 2);
    }
}
