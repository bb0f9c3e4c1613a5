//! Sharded batched result store (C3). `ResultStore` owns `shard_count`
//! independent DuckDB files under `{data_dir}/{domain}/results/`; pages are
//! sharded by `fnv1a_32(url)` and links by `fnv1a_32(target_url)`, so a page
//! and every link pointing at it land on the same shard file, which is what
//! makes `load_pending_links` a local per-shard scan.

pub mod shard;
pub mod state;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use spindle_core::{hash, CrawlError, CrawlerConfig, LinkRecord, PageRecord};

pub use state::StateStore;

use shard::Shard;

pub struct ResultStore {
    shards: Vec<Shard>,
    shard_count: u32,
    flushed_count: Arc<AtomicU64>,
}

impl ResultStore {
    pub fn open(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let dir = config.results_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CrawlError::Storage(format!("creating results dir: {e}")))?;

        let flushed_count = Arc::new(AtomicU64::new(0));
        let mut shards = Vec::with_capacity(config.shard_count as usize);
        for i in 0..config.shard_count {
            let path = dir.join(format!("results_{i:03}.duckdb"));
            shards.push(Shard::open(path, i, config.batch_size, flushed_count.clone())?);
        }

        info!(shard_count = config.shard_count, dir = %dir.display(), "result store opened");
        Ok(Self {
            shards,
            shard_count: config.shard_count,
            flushed_count,
        })
    }

    fn page_shard(&self, url: &str) -> &Shard {
        &self.shards[hash::shard_of(url, self.shard_count) as usize]
    }

    fn link_shard(&self, target_url: &str) -> &Shard {
        &self.shards[hash::shard_of(target_url, self.shard_count) as usize]
    }

    pub async fn add_page(&self, record: PageRecord) -> Result<(), CrawlError> {
        self.page_shard(&record.url).handle.add_page(record).await
    }

    /// Routes each link to the shard of its *target* URL, per the C3
    /// sharding contract, then flushes per-shard sub-batches once all links
    /// have been bucketed.
    pub async fn add_links(&self, links: Vec<LinkRecord>) -> Result<(), CrawlError> {
        let mut by_shard: Vec<Vec<LinkRecord>> = (0..self.shard_count).map(|_| Vec::new()).collect();
        for link in links {
            let idx = hash::shard_of(&link.target_url, self.shard_count) as usize;
            by_shard[idx].push(link);
        }
        for (idx, batch) in by_shard.into_iter().enumerate() {
            if !batch.is_empty() {
                self.shards[idx].handle.add_links(batch).await?;
            }
        }
        Ok(())
    }

    pub fn flushed_count(&self) -> u64 {
        self.flushed_count.load(Ordering::Relaxed)
    }

    /// Streams every URL ever written to any shard's `pages` table through
    /// `mark_seen`. Used on `resume=true` startup so the frontier's bloom
    /// reflects everything already crawled.
    pub async fn load_existing_urls(&self, mut mark_seen: impl FnMut(&str)) -> Result<(), CrawlError> {
        for shard in &self.shards {
            for url in shard.scan_pages().await? {
                mark_seen(&url);
            }
        }
        Ok(())
    }

    /// Streams internal links whose target has no page row yet, re-offering
    /// each to `try_add`. A per-shard local scan, because sharding
    /// co-locates a page with the links that target it.
    pub async fn load_pending_links(
        &self,
        mut try_add: impl FnMut(&str, u32) -> bool,
    ) -> Result<(), CrawlError> {
        for shard in &self.shards {
            for url in shard.scan_pending_links().await? {
                try_add(&url, 0);
            }
        }
        Ok(())
    }

    /// Flushes partial batches, closes writer channels, and waits for every
    /// shard's writer to drain before returning.
    pub async fn close(self) -> Result<(), CrawlError> {
        for shard in self.shards {
            shard.close().await?;
        }
        Ok(())
    }
}

pub fn open_state(data_dir_domain: &Path) -> Result<StateStore, CrawlError> {
    StateStore::open(&data_dir_domain.join("state.duckdb"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::PageRecord;

    fn test_config(dir: &std::path::Path) -> CrawlerConfig {
        let mut cfg = CrawlerConfig::default();
        cfg.domain = "example.com".to_string();
        cfg.data_dir = dir.to_string_lossy().to_string();
        cfg.shard_count = 2;
        cfg.batch_size = 2;
        cfg
    }

    fn page(url: &str) -> PageRecord {
        PageRecord {
            url: url.to_string(),
            url_hash: hash::xxhash64(url.as_bytes()),
            depth: 0,
            status_code: 200,
            content_type: Some("text/html".into()),
            content_length: Some(10),
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
            fetch_time_ms: 5,
            crawled_at: chrono::Utc::now(),
            error: None,
        }
    }

    #[tokio::test]
    async fn add_page_and_close_flushes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let store = ResultStore::open(&cfg).unwrap();
        store.add_page(page("https://example.com/a")).await.unwrap();
        store.add_page(page("https://example.com/b")).await.unwrap();
        store.close().await.unwrap();

        let path = cfg.results_dir().join(format!(
            "results_{:03}.duckdb",
            hash::shard_of("https://example.com/a", 2)
        ));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn load_existing_urls_sees_everything_written() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let store = ResultStore::open(&cfg).unwrap();
        store.add_page(page("https://example.com/a")).await.unwrap();
        store.add_page(page("https://example.com/b")).await.unwrap();
        store.close().await.unwrap();

        let store = ResultStore::open(&cfg).unwrap();
        let mut seen = Vec::new();
        store.load_existing_urls(|u| seen.push(u.to_string())).await.unwrap();
        store.close().await.unwrap();
        seen.sort();
        assert_eq!(
            seen,
            vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()]
        );
    }
}
