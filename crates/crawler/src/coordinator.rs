//! Drain detection, max-pages cutoff, continuous re-seed (C8).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::info;

use spindle_core::CrawlerConfig;
use spindle_discovery::{discover_sitemap_urls, RobotsRules};
use spindle_frontier::Frontier;
use spindle_networks::TransportPool;

use crate::stats::Stats;

const TICK: Duration = Duration::from_millis(200);
/// `empty` reaching this threshold at 200ms/tick is ~3s of sustained idleness.
const IDLE_TICKS: u32 = 15;

pub struct Coordinator {
    pub frontier: Arc<Frontier>,
    pub transport: Arc<TransportPool>,
    pub stats: Arc<Stats>,
    pub config: Arc<CrawlerConfig>,
    pub robots: Arc<RobotsRules>,
    pub cancel: CancellationToken,
}

impl Coordinator {
    pub async fn run(self) {
        let mut empty = 0u32;
        let mut last_reseed = Instant::now();

        loop {
            tokio::time::sleep(TICK).await;

            if self.cancel.is_cancelled() {
                return;
            }

            if self.config.max_pages > 0 && self.stats.success_count() >= self.config.max_pages {
                info!(pages = self.stats.success_count(), "max_pages reached");
                self.cancel.cancel();
                return;
            }

            let idle = self.frontier.len().await == 0 && self.stats.in_flight() == 0;
            if idle {
                empty += 1;
                if empty >= IDLE_TICKS {
                    if !self.config.continuous {
                        info!("frontier drained, stopping");
                        self.cancel.cancel();
                        return;
                    }
                    if last_reseed.elapsed() >= self.config.reseed_interval {
                        let added = self.reseed().await;
                        self.stats.record_reseed();
                        last_reseed = Instant::now();
                        if added > 0 {
                            empty = 0;
                        }
                        // else: hold `empty` at IDLE_TICKS and re-check next tick.
                    }
                }
            } else {
                empty = 0;
            }
        }
    }

    /// Re-invokes sitemap discovery, then directly fetches the domain root
    /// (bypassing the frontier for the root itself, but not for its
    /// children) and re-offers every internal link at depth 1.
    async fn reseed(&self) -> usize {
        let mut added = 0usize;

        let sitemap_urls = discover_sitemap_urls(
            self.transport.shard(0),
            &format!("https://{}", self.config.domain),
            self.robots.sitemaps(),
            10_000,
        )
        .await;
        for url in sitemap_urls {
            if self.frontier.try_add(&url, 0).await {
                added += 1;
            }
        }

        let root = format!("https://{}/", self.config.domain);
        if let Ok(resp) = self.transport.shard(0).get(&root).send().await {
            if let Ok(body) = resp.bytes().await {
                let extracted = spindle_parser::extract(&body, &root, &self.config.domain, self.config.extract_images);
                for link in extracted.links {
                    if link.is_internal && self.frontier.try_add(&link.target_url, 1).await {
                        added += 1;
                    }
                }
            }
        }

        info!(added, "reseed complete");
        added
    }
}
