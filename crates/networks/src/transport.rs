//! Sharded HTTP/2 connection pool (C6). `TransportPool` owns `S`
//! independent `reqwest::Client`s, each with its own idle-connection cache;
//! a worker borrows one by `worker_id mod S` for the lifetime of a single
//! request. Sharding spreads TCP fan-out across more sockets than a single
//! `reqwest::Client` would keep warm; it has no effect on correctness, since
//! any shard can fetch any URL.

use std::time::Duration;

use reqwest::redirect::Policy;
use tracing::debug;

use spindle_core::{CrawlError, CrawlerConfig};

const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_REDIRECTS: usize = 5;

pub struct TransportPool {
    shards: Vec<reqwest::Client>,
}

impl TransportPool {
    /// Builds `config.transport_shards` independent clients, each with
    /// `max_idle_conns / transport_shards` idle connections cached per host
    /// (clamped to at least 1 per shard).
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let shard_count = config.transport_shards.max(1);
        let per_shard_idle = (config.max_idle_conns / shard_count).max(1);
        debug!(
            shard_count,
            max_conns = config.max_conns,
            per_shard_idle,
            "building transport pool (max_conns has no effect, see CrawlerConfig::max_conns doc)"
        );

        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            let mut builder = reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .timeout(config.timeout)
                .pool_max_idle_per_host(per_shard_idle)
                .pool_idle_timeout(IDLE_TIMEOUT)
                .redirect(Policy::limited(MAX_REDIRECTS))
                // Compression is decoded explicitly by the worker so it can
                // observe the original `Content-Encoding` and enforce
                // `max_body_size` on the compressed byte stream.
                .no_gzip()
                .no_brotli()
                .no_deflate();

            // `reqwest` negotiates H/2 over TLS via ALPN by default and
            // falls back to H/1.1 cleanly; `force_http1` is the only case
            // that needs an explicit override, per the "must fall through
            // to H/1 cleanly" transport requirement.
            if config.force_http1 {
                builder = builder.http1_only();
            }

            let client = builder
                .build()
                .map_err(|e| CrawlError::Config(format!("building transport shard: {e}")))?;
            shards.push(client);
        }

        Ok(Self { shards })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Borrows the pool assigned to `worker_id`. The mapping is `worker_id
    /// mod shard_count`; any shard can serve any request.
    pub fn shard(&self, worker_id: usize) -> &reqwest::Client {
        &self.shards[worker_id % self.shards.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_configured_shard_count() {
        let mut cfg = CrawlerConfig::default();
        cfg.transport_shards = 4;
        let pool = TransportPool::new(&cfg).unwrap();
        assert_eq!(pool.shard_count(), 4);
    }

    #[test]
    fn worker_id_wraps_around_shard_count() {
        let mut cfg = CrawlerConfig::default();
        cfg.transport_shards = 3;
        let pool = TransportPool::new(&cfg).unwrap();
        let a = pool.shard(0) as *const _;
        let b = pool.shard(3) as *const _;
        assert_eq!(a, b);
    }
}
