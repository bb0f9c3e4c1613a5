use serde::Deserialize;

/// Top-level crawl configuration. All fields are optional with the
/// defaults below; unrecognized keys are rejected rather than silently
/// ignored, so a typo'd config field fails fast instead of quietly
/// running with the default.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct CrawlerConfig {
    pub domain: String,
    pub seed_urls: Vec<String>,
    pub seed_file: Option<String>,

    pub workers: usize,
    /// Nominal total-connection budget. `reqwest` has no single "max total
    /// connections" knob to hand this to; `max_idle_conns` (split across
    /// `transport_shards`) is the actual lever the transport pool wires up.
    pub max_conns: usize,
    pub max_idle_conns: usize,
    pub transport_shards: usize,

    #[serde(with = "secs")]
    pub timeout: std::time::Duration,

    pub max_depth: u32,
    pub max_pages: u64,
    pub max_body_size: usize,
    pub user_agent: String,
    pub data_dir: String,

    pub shard_count: u32,
    pub batch_size: usize,
    pub store_body: bool,
    pub store_links: bool,

    pub respect_robots: bool,
    pub follow_sitemap: bool,
    pub resume: bool,

    pub frontier_size: usize,
    pub bloom_capacity: usize,
    pub bloom_fpr: f64,

    pub rate_limit: u32,
    pub include_subdomain: bool,
    pub force_http1: bool,

    pub continuous: bool,
    #[serde(with = "secs")]
    pub reseed_interval: std::time::Duration,

    pub extract_images: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            seed_urls: Vec::new(),
            seed_file: None,
            workers: 1000,
            max_conns: 200,
            max_idle_conns: 500,
            transport_shards: 16,
            timeout: std::time::Duration::from_secs(10),
            max_depth: 0,
            max_pages: 0,
            max_body_size: 512 * 1024,
            user_agent: "spindle/0.1 (+https://github.com/spindle-crawl/spindle)".to_string(),
            data_dir: "./data".to_string(),
            shard_count: 8,
            batch_size: 500,
            store_body: false,
            store_links: true,
            respect_robots: true,
            follow_sitemap: true,
            resume: false,
            frontier_size: 4_000_000,
            bloom_capacity: 50_000_000,
            bloom_fpr: 0.001,
            rate_limit: 0,
            include_subdomain: false,
            force_http1: false,
            continuous: false,
            reseed_interval: std::time::Duration::from_secs(30),
            extract_images: false,
        }
    }
}

impl CrawlerConfig {
    /// Directory this crawl's artifacts are persisted under:
    /// `{data_dir}/{normalized_domain}/`.
    pub fn domain_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join(&self.domain)
    }

    pub fn results_dir(&self) -> std::path::PathBuf {
        self.domain_dir().join("results")
    }

    pub fn state_path(&self) -> std::path::PathBuf {
        self.domain_dir().join("state.duckdb")
    }
}

/// `toml` has no native `Duration` support; durations are encoded as
/// plain integer seconds, matching the teacher's config convention.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CrawlerConfig::default();
        assert_eq!(cfg.workers, 1000);
        assert_eq!(cfg.transport_shards, 16);
        assert_eq!(cfg.shard_count, 8);
        assert_eq!(cfg.batch_size, 500);
        assert!(cfg.store_links);
        assert!(!cfg.store_body);
        assert_eq!(cfg.bloom_fpr, 0.001);
        assert_eq!(cfg.reseed_interval.as_secs(), 30);
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml_str = "domain = \"example.com\"\nbogus_field = 1\n";
        let result: Result<CrawlerConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn parses_partial_overrides() {
        let toml_str = "domain = \"example.com\"\nworkers = 50\ntimeout = 5\n";
        let cfg: CrawlerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.domain, "example.com");
        assert_eq!(cfg.workers, 50);
        assert_eq!(cfg.timeout.as_secs(), 5);
        assert_eq!(cfg.shard_count, 8);
    }
}
