use thiserror::Error;

/// Failure modes surfaced while building or opening a crawl. Per-URL
/// fetch/parse/storage failures are recorded on the `PageRecord` itself
/// (see `PageRecord::error`) rather than propagated through this enum —
/// it covers construction-time failures that should abort startup.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
