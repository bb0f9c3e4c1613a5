pub mod config;
pub mod error;
pub mod hash;
pub mod types;
pub mod urlnorm;

pub use config::CrawlerConfig;
pub use error::CrawlError;
pub use types::*;
pub use urlnorm::is_html;
