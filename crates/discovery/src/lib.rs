pub mod robots;
pub mod sitemap;

pub use robots::{fetch_robots, RobotsRules};
pub use sitemap::discover_sitemap_urls;
