pub mod html;
pub mod json_links;
pub mod paths;
pub mod srcset;

pub use html::extract;
pub use srcset::parse_srcset;
