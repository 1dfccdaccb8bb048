pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::AppConfig;
pub use error::CrawlError;
pub use normalize::{classify_url, normalize_url};
pub use types::*;
