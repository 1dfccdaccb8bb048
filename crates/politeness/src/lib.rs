pub mod breaker;
pub mod pacer;
pub mod robots;
pub mod sitemap;

pub use breaker::CircuitBreakerRegistry;
pub use pacer::Pacer;
pub use robots::{calculate_cache_ttl, robots_url_for, RobotsRegistry, RobotsRules};
pub use sitemap::{parse_sitemap_xml, walk_sitemap, SitemapParseResult, SitemapUrlEntry};
