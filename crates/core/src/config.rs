use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from TOML and overridable by a small set
/// of environment variables (see `main.rs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub pacer: PacerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub auth: Option<AuthSettings>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            http: HttpConfig::default(),
            pacer: PacerConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            robots: RobotsConfig::default(),
            auth: None,
            database: DatabaseConfig::default(),
            frontier: FrontierConfig::default(),
        }
    }
}

fn default_max_depth() -> u32 {
    3
}
fn default_max_pages() -> u64 {
    0
}
fn default_same_host_only() -> bool {
    true
}
fn default_user_agent() -> String {
    "webcrawl/0.1 (+https://example.invalid/bot)".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root URL of the crawl. The host defines the base domain.
    #[serde(default)]
    pub start_url: Option<String>,
    /// Optional path to a CSV file of seed URLs.
    #[serde(default)]
    pub csv_urls: Option<String>,
    /// If true the CSV set is a hard whitelist rather than extra seeds.
    #[serde(default)]
    pub csv_seed_mode: bool,
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_same_host_only")]
    pub same_host_only: bool,
    #[serde(default)]
    pub path_restriction: Option<String>,
    #[serde(default)]
    pub path_exclude_prefixes: Vec<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub reset_frontier: bool,
}

fn default_concurrency() -> usize {
    5
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            start_url: None,
            csv_urls: None,
            csv_seed_mode: false,
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            same_host_only: default_same_host_only(),
            path_restriction: None,
            path_exclude_prefixes: Vec::new(),
            allowed_domains: Vec::new(),
            concurrency: default_concurrency(),
            reset_frontier: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    20
}
fn default_max_body_mb() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_body_mb")]
    pub max_body_size_mb: u64,
    #[serde(default = "default_true")]
    pub enable_http2: bool,
    #[serde(default = "default_true")]
    pub enable_brotli: bool,
    #[serde(default = "default_true")]
    pub enable_conditional_requests: bool,
    /// Use a headless-browser transport when available, falling back to
    /// plain HTTP otherwise.
    #[serde(default)]
    pub use_browser: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_mb(),
            enable_http2: true,
            enable_brotli: true,
            enable_conditional_requests: true,
            use_browser: false,
        }
    }
}

fn default_base_delay() -> f64 {
    0.2
}
fn default_min_delay() -> f64 {
    0.1
}
fn default_max_delay() -> f64 {
    10.0
}
fn default_increase_factor() -> f64 {
    1.5
}
fn default_decrease_factor() -> f64 {
    0.9
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacerConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
    #[serde(default = "default_increase_factor")]
    pub increase_factor: f64,
    #[serde(default = "default_decrease_factor")]
    pub decrease_factor: f64,
    #[serde(default = "default_true")]
    pub enable_adaptive_delay: bool,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            increase_factor: default_increase_factor(),
            decrease_factor: default_decrease_factor(),
            enable_adaptive_delay: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> f64 {
    1.0
}
fn default_retry_backoff() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            retry_backoff_factor: default_retry_backoff(),
        }
    }
}

fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_timeout() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_breaker_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_timeout")]
    pub recovery_timeout_secs: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_breaker_threshold(),
            recovery_timeout_secs: default_breaker_timeout(),
        }
    }
}

fn default_robots_ttl() -> u64 {
    86_400
}
fn default_sitemap_ttl() -> u64 {
    3_600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsConfig {
    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,
    #[serde(default)]
    pub ignore_robots_crawlability: bool,
    #[serde(default)]
    pub skip_robots_sitemaps: bool,
    #[serde(default)]
    pub skip_sitemaps: bool,
    #[serde(default = "default_robots_ttl")]
    pub robots_ttl_secs: u64,
    #[serde(default = "default_sitemap_ttl")]
    pub sitemap_ttl_secs: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            respect_robots_txt: true,
            ignore_robots_crawlability: false,
            skip_robots_sitemaps: false,
            skip_sitemaps: false,
            robots_ttl_secs: default_robots_ttl(),
            sitemap_ttl_secs: default_sitemap_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub auth_type: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub header_name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub custom_headers: std::collections::HashMap<String, String>,
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_sqlite_path() -> String {
    "webcrawl.db".to_string()
}
fn default_pool_size() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// "postgresql" or "sqlite"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            postgres_url: None,
            sqlite_path: default_sqlite_path(),
            max_connections: default_pool_size(),
        }
    }
}

fn default_max_reset_attempts() -> u32 {
    5
}
fn default_rescoring_interval() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierConfig {
    /// Pending entries beyond this many reset cycles are forced to `done`.
    #[serde(default = "default_max_reset_attempts")]
    pub max_reset_attempts: u32,
    #[serde(default = "default_rescoring_interval")]
    pub rescoring_interval_batches: u32,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            max_reset_attempts: default_max_reset_attempts(),
            rescoring_interval_batches: default_rescoring_interval(),
        }
    }
}
