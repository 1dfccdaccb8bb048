use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Status of a frontier entry. Stored as text; see `FrontierStatus::as_str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontierStatus {
    Queued,
    Pending,
    Done,
}

impl FrontierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrontierStatus::Queued => "queued",
            FrontierStatus::Pending => "pending",
            FrontierStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for FrontierStatus {
    type Err = crate::error::CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(FrontierStatus::Queued),
            "pending" => Ok(FrontierStatus::Pending),
            "done" => Ok(FrontierStatus::Done),
            other => Err(crate::error::CrawlError::Parse(format!(
                "unknown frontier status: {other}"
            ))),
        }
    }
}

/// What kind of resource a URL points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlKind {
    Html,
    Sitemap,
    SitemapIndex,
    Image,
    Asset,
    Other,
}

impl UrlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlKind::Html => "html",
            UrlKind::Sitemap => "sitemap",
            UrlKind::SitemapIndex => "sitemap_index",
            UrlKind::Image => "image",
            UrlKind::Asset => "asset",
            UrlKind::Other => "other",
        }
    }
}

/// A URL's relationship to the base host being crawled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlClassification {
    Internal,
    Subdomain,
    Network,
    External,
    Social,
}

impl UrlClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlClassification::Internal => "internal",
            UrlClassification::Subdomain => "subdomain",
            UrlClassification::Network => "network",
            UrlClassification::External => "external",
            UrlClassification::Social => "social",
        }
    }
}

/// Authentication scheme applied to outbound fetches for a restricted host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Basic,
    Digest,
    Bearer,
    Jwt,
    ApiKey,
    Custom,
}

/// Format a structured-data item was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserFormat {
    JsonLd,
    Microdata,
    Rdfa,
}

impl ParserFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserFormat::JsonLd => "json-ld",
            ParserFormat::Microdata => "microdata",
            ParserFormat::Rdfa => "rdfa",
        }
    }
}

/// Severity of a structured-data validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl SchemaSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaSeverity::Info => "info",
            SchemaSeverity::Warning => "warning",
            SchemaSeverity::Error => "error",
            SchemaSeverity::Critical => "critical",
        }
    }
}

/// Source a canonical or indexability signal was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveSource {
    RobotsTxt,
    HtmlMeta,
    HttpHeader,
}

impl DirectiveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveSource::RobotsTxt => "robots_txt",
            DirectiveSource::HtmlMeta => "html_meta",
            DirectiveSource::HttpHeader => "http_header",
        }
    }
}

/// Configuration for a single fetch attempt, passed to a `FetchTransport`.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub follow_redirects: bool,
    pub user_agent: String,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub auth: Option<AuthConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_body_size: 10 * 1024 * 1024,
            follow_redirects: true,
            user_agent: String::new(),
            if_none_match: None,
            if_modified_since: None,
            auth: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub auth_type: AuthType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub header_name: Option<String>,
    pub restrict_to_host: Option<String>,
    pub custom_headers: HashMap<String, String>,
}

/// A single hop in a redirect chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
}

/// Result of a single fetch attempt, possibly after following redirects.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub initial_status: u16,
    pub final_status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
    pub redirect_chain: Vec<RedirectHop>,
}

impl FetchResponse {
    /// Sentinel response for a transport that never completed the request.
    pub fn transport_failure(url: Url) -> Self {
        Self {
            final_url: url.clone(),
            url,
            initial_status: 0,
            final_status: 0,
            headers: HashMap::new(),
            body: Vec::new(),
            content_type: None,
            fetched_at: chrono::Utc::now(),
            response_time_ms: 0,
            redirect_chain: Vec::new(),
        }
    }
}

/// A single outbound link discovered in an HTML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub normalized_url: String,
    pub original_href: String,
    pub fragment: Option<String>,
    pub query_params: Option<String>,
    pub anchor_text: String,
    pub xpath: String,
}

/// A hreflang alternate found in a sitemap, `<head>`, or HTTP header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HreflangEntry {
    pub hreflang: String,
    pub href: String,
}

/// One structured-data item extracted from a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInstance {
    pub schema_type: String,
    pub format: ParserFormat,
    pub raw_data: String,
    pub parsed_data: serde_json::Value,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub severity: SchemaSeverity,
    pub is_main_entity: bool,
    pub property_name: Option<String>,
    pub parent_index: Option<usize>,
}

/// Everything extracted from one HTML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageData {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_robots: Vec<String>,
    pub http_header_robots: Vec<String>,
    pub canonical_url: Option<String>,
    pub hreflang_urls: Vec<HreflangEntry>,
    pub html_lang: Option<String>,
    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    pub word_count: usize,
    pub links: Vec<ExtractedLink>,
    pub structured_data: Vec<SchemaInstance>,
    pub content_hash_sha256: String,
    pub content_hash_simhash: u64,
    pub content_length: usize,
}
