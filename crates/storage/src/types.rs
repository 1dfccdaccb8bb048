//! Batch-write payloads accepted by [`crate::Store`]. The crawl engine
//! assembles one of these per iteration; the store resolves all URL
//! identities in bulk rather than one row at a time.

use std::collections::HashMap;

use webcrawl_core::{RedirectHop, SchemaInstance, UrlKind};

/// Row accepted by `upsert_urls`.
#[derive(Debug, Clone)]
pub struct UrlUpsert {
    pub url: String,
    pub kind: UrlKind,
    pub base_domain: String,
    pub discovered_from: Option<String>,
    pub is_from_sitemap: bool,
    /// True when this URL was discovered through a hreflang alternate,
    /// which classifies it `network` rather than `external`/`subdomain`.
    pub from_hreflang: bool,
}

/// Row accepted by `enqueue_frontier`.
#[derive(Debug, Clone)]
pub struct FrontierSeed {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub base_domain: String,
    pub sitemap_priority: Option<f64>,
}

/// One claimed frontier row, ready to fetch.
#[derive(Debug, Clone)]
pub struct FrontierJob {
    pub url_id: i64,
    pub url: String,
    pub depth: u32,
}

/// Row accepted by `write_pages`.
#[derive(Debug, Clone)]
pub struct PageWrite {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub html: Vec<u8>,
    pub initial_status_code: u16,
    pub final_status_code: u16,
    pub final_url: String,
    pub redirect_destination: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// Row accepted by `write_content_with_url_resolution`.
#[derive(Debug, Clone)]
pub struct ContentWrite {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_robots: Vec<String>,
    pub http_header_robots: Vec<String>,
    pub canonical_url: Option<String>,
    pub hreflang_html_head: Vec<(String, String)>,
    pub html_lang: Option<String>,
    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    pub word_count: usize,
    pub crawl_depth: u32,
    pub content_hash_sha256: String,
    pub content_hash_simhash: u64,
    pub content_length: usize,
    pub structured_data: Vec<SchemaInstance>,
    pub initial_status_code: u16,
    pub robots_txt_allows: bool,
    pub robots_txt_reason: Option<String>,
    /// `(is_allow, path)` pairs from `RobotsRules::matching_rules`, the
    /// robots.txt rules that matched this URL's path.
    pub robots_txt_directives: Vec<(bool, String)>,
}

/// Row accepted by `write_internal_links`.
#[derive(Debug, Clone)]
pub struct LinkWrite {
    pub source_url: String,
    pub normalized_target: String,
    pub href_url: String,
    pub anchor_text: String,
    pub xpath: String,
    pub fragment: Option<String>,
    pub query_params: Option<String>,
}

/// Row accepted by `write_redirects`.
#[derive(Debug, Clone)]
pub struct RedirectWrite {
    pub source_url: String,
    pub target_url: String,
    pub chain: Vec<RedirectHop>,
    pub final_status_code: u16,
}

/// Row accepted by `write_sitemaps_and_urls`.
#[derive(Debug, Clone)]
pub struct SitemapWrite {
    pub sitemap_url: String,
    pub is_sitemap_index: bool,
    pub parent_sitemap_url: Option<String>,
    pub base_domain: String,
    pub entries: Vec<SitemapEntry>,
}

#[derive(Debug, Clone)]
pub struct SitemapEntry {
    pub url: String,
    pub position: u32,
    pub priority: Option<f64>,
}

/// Row accepted by `write_hreflang_sitemap`/`write_hreflang_http_header`.
#[derive(Debug, Clone)]
pub struct HreflangWrite {
    pub url: String,
    pub hreflang: String,
    pub href: String,
}

/// Result of `urls_ready_for_retry`.
#[derive(Debug, Clone)]
pub struct RetryCandidate {
    pub url_id: i64,
    pub url: String,
}

/// Anchor text, when UTF-8 encoded, must fit within the backend's index-key
/// length limit.
pub const MAX_ANCHOR_TEXT_BYTES: usize = 2000;

/// Truncates `s` to at most `max_bytes` bytes on a char boundary, stripping a
/// trailing replacement character if the cut lands mid-sequence.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].trim_end_matches('\u{FFFD}').to_string()
}
