pub mod hashing;
pub mod html;
pub mod schema;

use webcrawl_core::{CrawlError, FetchResponse, PageData};

/// Max bytes to parse (5 MB). Larger pages are truncated before parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Assembles a complete [`PageData`] from a fetched response: HTML structure,
/// outbound links, structured data, and both content hashes.
pub fn parse_page(resp: &FetchResponse) -> Result<PageData, CrawlError> {
    let body = if resp.body.len() > MAX_PARSE_SIZE {
        &resp.body[..MAX_PARSE_SIZE]
    } else {
        &resp.body
    };
    let body_str = String::from_utf8_lossy(body);

    let html_result = html::parse_html(&body_str, &resp.final_url);
    let structured_data = schema::extract_structured_data(&body_str, &resp.final_url);
    let hashes = hashing::generate_content_hashes(&body_str);

    let http_header_robots = resp
        .headers
        .get("x-robots-tag")
        .map(|v| v.split(',').map(|s| s.trim().to_lowercase()).collect())
        .unwrap_or_default();

    Ok(PageData {
        title: html_result.title,
        meta_description: html_result.meta_description,
        meta_robots: html_result.meta_robots,
        http_header_robots,
        canonical_url: html_result.canonical_url,
        hreflang_urls: html_result.hreflang_urls,
        html_lang: html_result.html_lang,
        h1_tags: html_result.h1_tags,
        h2_tags: html_result.h2_tags,
        word_count: html_result.word_count,
        links: html_result.links,
        structured_data,
        content_hash_sha256: hashes.sha256,
        content_hash_simhash: hashes.simhash,
        content_length: hashes.content_length,
    })
}
