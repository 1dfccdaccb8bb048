use std::collections::HashSet;

use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;
use webcrawl_core::{FetchConfig, HreflangEntry};
use webcrawl_transport::FetchTransport;

/// One `<url>` entry from a sitemap.
#[derive(Debug, Clone)]
pub struct SitemapUrlEntry {
    pub loc: String,
    pub priority: Option<f64>,
    pub lastmod: Option<String>,
    pub hreflangs: Vec<HreflangEntry>,
}

#[derive(Debug, Default)]
pub struct SitemapParseResult {
    pub is_index: bool,
    /// Present when `is_index` -- child sitemap URLs to follow.
    pub child_sitemaps: Vec<String>,
    pub urls: Vec<SitemapUrlEntry>,
}

/// Parses either a `<sitemapindex>` or a `<urlset>` document. Recognizes
/// both plain `loc`/`priority`/`lastmod` and `xhtml:link rel=alternate
/// hreflang=...` entries nested under a `<url>`.
pub fn parse_sitemap_xml(body: &str) -> SitemapParseResult {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut result = SitemapParseResult::default();
    let mut buf = Vec::new();

    let mut in_sitemap_tag = false;
    let mut in_url_tag = false;
    let mut current_loc: Option<String> = None;
    let mut current_priority: Option<f64> = None;
    let mut current_lastmod: Option<String> = None;
    let mut current_hreflangs: Vec<HreflangEntry> = Vec::new();
    let mut text_buf = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "sitemapindex" => result.is_index = true,
                    "sitemap" => in_sitemap_tag = true,
                    "url" => in_url_tag = true,
                    "xhtml:link" | "link" => {
                        if in_url_tag {
                            let mut hreflang = None;
                            let mut href = None;
                            let mut rel_is_alternate = false;
                            for attr in e.attributes().flatten() {
                                let key = local_name(attr.key.as_ref());
                                let value =
                                    attr.decode_and_unescape_value(reader.decoder()).unwrap_or_default();
                                match key.as_str() {
                                    "rel" => rel_is_alternate = value == "alternate",
                                    "hreflang" => hreflang = Some(value.to_string()),
                                    "href" => href = Some(value.to_string()),
                                    _ => {}
                                }
                            }
                            if rel_is_alternate {
                                if let (Some(hreflang), Some(href)) = (hreflang, href) {
                                    current_hreflangs.push(HreflangEntry { hreflang, href });
                                }
                            }
                        }
                    }
                    _ => {}
                }
                text_buf.clear();
            }
            Ok(Event::Text(t)) => {
                text_buf.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "loc" => {
                        if !text_buf.is_empty() {
                            current_loc = Some(text_buf.trim().to_string());
                        }
                    }
                    "priority" => current_priority = text_buf.trim().parse::<f64>().ok(),
                    "lastmod" => current_lastmod = Some(text_buf.trim().to_string()),
                    "sitemap" => {
                        in_sitemap_tag = false;
                        if let Some(loc) = current_loc.take() {
                            result.child_sitemaps.push(loc);
                        }
                        current_priority = None;
                        current_lastmod = None;
                    }
                    "url" => {
                        in_url_tag = false;
                        if let Some(loc) = current_loc.take() {
                            result.urls.push(SitemapUrlEntry {
                                loc,
                                priority: current_priority.take(),
                                lastmod: current_lastmod.take(),
                                hreflangs: std::mem::take(&mut current_hreflangs),
                            });
                        }
                    }
                    _ => {}
                }
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let _ = in_sitemap_tag;
    result
}

/// Recursively follows a sitemap index with cycle detection, returning the
/// flattened set of URL entries discovered across all child sitemaps.
pub async fn walk_sitemap(
    transport: &dyn FetchTransport,
    config: &FetchConfig,
    start: &Url,
    max_sitemaps: usize,
) -> Vec<(String, Vec<SitemapUrlEntry>)> {
    let mut visited = HashSet::new();
    let mut queue = vec![start.clone()];
    let mut results = Vec::new();

    while let Some(next) = queue.pop() {
        if visited.len() >= max_sitemaps || !visited.insert(next.to_string()) {
            continue;
        }

        let response = match transport.fetch(&next, config).await {
            Ok(resp) if (200..300).contains(&resp.final_status) => resp,
            _ => continue,
        };
        let body = String::from_utf8_lossy(&response.body).into_owned();
        let parsed = parse_sitemap_xml(&body);

        if parsed.is_index {
            for child in parsed.child_sitemaps {
                if let Ok(child_url) = next.join(&child) {
                    queue.push(child_url);
                }
            }
        } else {
            results.push((next.to_string(), parsed.urls));
        }
    }

    results
}

/// Returns the tag name as-is (prefix included, e.g. `xhtml:link`) so
/// namespaced and bare tags can both be matched by the caller.
fn local_name(qname: &[u8]) -> String {
    String::from_utf8_lossy(qname).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_with_hreflang() {
        let xml = r#"<?xml version="1.0"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
                xmlns:xhtml="http://www.w3.org/1999/xhtml">
          <url>
            <loc>https://example.com/en</loc>
            <priority>0.8</priority>
            <xhtml:link rel="alternate" hreflang="fr" href="https://example.com/fr"/>
          </url>
        </urlset>"#;
        let parsed = parse_sitemap_xml(xml);
        assert!(!parsed.is_index);
        assert_eq!(parsed.urls.len(), 1);
        assert_eq!(parsed.urls[0].loc, "https://example.com/en");
        assert_eq!(parsed.urls[0].priority, Some(0.8));
        assert_eq!(parsed.urls[0].hreflangs.len(), 1);
        assert_eq!(parsed.urls[0].hreflangs[0].hreflang, "fr");
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<sitemapindex>
          <sitemap><loc>https://example.com/sitemap-a.xml</loc></sitemap>
          <sitemap><loc>https://example.com/sitemap-b.xml</loc></sitemap>
        </sitemapindex>"#;
        let parsed = parse_sitemap_xml(xml);
        assert!(parsed.is_index);
        assert_eq!(parsed.child_sitemaps.len(), 2);
    }
}
