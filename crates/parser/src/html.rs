//! Title/meta/heading/canonical/hreflang/link extraction from an HTML
//! document, including the anchor-text fallback chain and xpath synthesis.

use ego_tree::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use webcrawl_core::{ExtractedLink, HreflangEntry};

/// Data-* attributes checked by the anchor-text fallback chain, in order.
const DATA_ATTRS: [&str; 5] = ["data-text", "data-label", "data-name", "data-action", "data-target"];
const MEANINGFUL_CLASS_KEYWORDS: [&str; 8] =
    ["skip", "back", "top", "close", "menu", "nav", "button", "link"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub struct HtmlResult {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_robots: Vec<String>,
    pub canonical_url: Option<String>,
    pub hreflang_urls: Vec<HreflangEntry>,
    pub html_lang: Option<String>,
    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    pub word_count: usize,
    pub links: Vec<ExtractedLink>,
}

pub fn parse_html(html_str: &str, base_url: &Url) -> HtmlResult {
    let document = Html::parse_document(html_str);

    let title = select_one(&document, "title")
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let meta_description = meta_content(&document, "description");
    let meta_robots = meta_content(&document, "robots")
        .map(|v| v.to_lowercase().split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    let canonical_url = select_one(&document, r#"link[rel="canonical"]"#)
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| base_url.join(href).ok())
        .map(|u| u.to_string());

    let hreflang_urls = extract_hreflang(&document, base_url);

    let html_lang = select_one(&document, "html")
        .and_then(|el| el.value().attr("lang"))
        .filter(|s| !s.is_empty())
        .or_else(|| select_one(&document, "head").and_then(|el| el.value().attr("lang")))
        .filter(|s| !s.is_empty())
        .or_else(|| select_one(&document, "html").and_then(|el| el.value().attr("xml:lang")))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let h1_tags = text_of_all(&document, "h1");
    let h2_tags = text_of_all(&document, "h2");

    let word_count = visible_text(&document, &["script", "style"])
        .split_whitespace()
        .count();

    let links = extract_links(&document, base_url);

    HtmlResult {
        title,
        meta_description,
        meta_robots,
        canonical_url,
        hreflang_urls,
        html_lang,
        h1_tags,
        h2_tags,
        word_count,
        links,
    }
}

fn selector(sel: &str) -> Option<Selector> {
    Selector::parse(sel).ok()
}

fn select_one<'a>(document: &'a Html, sel: &str) -> Option<ElementRef<'a>> {
    selector(sel).and_then(|s| document.select(&s).next())
}

fn text_of_all(document: &Html, tag: &str) -> Vec<String> {
    let Some(sel) = selector(tag) else { return vec![] };
    document
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let sel_str = format!("meta[name='{name}'], meta[name='{}']", name.to_uppercase());
    select_one(document, &sel_str).and_then(|el| el.value().attr("content").map(str::to_string))
}

fn extract_hreflang(document: &Html, base_url: &Url) -> Vec<HreflangEntry> {
    let Some(sel) = selector(r#"link[rel="alternate"][hreflang]"#) else {
        return vec![];
    };
    document
        .select(&sel)
        .filter_map(|el| {
            let hreflang = el.value().attr("hreflang")?.to_string();
            let href = el.value().attr("href")?;
            let href = base_url.join(href).ok()?.to_string();
            Some(HreflangEntry { hreflang, href })
        })
        .collect()
}

/// Removes the given tag subtrees, then returns whitespace-collapsed visible
/// text.
fn visible_text(document: &Html, skip_tags: &[&str]) -> String {
    let mut out = String::new();
    collect_text(document.tree.root(), skip_tags, &mut out);
    WHITESPACE.replace_all(out.trim(), " ").into_owned()
}

fn collect_text<'a>(node: NodeRef<'a, Node>, skip_tags: &[&str], out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Element(el) if skip_tags.contains(&el.name()) => continue,
            Node::Element(_) => collect_text(child, skip_tags, out),
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            _ => {}
        }
    }
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<ExtractedLink> {
    let Some(sel) = selector("a[href]") else { return vec![] };

    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with("tel:")
                || href.starts_with("data:")
            {
                return None;
            }

            let joined = base_url.join(href).ok()?;
            let original_href = joined.to_string();
            let normalized_url = webcrawl_core::normalize_url(href, Some(base_url))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| original_href.clone());

            let fragment = joined.fragment().map(str::to_string);
            let query_params = joined.query().map(str::to_string);

            let anchor_text = anchor_text_for(el, href);
            let xpath = generate_xpath(el);

            Some(ExtractedLink {
                normalized_url,
                original_href,
                fragment,
                query_params,
                anchor_text,
                xpath,
            })
        })
        .collect()
}

/// First non-empty result wins, in the order specified for outbound-link
/// anchor text.
fn anchor_text_for(a: ElementRef<'_>, href: &str) -> String {
    let text = a.text().collect::<String>().trim().to_string();
    if !text.is_empty() {
        return text;
    }

    if let Some(img) = a.descendants().filter_map(ElementRef::wrap).find(|e| e.value().name() == "img") {
        if let Some(alt) = img.value().attr("alt") {
            let alt = alt.trim();
            if !alt.is_empty() {
                return format!("[IMG: {alt}]");
            }
        }
        if let Some(src) = img.value().attr("src") {
            if let Some(filename) = src.rsplit('/').next() {
                if !filename.is_empty() {
                    return format!("[IMG: {filename}]");
                }
            }
        }
    }

    if let Some(title) = a.value().attr("title") {
        let title = title.trim();
        if !title.is_empty() {
            return format!("[TITLE: {title}]");
        }
    }

    if let Some(aria) = a.value().attr("aria-label") {
        let aria = aria.trim();
        if !aria.is_empty() {
            return format!("[ARIA: {aria}]");
        }
    }

    for attr in DATA_ATTRS {
        if let Some(value) = a.value().attr(attr) {
            let value = value.trim();
            if !value.is_empty() {
                return format!("[DATA: {value}]");
            }
        }
    }

    if let Some(class) = a.value().attr("class") {
        let meaningful: Vec<&str> = class
            .split_whitespace()
            .filter(|c| MEANINGFUL_CLASS_KEYWORDS.iter().any(|kw| c.to_lowercase().contains(kw)))
            .collect();
        if !meaningful.is_empty() {
            return format!("[CLASS: {}]", meaningful.join(" "));
        }
    }

    if let Some(id) = a.value().attr("id") {
        if !id.is_empty() {
            return format!("[ID: {id}]");
        }
    }

    if let Some(fragment) = href.strip_prefix('#') {
        if !fragment.is_empty() {
            return format!("[ANCHOR: {fragment}]");
        }
    }

    if !href.is_empty() && !href.starts_with("javascript:") {
        if let Some(last) = href.split('/').next_back() {
            let cleaned = last.replace(['-', '_'], " ");
            let titled = title_case(&cleaned);
            if titled.len() > 2 {
                return format!("[PATH: {titled}]");
            }
        }
    }

    String::new()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bottom-up xpath synthesis: each ancestor gets a `[n]` suffix when
/// siblings of the same tag exist under its parent.
fn generate_xpath(el: ElementRef<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(el);

    while let Some(node) = current {
        let tag = node.value().name().to_string();
        let segment = match node.parent().and_then(ElementRef::wrap) {
            Some(parent) => {
                let siblings: Vec<ElementRef<'_>> = parent
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|sib| sib.value().name() == tag)
                    .collect();
                if siblings.len() > 1 {
                    let position = siblings.iter().position(|sib| sib.id() == node.id()).unwrap_or(0) + 1;
                    format!("{tag}[{position}]")
                } else {
                    tag
                }
            }
            None => tag,
        };
        segments.push(segment);
        current = node.parent().and_then(ElementRef::wrap);
    }

    segments.reverse();
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn extracts_title_and_meta() {
        let html = r#"<html><head><title> Hello </title>
            <meta name="description" content="a page">
            <meta name="robots" content="noindex, nofollow">
            </head><body></body></html>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.title.as_deref(), Some("Hello"));
        assert_eq!(result.meta_description.as_deref(), Some("a page"));
        assert_eq!(result.meta_robots, vec!["noindex", "nofollow"]);
    }

    #[test]
    fn extracts_canonical_and_hreflang() {
        let html = r#"<html><head>
            <link rel="canonical" href="//example.com/canonical">
            <link rel="alternate" hreflang="fr" href="https://example.com/fr">
            </head><body></body></html>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.canonical_url.as_deref(), Some("https://example.com/canonical"));
        assert_eq!(result.hreflang_urls.len(), 1);
        assert_eq!(result.hreflang_urls[0].hreflang, "fr");
    }

    #[test]
    fn anchor_text_falls_back_to_img_alt() {
        let html = r#"<html><body><a href="/x"><img src="/i.png" alt="a pic"></a></body></html>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.links[0].anchor_text, "[IMG: a pic]");
    }

    #[test]
    fn anchor_text_falls_back_to_path_segment() {
        let html = r#"<html><body><a href="/about-us"></a></body></html>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.links[0].anchor_text, "[PATH: About Us]");
    }

    #[test]
    fn xpath_disambiguates_siblings() {
        let html = r#"<html><body><div><a href="/a">one</a><a href="/b">two</a></div></body></html>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.links[0].xpath, "/html/body/div/a[1]");
        assert_eq!(result.links[1].xpath, "/html/body/div/a[2]");
    }

    #[test]
    fn word_count_excludes_script_and_style() {
        let html = r#"<html><body><script>var x = 1;</script><p>one two three</p></body></html>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.word_count, 3);
    }

    #[test]
    fn html_lang_falls_back_to_xml_lang() {
        let html = r#"<html xml:lang="de"><body></body></html>"#;
        let result = parse_html(html, &base());
        assert_eq!(result.html_lang.as_deref(), Some("de"));
    }
}
