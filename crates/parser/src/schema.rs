//! Structured-data extraction: JSON-LD, Microdata, and RDFa, plus the
//! validation rules and main-entity/property-hierarchy logic carried forward
//! from the reference implementation's schema validator.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use webcrawl_core::{ParserFormat, SchemaInstance, SchemaSeverity};

const PROPERTY_TYPES: [&str; 9] = [
    "imageobject",
    "videoobject",
    "breadcrumblist",
    "offer",
    "aggregaterating",
    "review",
    "author",
    "publisher",
    "organization",
];

const MAIN_ENTITY_PRIORITY: [&str; 10] = [
    "webpage", "article", "product", "event", "recipe", "review", "localbusiness", "organization",
    "person", "website",
];

static SCHEMA_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://schema\.org/[A-Za-z]+").unwrap());

pub fn extract_structured_data(html_str: &str, base_url: &Url) -> Vec<SchemaInstance> {
    let document = Html::parse_document(html_str);

    let mut items = extract_json_ld(&document, base_url);
    items.extend(extract_microdata(&document, base_url));
    items.extend(extract_rdfa(&document, base_url));
    items.extend(detect_broken_schema(&document));

    assign_hierarchy(&mut items);
    items
}

fn extract_json_ld(document: &Html, base_url: &Url) -> Vec<SchemaInstance> {
    let Some(sel) = Selector::parse(r#"script[type="application/ld+json"]"#).ok() else {
        return vec![];
    };

    let mut out = Vec::new();
    for script in document.select(&sel) {
        let raw = script.text().collect::<String>();
        let raw_trimmed = raw.trim();
        if raw_trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(raw_trimmed) {
            Ok(Value::Array(items)) => {
                for item in items {
                    if let Some(instance) = process_json_ld_item(item, raw_trimmed, base_url) {
                        out.push(instance);
                    }
                }
            }
            Ok(data) => {
                if let Some(graph) = data.get("@graph").and_then(Value::as_array) {
                    for item in graph.clone() {
                        if let Some(instance) = process_json_ld_item(item, raw_trimmed, base_url) {
                            out.push(instance);
                        }
                    }
                } else if let Some(instance) = process_json_ld_item(data, raw_trimmed, base_url) {
                    out.push(instance);
                }
            }
            Err(err) => out.push(SchemaInstance {
                schema_type: "InvalidJSON".to_string(),
                format: ParserFormat::JsonLd,
                raw_data: raw_trimmed.to_string(),
                parsed_data: Value::Null,
                is_valid: false,
                validation_errors: vec![format!("JSON decode error: {err}")],
                severity: SchemaSeverity::Error,
                is_main_entity: false,
                property_name: None,
                parent_index: None,
            }),
        }
    }
    out
}

fn process_json_ld_item(data: Value, raw: &str, base_url: &Url) -> Option<SchemaInstance> {
    let Value::Object(_) = &data else { return None };

    let schema_type = extract_type(&data);
    let normalized = normalize_schema_urls(data, base_url);
    let (errors, severity) = validate_schema_data(&normalized, &schema_type);

    Some(SchemaInstance {
        schema_type,
        format: ParserFormat::JsonLd,
        raw_data: raw.to_string(),
        is_valid: errors.is_empty(),
        validation_errors: errors,
        severity,
        parsed_data: normalized,
        is_main_entity: false,
        property_name: None,
        parent_index: None,
    })
}

fn extract_type(data: &Value) -> String {
    match data.get("@type") {
        Some(Value::String(s)) => strip_schema_prefix(s),
        Some(Value::Array(arr)) => arr
            .first()
            .and_then(Value::as_str)
            .map(strip_schema_prefix)
            .unwrap_or_else(|| "Unknown".to_string()),
        _ => "Unknown".to_string(),
    }
}

fn strip_schema_prefix(s: &str) -> String {
    s.replace("https://schema.org/", "").replace("http://schema.org/", "")
}

fn normalize_schema_urls(data: Value, base_url: &Url) -> Value {
    match data {
        Value::String(s) if s.starts_with('/') => {
            Value::String(base_url.join(&s).map(|u| u.to_string()).unwrap_or(s))
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_schema_urls(v, base_url)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.into_iter().map(|v| normalize_schema_urls(v, base_url)).collect()),
        other => other,
    }
}

fn extract_microdata(document: &Html, base_url: &Url) -> Vec<SchemaInstance> {
    let Some(sel) = Selector::parse("[itemscope]").ok() else { return vec![] };

    document
        .select(&sel)
        .filter_map(|item| {
            let itemtype = item.value().attr("itemtype")?;
            if itemtype.is_empty() {
                return None;
            }
            let schema_type = strip_schema_prefix(itemtype);
            let properties = extract_props(item, base_url, "itemprop", None);
            let mut map = serde_json::Map::new();
            map.insert("@type".to_string(), Value::String(schema_type.clone()));
            map.extend(properties);
            let normalized = Value::Object(map);
            let (errors, severity) = validate_schema_data(&normalized, &schema_type);

            Some(SchemaInstance {
                schema_type,
                format: ParserFormat::Microdata,
                raw_data: item.html(),
                is_valid: errors.is_empty(),
                validation_errors: errors,
                severity,
                parsed_data: normalized,
                is_main_entity: false,
                property_name: None,
                parent_index: None,
            })
        })
        .collect()
}

fn extract_rdfa(document: &Html, base_url: &Url) -> Vec<SchemaInstance> {
    let Some(sel) = Selector::parse("[typeof]").ok() else { return vec![] };

    document
        .select(&sel)
        .filter_map(|item| {
            let typeof_attr = item.value().attr("typeof")?;
            if typeof_attr.is_empty() {
                return None;
            }
            let schema_type = strip_schema_prefix(typeof_attr);
            let properties = extract_props(item, base_url, "property", Some(strip_schema_prefix));
            let mut map = serde_json::Map::new();
            map.insert("@type".to_string(), Value::String(schema_type.clone()));
            map.extend(properties);
            let normalized = Value::Object(map);
            let (errors, severity) = validate_schema_data(&normalized, &schema_type);

            Some(SchemaInstance {
                schema_type,
                format: ParserFormat::Rdfa,
                raw_data: item.html(),
                is_valid: errors.is_empty(),
                validation_errors: errors,
                severity,
                parsed_data: normalized,
                is_main_entity: false,
                property_name: None,
                parent_index: None,
            })
        })
        .collect()
}

fn extract_props(
    item: ElementRef<'_>,
    base_url: &Url,
    attr_name: &str,
    clean_name: Option<fn(&str) -> String>,
) -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    let Some(sel) = Selector::parse(&format!("[{attr_name}]")).ok() else { return props };

    for prop in item.select(&sel) {
        let Some(raw_name) = prop.value().attr(attr_name) else { continue };
        if raw_name.is_empty() {
            continue;
        }
        let name = clean_name.map(|f| f(raw_name)).unwrap_or_else(|| raw_name.to_string());

        let value = match prop.value().name() {
            "img" | "audio" | "video" | "source" => prop.value().attr("src").unwrap_or("").to_string(),
            "a" => prop.value().attr("href").unwrap_or("").to_string(),
            "meta" => prop.value().attr("content").unwrap_or("").to_string(),
            "time" => prop
                .value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| prop.text().collect::<String>().trim().to_string()),
            _ => prop.text().collect::<String>().trim().to_string(),
        };
        let value = if value.starts_with('/') {
            base_url.join(&value).map(|u| u.to_string()).unwrap_or(value)
        } else {
            value
        };

        match props.get_mut(&name) {
            Some(Value::Array(arr)) => arr.push(Value::String(value)),
            Some(existing) => {
                let prior = existing.clone();
                props.insert(name, Value::Array(vec![prior, Value::String(value)]));
            }
            None => {
                props.insert(name, Value::String(value));
            }
        }
    }
    props
}

/// Carried forward from `schema.py::validate_schema_data`.
fn validate_schema_data(data: &Value, schema_type: &str) -> (Vec<String>, SchemaSeverity) {
    let mut errors = Vec::new();
    let mut severity = SchemaSeverity::Info;
    let Value::Object(map) = data else {
        return (vec!["Schema data must be an object".to_string()], SchemaSeverity::Error);
    };

    let has = |key: &str| map.get(key).map(|v| !is_empty_value(v)).unwrap_or(false);
    let bump = |severity: &mut SchemaSeverity, at_least: SchemaSeverity| {
        if (*severity as u8) < (at_least as u8) {
            *severity = at_least;
        }
    };

    match schema_type.to_lowercase().as_str() {
        "article" | "blogposting" | "newsarticle" => {
            if !has("headline") {
                errors.push("Article missing required 'headline' property".to_string());
                bump(&mut severity, SchemaSeverity::Error);
            }
            if !has("author") {
                errors.push("Article missing required 'author' property".to_string());
                bump(&mut severity, SchemaSeverity::Warning);
            }
        }
        "product" => {
            if !has("name") {
                errors.push("Product missing required 'name' property".to_string());
                bump(&mut severity, SchemaSeverity::Error);
            }
            if !has("offers") {
                errors.push("Product missing required 'offers' property".to_string());
                bump(&mut severity, SchemaSeverity::Warning);
            }
        }
        "organization" => {
            if !has("name") {
                errors.push("Organization missing required 'name' property".to_string());
                bump(&mut severity, SchemaSeverity::Warning);
            }
        }
        "breadcrumblist" => {
            if !has("itemListElement") {
                errors.push("BreadcrumbList missing required 'itemListElement' property".to_string());
                bump(&mut severity, SchemaSeverity::Error);
            }
        }
        "videoobject" => {
            if !has("thumbnailUrl") && !has("image") {
                errors.push("VideoObject missing 'thumbnailUrl' -- critical for rich results eligibility".to_string());
                bump(&mut severity, SchemaSeverity::Critical);
            }
            if let Some(embed) = map.get("embedUrl").and_then(Value::as_str) {
                if embed.contains("&amp;") || embed.contains("&#038;") {
                    errors.push("VideoObject embedUrl contains HTML entities that should be decoded".to_string());
                    bump(&mut severity, SchemaSeverity::Warning);
                }
            }
            if !has("duration") {
                errors.push("VideoObject missing 'duration' property (recommended for rich results)".to_string());
                bump(&mut severity, SchemaSeverity::Warning);
            }
        }
        _ => {}
    }

    for (key, value) in map {
        if key.to_lowercase().contains("url") {
            if let Some(s) = value.as_str() {
                if !(s.starts_with("http://") || s.starts_with("https://") || s.starts_with('/')) {
                    errors.push(format!("Invalid URL format for {key}: {s}"));
                    bump(&mut severity, SchemaSeverity::Warning);
                }
            }
        }
    }

    (errors, severity)
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Flags markup that looks like structured data but fails to parse, carried
/// forward from `schema.py::detect_broken_schema`.
fn detect_broken_schema(document: &Html) -> Vec<SchemaInstance> {
    let mut out = Vec::new();

    if let Some(sel) = Selector::parse(r#"script[type="application/ld+json"]"#).ok() {
        for script in document.select(&sel) {
            let content = script.text().collect::<String>();
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            let looks_like_schema =
                content.contains("@context") && content.contains("@type") && content.to_lowercase().contains("schema.org");
            if looks_like_schema && serde_json::from_str::<Value>(content).is_err() {
                out.push(broken("json-ld-broken", ParserFormat::JsonLd, content, "Malformed JSON-LD: Invalid JSON syntax"));
            }
        }
    }

    if let Some(sel) = Selector::parse("[itemscope]").ok() {
        for item in document.select(&sel) {
            let itemtype = item.value().attr("itemtype").unwrap_or("");
            if itemtype.is_empty() || !itemtype.contains("schema.org") {
                out.push(broken(
                    "BrokenMicrodata",
                    ParserFormat::Microdata,
                    &truncate(&item.html(), 500),
                    "Malformed microdata: itemscope without valid itemtype",
                ));
            }
        }
    }

    if let Some(sel) = Selector::parse("[typeof]").ok() {
        for item in document.select(&sel) {
            let typeof_attr = item.value().attr("typeof").unwrap_or("");
            let vocab = item.value().attr("vocab").unwrap_or("");
            if typeof_attr.is_empty() || (!typeof_attr.contains("schema.org") && !vocab.contains("schema.org")) {
                out.push(broken(
                    "BrokenRDFa",
                    ParserFormat::Rdfa,
                    &truncate(&item.html(), 500),
                    "Malformed RDFa: typeof without valid schema.org vocab",
                ));
            }
        }
    }

    if let Some(sel) = Selector::parse("meta").ok() {
        for meta in document.select(&sel) {
            let content = meta
                .value()
                .attr("content")
                .or_else(|| meta.value().attr("property"))
                .or_else(|| meta.value().attr("name"))
                .unwrap_or("");
            if SCHEMA_URL_PATTERN.is_match(content) {
                out.push(broken(
                    "BrokenMetaSchema",
                    ParserFormat::JsonLd,
                    &meta.html(),
                    "Schema.org reference in meta tag without proper structure",
                ));
            }
        }
    }

    out
}

fn broken(schema_type: &str, format: ParserFormat, raw: &str, error: &str) -> SchemaInstance {
    SchemaInstance {
        schema_type: schema_type.to_string(),
        format,
        raw_data: raw.to_string(),
        parsed_data: Value::Null,
        is_valid: false,
        validation_errors: vec![error.to_string()],
        severity: SchemaSeverity::Error,
        is_main_entity: false,
        property_name: None,
        parent_index: None,
    }
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// `identify_main_entity`/`identify_schema_relationships`: sets the
/// main-entity flag on the highest-priority type present and classifies the
/// remaining items as properties (parented to the main entity) or unrelated
/// siblings.
fn assign_hierarchy(items: &mut [SchemaInstance]) {
    let main_index = MAIN_ENTITY_PRIORITY.iter().find_map(|priority_type| {
        items
            .iter()
            .position(|item| item.schema_type.eq_ignore_ascii_case(priority_type))
    });
    let main_index = main_index.or(if items.is_empty() { None } else { Some(0) });

    let Some(main_index) = main_index else { return };
    items[main_index].is_main_entity = true;

    for i in 0..items.len() {
        if i == main_index {
            continue;
        }
        let is_property = PROPERTY_TYPES.iter().any(|t| items[i].schema_type.eq_ignore_ascii_case(t));
        if is_property {
            items[i].parent_index = Some(main_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn extracts_json_ld_article() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type": "Article", "headline": "Title", "author": "Jane"}
            </script></head><body></body></html>"#;
        let items = extract_structured_data(html, &base());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].schema_type, "Article");
        assert!(items[0].is_valid);
        assert!(items[0].is_main_entity);
    }

    #[test]
    fn article_missing_headline_is_error() {
        let html = r#"<script type="application/ld+json">{"@type": "Article"}</script>"#;
        let items = extract_structured_data(html, &base());
        assert!(!items[0].is_valid);
        assert_eq!(items[0].severity, SchemaSeverity::Error);
    }

    #[test]
    fn unroll_graph_container() {
        let html = r#"<script type="application/ld+json">
            {"@context": "https://schema.org", "@graph": [
                {"@type": "Organization", "name": "Acme"},
                {"@type": "WebSite"}
            ]}
            </script>"#;
        let items = extract_structured_data(html, &base());
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn broken_json_ld_is_flagged() {
        let html = r#"<script type="application/ld+json">{"@context": "schema.org", "@type": "Thing", invalid}</script>"#;
        let items = extract_structured_data(html, &base());
        assert!(items.iter().any(|i| !i.is_valid));
    }

    #[test]
    fn microdata_extraction() {
        let html = r#"<div itemscope itemtype="https://schema.org/Product">
            <span itemprop="name">Widget</span>
            </div>"#;
        let items = extract_structured_data(html, &base());
        assert_eq!(items[0].format, ParserFormat::Microdata);
        assert_eq!(items[0].schema_type, "Product");
    }
}
