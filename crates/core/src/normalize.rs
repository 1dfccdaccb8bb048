use url::Url;

use crate::types::UrlClassification;

/// Tracking parameters stripped during normalization, taken from the
/// reference crawler's `normalize_url_hardened`.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "utm_source_platform",
    "utm_creative_format",
    "utm_marketing_tactic",
];

fn default_port_for_scheme(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        "ftp" => Some(21),
        "ftps" => Some(990),
        _ => None,
    }
}

/// Fixed set of hostnames classified as `social` regardless of base host.
const SOCIAL_HOSTS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "instagram.com",
    "youtube.com",
    "tiktok.com",
    "pinterest.com",
    "reddit.com",
];

/// Resolves `href` against `base` and normalizes it to the canonical form
/// used as a URL's identity: lowercase scheme/host (host punycoding is
/// handled by the `url` crate itself during parsing), default port
/// stripped, tracking parameters removed, remaining query parameters
/// sorted, and fragment stripped. Idempotent: `normalize(normalize(u)) ==
/// normalize(u)`.
pub fn normalize_url(href: &str, base: Option<&Url>) -> Result<Url, url::ParseError> {
    let mut url = match base {
        Some(base) => base.join(href)?,
        None => Url::parse(href)?,
    };

    let scheme = url.scheme().to_lowercase();
    let _ = url.set_scheme(&scheme);

    if let Some(default_port) = default_port_for_scheme(&scheme) {
        if url.port() == Some(default_port) {
            let _ = url.set_port(None);
        }
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    url.set_fragment(None);
    Ok(url)
}

/// Classifies `url` relative to `base_host` (which should already be
/// lowercased, `www.`-stripped). `from_hreflang` is true when the URL was
/// discovered via a hreflang alternate rather than a plain link.
pub fn classify_url(url: &Url, base_host: &str, from_hreflang: bool) -> UrlClassification {
    let Some(host) = url.host_str() else {
        return UrlClassification::External;
    };
    let host = host.to_lowercase();
    let stripped = host.strip_prefix("www.").unwrap_or(&host);
    let base = base_host.strip_prefix("www.").unwrap_or(base_host);

    if stripped == base {
        return UrlClassification::Internal;
    }

    if SOCIAL_HOSTS.iter().any(|social| stripped == *social || stripped.ends_with(&format!(".{social}"))) {
        return UrlClassification::Social;
    }

    if stripped.ends_with(&format!(".{base}")) {
        return UrlClassification::Subdomain;
    }

    if from_hreflang {
        return UrlClassification::Network;
    }

    UrlClassification::External
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        let url = normalize_url("https://Example.com:443/a?z=1&utm_source=x&a=2#frag", None).unwrap();
        let again = normalize_url(url.as_str(), None).unwrap();
        assert_eq!(url, again);
    }

    #[test]
    fn strips_default_port_and_tracking_params() {
        let url = normalize_url("https://example.com:443/path?utm_source=foo&b=2&a=1", None).unwrap();
        assert_eq!(url.port(), None);
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn resolves_protocol_relative_reference() {
        let base = Url::parse("https://example.com/page").unwrap();
        let url = normalize_url("//cdn.example.com/asset.js", Some(&base)).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("cdn.example.com"));
    }

    #[test]
    fn fragment_is_stripped() {
        let url = normalize_url("https://example.com/a#section", None).unwrap();
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn classifies_internal_subdomain_external_social() {
        let base = "example.com";
        let internal = Url::parse("https://example.com/x").unwrap();
        let subdomain = Url::parse("https://blog.example.com/x").unwrap();
        let external = Url::parse("https://other.com/x").unwrap();
        let social = Url::parse("https://www.facebook.com/x").unwrap();

        assert_eq!(classify_url(&internal, base, false), UrlClassification::Internal);
        assert_eq!(classify_url(&subdomain, base, false), UrlClassification::Subdomain);
        assert_eq!(classify_url(&external, base, false), UrlClassification::External);
        assert_eq!(classify_url(&social, base, false), UrlClassification::Social);
    }

    #[test]
    fn hreflang_discovery_classifies_as_network() {
        let base = "example.com";
        let url = Url::parse("https://other.com/fr").unwrap();
        assert_eq!(classify_url(&url, base, true), UrlClassification::Network);
    }

    #[test]
    fn hreflang_discovery_on_subdomain_still_classifies_as_subdomain() {
        let base = "example.com";
        let url = Url::parse("https://blog.example.com/fr").unwrap();
        assert_eq!(classify_url(&url, base, true), UrlClassification::Subdomain);
    }
}
