//! Frontier priority scoring.
//!
//! The frontier's persistent state (the `queued`/`pending`/`done` machine) lives
//! in the store -- this crate only computes the weighted score used to order
//! `queued` rows, so it has no database or async dependency of its own.

/// Component weights in the combined priority score.
pub const DEPTH_WEIGHT: f64 = 0.3;
pub const SITEMAP_WEIGHT: f64 = 0.3;
pub const INLINKS_WEIGHT: f64 = 0.2;
pub const CONTENT_TYPE_WEIGHT: f64 = 0.2;

/// Depth-based priority: closer to the root scores higher.
pub fn depth_score(depth: u32) -> f64 {
    match depth {
        0 => 1.0,
        1 => 0.9,
        2 => 0.8,
        3 => 0.7,
        4..=5 => 0.6,
        _ => 0.5,
    }
}

/// Sitemap-provided `<priority>`, clamped to `[0.1, 1.0]`; absent -> 0.5.
pub fn sitemap_priority_score(sitemap_priority: Option<f64>) -> f64 {
    match sitemap_priority {
        Some(p) => p.clamp(0.1, 1.0),
        None => 0.5,
    }
}

/// Step function over the number of internal links pointing at a URL.
pub fn inlinks_score(inlinks_count: u64) -> f64 {
    match inlinks_count {
        0 => 0.5,
        1..=5 => 0.6,
        6..=20 => 0.8,
        21..=100 => 0.9,
        _ => 1.0,
    }
}

/// Heuristic over the URL path (and, if known, the response content type).
/// A `content_type` containing "html" always wins outright.
pub fn content_type_score(url: &str, content_type: Option<&str>) -> f64 {
    if let Some(ct) = content_type {
        if ct.to_lowercase().contains("html") {
            return 1.0;
        }
    }

    let lower = url.to_lowercase();
    const ROOT_LIKE: [&str; 4] = ["/home", "/index", "/main", "/"];
    const CONTENT_LIKE: [&str; 5] = ["/product", "/item", "/game", "/article", "/news"];
    const CATEGORY_LIKE: [&str; 3] = ["/category", "/section", "/page"];
    const SEARCH_LIKE: [&str; 3] = ["/search", "/filter", "/sort"];
    const API_LIKE: [&str; 3] = ["/api", "/ajax", "/json"];
    const IMAGE_EXT: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];
    const ASSET_EXT: [&str; 5] = [".css", ".js", ".pdf", ".doc", ".zip"];

    if ROOT_LIKE.iter().any(|p| lower.contains(p)) {
        1.0
    } else if CONTENT_LIKE.iter().any(|p| lower.contains(p)) {
        0.9
    } else if CATEGORY_LIKE.iter().any(|p| lower.contains(p)) {
        0.8
    } else if SEARCH_LIKE.iter().any(|p| lower.contains(p)) {
        0.6
    } else if API_LIKE.iter().any(|p| lower.contains(p)) {
        0.3
    } else if IMAGE_EXT.iter().any(|ext| lower.ends_with(ext)) {
        0.2
    } else if ASSET_EXT.iter().any(|ext| lower.ends_with(ext)) {
        0.1
    } else {
        0.7
    }
}

/// Inputs to a priority score calculation, gathered from the frontier row and
/// its joined content/sitemap data.
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs<'a> {
    pub url: &'a str,
    pub depth: u32,
    pub sitemap_priority: Option<f64>,
    pub inlinks_count: u64,
    pub content_type: Option<&'a str>,
}

/// Weighted sum of the four component scores.
pub fn priority_score(inputs: &ScoreInputs<'_>) -> f64 {
    depth_score(inputs.depth) * DEPTH_WEIGHT
        + sitemap_priority_score(inputs.sitemap_priority) * SITEMAP_WEIGHT
        + inlinks_score(inputs.inlinks_count) * INLINKS_WEIGHT
        + content_type_score(inputs.url, inputs.content_type) * CONTENT_TYPE_WEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_score_breakpoints() {
        assert_eq!(depth_score(0), 1.0);
        assert_eq!(depth_score(3), 0.7);
        assert_eq!(depth_score(5), 0.6);
        assert_eq!(depth_score(6), 0.5);
        assert_eq!(depth_score(100), 0.5);
    }

    #[test]
    fn sitemap_priority_clamped() {
        assert_eq!(sitemap_priority_score(None), 0.5);
        assert_eq!(sitemap_priority_score(Some(0.0)), 0.1);
        assert_eq!(sitemap_priority_score(Some(2.0)), 1.0);
        assert_eq!(sitemap_priority_score(Some(0.4)), 0.4);
    }

    #[test]
    fn inlinks_step_function() {
        assert_eq!(inlinks_score(0), 0.5);
        assert_eq!(inlinks_score(5), 0.6);
        assert_eq!(inlinks_score(20), 0.8);
        assert_eq!(inlinks_score(100), 0.9);
        assert_eq!(inlinks_score(101), 1.0);
    }

    #[test]
    fn content_type_header_overrides_path() {
        assert_eq!(content_type_score("https://example.com/api/x", Some("text/html; charset=utf-8")), 1.0);
    }

    #[test]
    fn content_type_path_heuristics() {
        assert_eq!(content_type_score("https://example.com/", None), 1.0);
        assert_eq!(content_type_score("https://example.com/product/1", None), 0.9);
        assert_eq!(content_type_score("https://example.com/search?q=1", None), 0.6);
        assert_eq!(content_type_score("https://example.com/api/v1", None), 0.3);
        assert_eq!(content_type_score("https://example.com/img.png", None), 0.2);
        assert_eq!(content_type_score("https://example.com/app.js", None), 0.1);
        assert_eq!(content_type_score("https://example.com/about", None), 0.7);
    }

    #[test]
    fn combined_score_is_weighted_sum() {
        let inputs = ScoreInputs {
            url: "https://example.com/",
            depth: 0,
            sitemap_priority: Some(1.0),
            inlinks_count: 0,
            content_type: None,
        };
        // 1.0*0.3 + 1.0*0.3 + 0.5*0.2 + 1.0*0.2 = 0.9
        assert!((priority_score(&inputs) - 0.9).abs() < 1e-9);
    }
}
