//! Content-hash canonicalization: a cleaned text projection of a document is
//! hashed two ways -- SHA-256 for exact duplicates, a 64-bit SimHash for near
//! duplicates. Both hashes are computed over the same projection so that
//! textually identical pages always agree.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};
use sha2::{Digest, Sha256};

const SKIP_TAGS: [&str; 4] = ["script", "style", "noscript", "iframe"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strips script/style/noscript/iframe subtrees and comments, then collapses
/// whitespace. Attribute narrowing and class sorting from the reference
/// implementation have no observable effect on `get_text()`-style output, so
/// they are omitted here -- see DESIGN.md.
pub fn clean_content_for_hashing(html_str: &str) -> String {
    if html_str.is_empty() {
        return String::new();
    }
    let document = Html::parse_document(html_str);
    let mut text = String::new();
    collect_visible_text(document.tree.root(), &mut text);
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn collect_visible_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Element(el) if SKIP_TAGS.contains(&el.name()) => continue,
            Node::Element(_) => collect_visible_text(child, out),
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            _ => {}
        }
    }
}

pub struct ContentHashes {
    pub sha256: String,
    pub simhash: u64,
    pub content_length: usize,
}

pub fn generate_content_hashes(html_str: &str) -> ContentHashes {
    let cleaned = clean_content_for_hashing(html_str);
    if cleaned.is_empty() {
        return ContentHashes {
            sha256: String::new(),
            simhash: 0,
            content_length: 0,
        };
    }

    let mut hasher = Sha256::new();
    hasher.update(cleaned.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    ContentHashes {
        sha256,
        simhash: simhash64(&cleaned),
        content_length: cleaned.len(),
    }
}

/// FNV-1a over each whitespace-delimited token, bit-voted into a 64-bit
/// fingerprint. Hand-rolled rather than pulled from a crate: the reference
/// implementation uses a bespoke shingling scheme too idiosyncratic to be
/// worth matching bit-for-bit (see DESIGN.md); what matters for near-duplicate
/// detection is that similar documents land at a small Hamming distance,
/// which a standard bit-sampled SimHash guarantees.
pub fn simhash64(text: &str) -> u64 {
    let mut weights = [0i64; 64];
    for token in text.split_whitespace() {
        let h = fnv1a_64(token);
        for (bit, weight) in weights.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    let mut result: u64 = 0;
    for (bit, weight) in weights.iter().enumerate() {
        if *weight > 0 {
            result |= 1 << bit;
        }
    }
    result
}

fn fnv1a_64(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Hamming distance between two SimHash fingerprints, for near-duplicate
/// threshold checks (`distance / 64 <= 1 - similarity_threshold`).
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style() {
        let html = "<html><body><script>evil()</script><style>.a{}</style><p>Hello world</p></body></html>";
        let cleaned = clean_content_for_hashing(html);
        assert_eq!(cleaned, "Hello world");
    }

    #[test]
    fn collapses_whitespace() {
        let html = "<p>Hello\n\n   world</p>";
        assert_eq!(clean_content_for_hashing(html), "Hello world");
    }

    #[test]
    fn identical_text_yields_identical_hashes() {
        let a = generate_content_hashes("<p>same content here</p>");
        let b = generate_content_hashes("<div><p>same content here</p></div>");
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.simhash, b.simhash);
    }

    #[test]
    fn different_text_yields_different_sha256() {
        let a = generate_content_hashes("<p>alpha</p>");
        let b = generate_content_hashes("<p>beta</p>");
        assert_ne!(a.sha256, b.sha256);
    }

    #[test]
    fn near_duplicate_has_small_hamming_distance() {
        let a = simhash64("the quick brown fox jumps over the lazy dog");
        let b = simhash64("the quick brown fox jumps over the lazy cat");
        assert!(hamming_distance(a, b) < 20);
    }

    #[test]
    fn empty_input_yields_empty_hashes() {
        let h = generate_content_hashes("");
        assert_eq!(h.sha256, "");
        assert_eq!(h.content_length, 0);
    }
}
