use std::collections::HashMap;
use std::time::{Duration, Instant};

use url::Url;

/// A single allow/disallow directive within a user-agent group.
#[derive(Debug, Clone)]
struct Rule {
    is_allow: bool,
    path: String,
}

/// Parsed robots.txt for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: HashMap<String, Vec<Rule>>,
    crawl_delays: HashMap<String, f64>,
    pub sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Line-based parser: groups directives under the current `User-agent`
    /// block(s); `*` is the wildcard group. `Allow`/`Disallow` belong to
    /// every user-agent named since the last blank line or the previous
    /// directive block, matching the de-facto robots.txt convention.
    pub fn parse(body: &str) -> Self {
        let mut groups: HashMap<String, Vec<Rule>> = HashMap::new();
        let mut crawl_delays: HashMap<String, f64> = HashMap::new();
        let mut sitemaps = Vec::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut seen_directive_since_ua = false;

        for raw_line in body.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if seen_directive_since_ua {
                        current_agents.clear();
                        seen_directive_since_ua = false;
                    }
                    current_agents.push(value.to_lowercase());
                    groups.entry(value.to_lowercase()).or_default();
                }
                "disallow" => {
                    seen_directive_since_ua = true;
                    if !value.is_empty() {
                        push_rule(&mut groups, &current_agents, false, value);
                    } else {
                        // Empty Disallow means "allow everything" for this group.
                        push_rule(&mut groups, &current_agents, true, "/");
                    }
                }
                "allow" => {
                    seen_directive_since_ua = true;
                    push_rule(&mut groups, &current_agents, true, value);
                }
                "crawl-delay" => {
                    seen_directive_since_ua = true;
                    if let Ok(seconds) = value.parse::<f64>() {
                        for agent in &current_agents {
                            crawl_delays.insert(agent.clone(), seconds);
                        }
                    }
                }
                "sitemap" => {
                    sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        Self {
            groups,
            crawl_delays,
            sitemaps,
        }
    }

    fn group_for<'a>(&'a self, user_agent: &str) -> Option<&'a Vec<Rule>> {
        let ua = user_agent.to_lowercase();
        self.groups
            .iter()
            .find(|(name, _)| *name != "*" && ua.contains(name.as_str()))
            .map(|(_, rules)| rules)
            .or_else(|| self.groups.get("*"))
    }

    pub fn allows(&self, path: &str, user_agent: &str) -> bool {
        let Some(rules) = self.group_for(user_agent) else {
            return true;
        };

        let mut best_allow_len = None;
        let mut best_disallow_len = None;

        for rule in rules {
            if let Some(len) = match_len(path, &rule.path) {
                if rule.is_allow {
                    best_allow_len = Some(best_allow_len.unwrap_or(0).max(len));
                } else {
                    best_disallow_len = Some(best_disallow_len.unwrap_or(0).max(len));
                }
            }
        }

        match (best_allow_len, best_disallow_len) {
            (None, None) => true,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let ua = user_agent.to_lowercase();
        self.crawl_delays
            .iter()
            .find(|(name, _)| *name != "*" && ua.contains(name.as_str()))
            .or_else(|| self.crawl_delays.get_key_value("*"))
            .map(|(_, secs)| Duration::from_secs_f64(*secs))
    }

    pub fn matching_rules(&self, path: &str, user_agent: &str) -> Vec<(bool, String)> {
        let Some(rules) = self.group_for(user_agent) else {
            return Vec::new();
        };
        rules
            .iter()
            .filter(|rule| match_len(path, &rule.path).is_some())
            .map(|rule| (rule.is_allow, rule.path.clone()))
            .collect()
    }
}

fn push_rule(groups: &mut HashMap<String, Vec<Rule>>, agents: &[String], is_allow: bool, path: &str) {
    let targets: Vec<String> = if agents.is_empty() {
        vec!["*".to_string()]
    } else {
        agents.to_vec()
    };
    for agent in targets {
        groups.entry(agent).or_default().push(Rule {
            is_allow,
            path: path.to_string(),
        });
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Prefix match with a trailing `*` wildcard. Returns the matched pattern
/// length (used to pick the most specific rule) or `None`.
fn match_len(path: &str, pattern: &str) -> Option<usize> {
    if pattern.is_empty() {
        return Some(0);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        if path.starts_with(prefix) {
            return Some(pattern.len());
        }
        return None;
    }
    if path.starts_with(pattern) {
        return Some(pattern.len());
    }
    None
}

/// Per-host cache entry.
#[derive(Clone)]
struct CachedRobots {
    rules: RobotsRules,
    fetched_at: Instant,
    ttl: Duration,
}

/// Registry of parsed robots.txt rules, one per host, with TTL-based
/// refresh and fail-open memoization of unreachable hosts.
#[derive(Default)]
pub struct RobotsRegistry {
    cache: dashmap::DashMap<String, CachedRobots>,
}

impl RobotsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str) -> Option<RobotsRules> {
        let entry = self.cache.get(host)?;
        if entry.fetched_at.elapsed() > entry.ttl {
            return None;
        }
        Some(entry.rules.clone())
    }

    pub fn insert(&self, host: &str, rules: RobotsRules, ttl: Duration) {
        self.cache.insert(
            host.to_string(),
            CachedRobots {
                rules,
                fetched_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Memoizes "no robots.txt" (fail-open: everything is allowed) for the
    /// given TTL, used both for 4xx (genuinely absent) and 5xx (broken --
    /// we do not want a flaky robots endpoint to halt the crawl).
    pub fn insert_missing(&self, host: &str, ttl: Duration) {
        self.insert(host, RobotsRules::default(), ttl);
    }
}

/// Cache-control-driven TTL calculation for robots.txt/sitemap responses.
/// `Cache-Control: max-age` wins; falls back to `Expires`, then a 10%-of-age
/// heuristic from `Last-Modified`; `no-cache`/`no-store` force TTL=0.
pub fn calculate_cache_ttl(
    headers: &HashMap<String, String>,
    now: chrono::DateTime<chrono::Utc>,
    default_ttl: Duration,
) -> Duration {
    if let Some(cache_control) = headers.get("cache-control") {
        let lower = cache_control.to_lowercase();
        if lower.contains("no-cache") || lower.contains("no-store") {
            return Duration::from_secs(0);
        }
        if let Some(max_age) = lower
            .split(',')
            .find_map(|part| part.trim().strip_prefix("max-age="))
            .and_then(|v| v.parse::<u64>().ok())
        {
            return Duration::from_secs(max_age);
        }
    }

    if let Some(expires) = headers
        .get("expires")
        .and_then(|v| chrono::DateTime::parse_from_rfc2822(v).ok())
    {
        let delta = expires.with_timezone(&chrono::Utc) - now;
        if delta.num_seconds() > 0 {
            return Duration::from_secs(delta.num_seconds() as u64);
        }
        return Duration::from_secs(0);
    }

    if let Some(last_modified) = headers
        .get("last-modified")
        .and_then(|v| chrono::DateTime::parse_from_rfc2822(v).ok())
    {
        let age = now - last_modified.with_timezone(&chrono::Utc);
        if age.num_seconds() > 0 {
            let heuristic = (age.num_seconds() as f64 * 0.1) as u64;
            return Duration::from_secs(heuristic).min(default_ttl);
        }
    }

    default_ttl
}

pub fn robots_url_for(base: &Url) -> Option<Url> {
    let mut url = base.clone();
    url.set_path("/robots.txt");
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_group_disallows_private() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /private\n");
        assert!(!rules.allows("/private/data", "any-bot"));
        assert!(rules.allows("/public", "any-bot"));
    }

    #[test]
    fn allow_overrides_disallow_when_more_specific() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /shop\nAllow: /shop/public\n",
        );
        assert!(rules.allows("/shop/public/item", "any-bot"));
        assert!(!rules.allows("/shop/private", "any-bot"));
    }

    #[test]
    fn trailing_wildcard_matches_prefix() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /search*\n");
        assert!(!rules.allows("/search?q=1", "any-bot"));
    }

    #[test]
    fn crawl_delay_parsed() {
        let rules = RobotsRules::parse("User-agent: *\nCrawl-delay: 2.5\n");
        assert_eq!(rules.crawl_delay("any-bot"), Some(Duration::from_secs_f64(2.5)));
    }

    #[test]
    fn no_store_yields_zero_ttl() {
        let mut headers = HashMap::new();
        headers.insert("cache-control".to_string(), "no-store".to_string());
        let ttl = calculate_cache_ttl(&headers, chrono::Utc::now(), Duration::from_secs(60));
        assert_eq!(ttl, Duration::from_secs(0));
    }

    #[test]
    fn max_age_wins_over_default() {
        let mut headers = HashMap::new();
        headers.insert("cache-control".to_string(), "max-age=120".to_string());
        let ttl = calculate_cache_ttl(&headers, chrono::Utc::now(), Duration::from_secs(60));
        assert_eq!(ttl, Duration::from_secs(120));
    }
}
