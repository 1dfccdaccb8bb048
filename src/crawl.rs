//! Orchestrates the frontier, the politeness layer, the transport, the
//! parser and the store into the one batching loop that drives a crawl
//! from a single seed URL to a drained frontier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use webcrawl_core::{
    classify_url, normalize_url, AppConfig, AuthConfig, AuthType, CrawlError, FetchConfig, FetchResponse,
    UrlClassification, UrlKind,
};
use webcrawl_politeness::{calculate_cache_ttl, robots_url_for, walk_sitemap, CircuitBreakerRegistry, Pacer, RobotsRegistry, RobotsRules};
use webcrawl_storage::{
    ContentWrite, FrontierJob, FrontierSeed, HreflangWrite, LinkWrite, PageWrite, RedirectWrite, SitemapEntry,
    SitemapWrite, Store, UrlUpsert, MAX_ANCHOR_TEXT_BYTES,
};
use webcrawl_transport::{build_transport, FetchTransport};

/// Statuses the engine treats as transient: the URL goes back to `queued`
/// instead of being marked `done`.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 0 | 408 | 420 | 423 | 429 | 451) || (500..600).contains(&status)
}

enum ResponseOutcome {
    NotModified,
    Retryable { reason: String },
    Terminal,
}

fn classify_response(status: u16) -> ResponseOutcome {
    if status == 304 {
        ResponseOutcome::NotModified
    } else if is_retryable_status(status) {
        ResponseOutcome::Retryable { reason: format!("status {status}") }
    } else {
        ResponseOutcome::Terminal
    }
}

pub struct CrawlEngine {
    config: AppConfig,
    store: Store,
    transport: Box<dyn FetchTransport>,
    pacer: Pacer,
    breaker: CircuitBreakerRegistry,
    robots: RobotsRegistry,
    base_host: String,
    csv_whitelist: Option<std::collections::HashSet<String>>,
    shutdown: Arc<AtomicBool>,
}

impl CrawlEngine {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let start_url = config
            .general
            .start_url
            .as_deref()
            .context("general.start_url is required")?;
        let parsed = Url::parse(start_url).context("parsing general.start_url")?;
        let host = parsed.host_str().context("start_url has no host")?.to_lowercase();
        let base_host = host.strip_prefix("www.").unwrap_or(&host).to_string();

        let store = Store::connect(&config).await?;
        store.run_migrations().await?;

        let transport = build_transport(config.http.use_browser).await;

        let pacer = Pacer::new(
            Duration::from_secs_f64(config.pacer.base_delay_secs),
            Duration::from_secs_f64(config.pacer.min_delay_secs),
            Duration::from_secs_f64(config.pacer.max_delay_secs),
            config.pacer.increase_factor,
            config.pacer.decrease_factor,
            config.pacer.enable_adaptive_delay,
        );
        let breaker = CircuitBreakerRegistry::new(
            config.circuit_breaker.failure_threshold,
            Duration::from_secs_f64(config.circuit_breaker.recovery_timeout_secs),
        );

        let csv_whitelist = if !config.general.csv_seed_mode {
            config.general.csv_urls.as_ref().map(|path| load_csv_seeds(path)).transpose()?
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            transport,
            pacer,
            breaker,
            robots: RobotsRegistry::new(),
            base_host,
            csv_whitelist,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    fn fetch_config(&self, if_none_match: Option<String>, if_modified_since: Option<String>) -> FetchConfig {
        let auth = self.config.auth.as_ref().and_then(|a| {
            let auth_type = match a.auth_type.as_str() {
                "basic" => AuthType::Basic,
                "digest" => AuthType::Digest,
                "bearer" => AuthType::Bearer,
                "jwt" => AuthType::Jwt,
                "api_key" => AuthType::ApiKey,
                "custom" => AuthType::Custom,
                other => {
                    warn!(auth_type = other, "unrecognized auth type, ignoring");
                    return None;
                }
            };
            Some(AuthConfig {
                auth_type,
                username: a.username.clone(),
                password: a.password.clone(),
                token: a.token.clone(),
                header_name: a.header_name.clone(),
                restrict_to_host: a.domain.clone(),
                custom_headers: a.custom_headers.clone(),
            })
        });

        FetchConfig {
            timeout: Duration::from_secs(self.config.http.timeout_secs),
            max_body_size: (self.config.http.max_body_size_mb * 1024 * 1024) as usize,
            follow_redirects: true,
            user_agent: self.config.http.user_agent.clone(),
            if_none_match,
            if_modified_since,
            auth,
        }
    }

    fn allowed_to_enqueue(&self, url: &str, classification: UrlClassification, depth: u32) -> bool {
        if depth >= self.config.general.max_depth {
            return false;
        }
        match classification {
            UrlClassification::Internal => {}
            // Network (hreflang-discovered) URLs are always crawled, gated only by
            // robots/breaker elsewhere — never by same_host_only/allow_external.
            UrlClassification::Network => {}
            UrlClassification::External if !self.config.general.same_host_only => {}
            _ => return false,
        }
        if let Some(whitelist) = &self.csv_whitelist {
            if !whitelist.contains(url) {
                return false;
            }
        }
        if !self.config.general.allowed_domains.is_empty() {
            let Ok(parsed) = Url::parse(url) else { return false };
            let Some(host) = parsed.host_str() else { return false };
            if !self
                .config
                .general
                .allowed_domains
                .iter()
                .any(|d| host == d || host.ends_with(&format!(".{d}")))
            {
                return false;
            }
        }
        if let Some(restriction) = &self.config.general.path_restriction {
            let Ok(parsed) = Url::parse(url) else { return false };
            if !parsed.path().starts_with(restriction.as_str()) {
                return false;
            }
        }
        if !self.config.general.path_exclude_prefixes.is_empty() {
            if let Ok(parsed) = Url::parse(url) {
                if self
                    .config
                    .general
                    .path_exclude_prefixes
                    .iter()
                    .any(|p| parsed.path().starts_with(p.as_str()))
                {
                    return false;
                }
            }
        }
        true
    }

    async fn robots_rules_for(&self, url: &Url) -> RobotsRules {
        if !self.config.robots.respect_robots_txt {
            return RobotsRules::default();
        }
        let Some(host) = url.host_str() else { return RobotsRules::default() };
        if let Some(rules) = self.robots.get(host) {
            return rules;
        }
        let Some(robots_url) = robots_url_for(url) else { return RobotsRules::default() };
        let fetch_config = self.fetch_config(None, None);
        match self.transport.fetch(&robots_url, &fetch_config).await {
            Ok(resp) if (200..300).contains(&resp.final_status) => {
                let body = String::from_utf8_lossy(&resp.body);
                let rules = RobotsRules::parse(&body);
                let ttl = calculate_cache_ttl(
                    &resp.headers,
                    Utc::now(),
                    Duration::from_secs(self.config.robots.robots_ttl_secs),
                );
                self.robots.insert(host, rules.clone(), ttl.max(Duration::from_secs(1)));
                rules
            }
            _ => {
                self.robots.insert_missing(host, Duration::from_secs(self.config.robots.robots_ttl_secs));
                RobotsRules::default()
            }
        }
    }

    /// Seeds the frontier from `general.start_url` and `general.csv_urls`,
    /// then (unless disabled) expands sitemaps discovered via robots.txt or
    /// the conventional `/sitemap.xml` location.
    async fn seed(&self) -> Result<()> {
        let start_url = self.config.general.start_url.clone().context("start_url missing")?;
        let normalized = normalize_url(&start_url, None).context("normalizing start_url")?;
        let mut seeds: Vec<(String, u32, Option<String>, Option<f64>)> = vec![(normalized.to_string(), 0, None, None)];

        if let Some(csv_path) = &self.config.general.csv_urls {
            for url in load_csv_seeds(csv_path)? {
                if url != seeds[0].0 {
                    seeds.push((url, 0, None, None));
                }
            }
        }

        if !self.config.robots.skip_sitemaps {
            let rules = self.robots_rules_for(&normalized).await;
            let mut sitemap_urls: Vec<Url> = rules.sitemaps.iter().filter_map(|s| Url::parse(s).ok()).collect();
            if sitemap_urls.is_empty() && !self.config.robots.skip_robots_sitemaps {
                if let Ok(default_sitemap) = normalized.join("/sitemap.xml") {
                    sitemap_urls.push(default_sitemap);
                }
            }

            let mut sitemap_hreflang_writes: Vec<HreflangWrite> = Vec::new();
            for sitemap_url in sitemap_urls {
                let fetch_config = self.fetch_config(None, None);
                let flattened = walk_sitemap(self.transport.as_ref(), &fetch_config, &sitemap_url, 200).await;
                let mut sitemap_writes = Vec::new();
                for (loc, entries) in flattened {
                    let mut entry_writes = Vec::with_capacity(entries.len());
                    for (position, entry) in entries.iter().enumerate() {
                        if let Ok(normalized_entry) = normalize_url(&entry.loc, None) {
                            seeds.push((normalized_entry.to_string(), 1, None, entry.priority));
                            entry_writes.push(SitemapEntry {
                                url: normalized_entry.to_string(),
                                position: position as u32,
                                priority: entry.priority,
                            });
                            for hreflang in &entry.hreflangs {
                                if let Ok(href) = normalize_url(&hreflang.href, None) {
                                    seeds.push((href.to_string(), 1, None, entry.priority));
                                    sitemap_hreflang_writes.push(HreflangWrite {
                                        url: normalized_entry.to_string(),
                                        hreflang: hreflang.hreflang.clone(),
                                        href: href.to_string(),
                                    });
                                }
                            }
                        }
                    }
                    sitemap_writes.push(SitemapWrite {
                        sitemap_url: loc,
                        is_sitemap_index: false,
                        parent_sitemap_url: None,
                        base_domain: self.base_host.clone(),
                        entries: entry_writes,
                    });
                }
                if !sitemap_writes.is_empty() {
                    self.upsert_sitemap_urls(&sitemap_writes).await?;
                    self.store.write_sitemaps_and_urls(&sitemap_writes).await?;
                }
            }
            if !sitemap_hreflang_writes.is_empty() {
                let hreflang_upserts: Vec<UrlUpsert> = sitemap_hreflang_writes
                    .iter()
                    .flat_map(|h| {
                        [
                            UrlUpsert {
                                url: h.url.clone(),
                                kind: UrlKind::Html,
                                base_domain: self.base_host.clone(),
                                discovered_from: None,
                                is_from_sitemap: true,
                                from_hreflang: false,
                            },
                            UrlUpsert {
                                url: h.href.clone(),
                                kind: UrlKind::Html,
                                base_domain: self.base_host.clone(),
                                discovered_from: None,
                                is_from_sitemap: true,
                                from_hreflang: true,
                            },
                        ]
                    })
                    .collect();
                self.store.upsert_urls(&hreflang_upserts).await?;
                self.store.write_hreflang_sitemap(&sitemap_hreflang_writes).await?;
            }
        }

        let upserts: Vec<UrlUpsert> = seeds
            .iter()
            .map(|(url, _, parent, _)| UrlUpsert {
                url: url.clone(),
                kind: UrlKind::Html,
                base_domain: self.base_host.clone(),
                discovered_from: parent.clone(),
                is_from_sitemap: false,
                from_hreflang: false,
            })
            .collect();
        self.store.upsert_urls(&upserts).await?;

        let frontier_seeds: Vec<FrontierSeed> = seeds
            .into_iter()
            .map(|(url, depth, parent, priority)| FrontierSeed {
                url,
                depth,
                parent_url: parent,
                base_domain: self.base_host.clone(),
                sitemap_priority: priority,
            })
            .collect();
        let inserted = self.store.enqueue_frontier(&frontier_seeds).await?;
        info!(inserted, "frontier seeded");
        Ok(())
    }

    async fn upsert_sitemap_urls(&self, writes: &[SitemapWrite]) -> Result<(), CrawlError> {
        let upserts: Vec<UrlUpsert> = writes
            .iter()
            .flat_map(|w| {
                w.entries.iter().map(|e| UrlUpsert {
                    url: e.url.clone(),
                    kind: UrlKind::Html,
                    base_domain: self.base_host.clone(),
                    discovered_from: None,
                    is_from_sitemap: true,
                    from_hreflang: false,
                })
            })
            .collect();
        self.store.upsert_urls(&upserts).await
    }

    /// Installs cooperative signal handling: the first SIGINT/SIGTERM
    /// finishes the current batch and exits; a second forces immediate exit.
    fn install_shutdown_handler(&self) {
        let flag = self.shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                if flag.swap(true, Ordering::SeqCst) {
                    warn!("second shutdown signal received, forcing exit");
                    std::process::exit(130);
                }
                info!("shutdown signal received, finishing current batch");
            }
        });
    }

    pub async fn run(&self) -> Result<()> {
        self.install_shutdown_handler();
        self.seed().await?;

        let batch_size = self.config.general.concurrency.max(1) as i64;
        let mut iterations: u32 = 0;
        let rescoring_interval = self.config.frontier.rescoring_interval_batches.max(1);
        let mut pages_done: u64 = 0;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown flag set, exiting before next batch");
                break;
            }
            if self.config.general.max_pages > 0 && pages_done >= self.config.general.max_pages {
                info!(pages_done, "max_pages reached, stopping");
                break;
            }

            self.store.reset_all_pending(self.config.frontier.max_reset_attempts).await?;

            let retry_candidates = self.store.urls_ready_for_retry(self.config.retry.max_retries).await?;
            if !retry_candidates.is_empty() {
                let urls: Vec<String> = retry_candidates.into_iter().map(|r| r.url).collect();
                self.store.reset_pending_to_queued(&urls).await?;
            }

            if iterations > 0 && iterations % rescoring_interval == 0 {
                self.store.rescore_frontier().await?;
            }

            let mut batch = self.store.next_frontier_batch(batch_size).await?;
            if batch.is_empty() {
                let queued = self.store.queued_count().await?;
                if queued == 0 {
                    let backfilled = self.store.backfill_missing_frontier_entries(&self.base_host).await?;
                    if backfilled == 0 {
                        info!("frontier drained, nothing left to crawl");
                        break;
                    }
                    continue;
                }
                batch = self.store.next_frontier_batch(batch_size).await?;
                if batch.is_empty() {
                    break;
                }
            }

            let claimed = batch.len();
            self.process_batch(batch).await?;
            pages_done += claimed as u64;
            iterations += 1;
            debug!(iterations, pages_done, "batch complete");
        }

        Ok(())
    }

    async fn process_batch(&self, batch: Vec<FrontierJob>) -> Result<()> {
        let mut done_urls = Vec::new();
        let mut retry_urls = Vec::new();
        let mut url_upserts: Vec<UrlUpsert> = Vec::new();
        let mut frontier_seeds: Vec<FrontierSeed> = Vec::new();
        let mut page_writes: Vec<PageWrite> = Vec::new();
        let mut content_writes: Vec<ContentWrite> = Vec::new();
        let mut link_writes: Vec<LinkWrite> = Vec::new();
        let mut redirect_writes: Vec<RedirectWrite> = Vec::new();

        for job in &batch {
            let Ok(url) = Url::parse(&job.url) else {
                done_urls.push(job.url.clone());
                continue;
            };
            let Some(host) = url.host_str().map(|h| h.to_lowercase()) else {
                done_urls.push(job.url.clone());
                continue;
            };

            if !self.breaker.allow(&host) {
                debug!(host, "circuit open, skipping for now");
                continue;
            }

            let rules = self.robots_rules_for(&url).await;
            if !self.config.robots.ignore_robots_crawlability
                && !rules.allows(url.path(), &self.config.http.user_agent)
            {
                done_urls.push(job.url.clone());
                continue;
            }

            self.pacer.wait(&host, rules.crawl_delay(&self.config.http.user_agent)).await;

            let conditional = if self.config.http.enable_conditional_requests {
                self.store.conditional_headers_for(&job.url).await?
            } else {
                None
            };
            let (if_none_match, if_modified_since) = conditional.unwrap_or((None, None));
            let fetch_config = self.fetch_config(if_none_match, if_modified_since);
            let response = match self.transport.fetch(&url, &fetch_config).await {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(url = %job.url, error = %err, "fetch failed");
                    FetchResponse::transport_failure(url.clone())
                }
            };

            self.breaker_record(&host, response.final_status);
            self.pacer.record_response(&host, response.final_status);

            match classify_response(response.final_status) {
                ResponseOutcome::NotModified => {
                    done_urls.push(job.url.clone());
                    self.store.remove_failed_url(&job.url).await?;
                }
                ResponseOutcome::Retryable { reason } => {
                    warn!(url = %job.url, reason, "retryable response, requeuing");
                    retry_urls.push(job.url.clone());
                    self.store
                        .record_failed_url(
                            &job.url,
                            response.final_status,
                            &reason,
                            self.config.retry.retry_delay_secs,
                            self.config.retry.retry_backoff_factor,
                        )
                        .await?;
                }
                ResponseOutcome::Terminal => {
                    done_urls.push(job.url.clone());
                    self.store.remove_failed_url(&job.url).await?;

                    let redirect_destination = if response.final_url.as_str() != job.url {
                        Some(response.final_url.to_string())
                    } else {
                        None
                    };
                    if !response.redirect_chain.is_empty() {
                        redirect_writes.push(RedirectWrite {
                            source_url: job.url.clone(),
                            target_url: response.final_url.to_string(),
                            chain: response.redirect_chain.clone(),
                            final_status_code: response.final_status,
                        });
                        if let Ok(target_normalized) = normalize_url(response.final_url.as_str(), None) {
                            url_upserts.push(UrlUpsert {
                                url: target_normalized.to_string(),
                                kind: UrlKind::Html,
                                base_domain: self.base_host.clone(),
                                discovered_from: Some(job.url.clone()),
                                is_from_sitemap: false,
                                from_hreflang: false,
                            });
                        }
                    }

                    page_writes.push(PageWrite {
                        url: job.url.clone(),
                        headers: response.headers.clone(),
                        html: response.body.clone(),
                        initial_status_code: response.initial_status,
                        final_status_code: response.final_status,
                        final_url: response.final_url.to_string(),
                        redirect_destination,
                        etag: response.headers.get("etag").cloned(),
                        last_modified: response.headers.get("last-modified").cloned(),
                        fetched_at: response.fetched_at,
                    });

                    let is_html = response.content_type.as_deref().map(|c| c.contains("html")).unwrap_or(true);
                    if (200..300).contains(&response.final_status) && is_html {
                        match webcrawl_parser::parse_page(&response) {
                            Ok(page) => {
                                self.collect_discoveries(
                                    &job.url,
                                    job.depth,
                                    &page,
                                    &mut url_upserts,
                                    &mut frontier_seeds,
                                    &mut link_writes,
                                );
                                for hreflang in &page.hreflang_urls {
                                    if let Ok(href) = normalize_url(&hreflang.href, Some(&url)) {
                                        let classification = classify_url(&href, &self.base_host, true);
                                        if self.allowed_to_enqueue(href.as_str(), classification, job.depth) {
                                            url_upserts.push(UrlUpsert {
                                                url: href.to_string(),
                                                kind: UrlKind::Html,
                                                base_domain: self.base_host.clone(),
                                                discovered_from: Some(job.url.clone()),
                                                is_from_sitemap: false,
                                                from_hreflang: true,
                                            });
                                            frontier_seeds.push(FrontierSeed {
                                                url: href.to_string(),
                                                depth: job.depth + 1,
                                                parent_url: Some(job.url.clone()),
                                                base_domain: self.base_host.clone(),
                                                sitemap_priority: None,
                                            });
                                        }
                                    }
                                }

                                let robots_allows = rules.allows(url.path(), &self.config.http.user_agent);
                                let robots_txt_directives =
                                    rules.matching_rules(url.path(), &self.config.http.user_agent);
                                let robots_txt_reason = if robots_allows {
                                    None
                                } else {
                                    Some(format!("disallowed by robots.txt: {}", url.path()))
                                };
                                content_writes.push(ContentWrite {
                                    url: job.url.clone(),
                                    title: page.title,
                                    meta_description: page.meta_description,
                                    meta_robots: page.meta_robots,
                                    http_header_robots: page.http_header_robots,
                                    canonical_url: page
                                        .canonical_url
                                        .and_then(|c| normalize_url(&c, Some(&url)).ok())
                                        .map(|c| c.to_string()),
                                    hreflang_html_head: page
                                        .hreflang_urls
                                        .iter()
                                        .map(|h| (h.hreflang.clone(), h.href.clone()))
                                        .collect(),
                                    html_lang: page.html_lang,
                                    h1_tags: page.h1_tags,
                                    h2_tags: page.h2_tags,
                                    word_count: page.word_count,
                                    crawl_depth: job.depth,
                                    content_hash_sha256: page.content_hash_sha256,
                                    content_hash_simhash: page.content_hash_simhash,
                                    content_length: page.content_length,
                                    structured_data: page.structured_data,
                                    initial_status_code: response.initial_status,
                                    robots_txt_allows: robots_allows,
                                    robots_txt_reason,
                                    robots_txt_directives,
                                });
                            }
                            Err(err) => warn!(url = %job.url, error = %err, "parse failed"),
                        }
                    }
                }
            }
        }

        // Phase 1: frontier done + page bodies land first.
        if !done_urls.is_empty() {
            self.store.mark_frontier_done(&done_urls).await?;
        }
        if !retry_urls.is_empty() {
            self.store.reset_pending_to_queued(&retry_urls).await?;
        }
        if !page_writes.is_empty() {
            self.store.write_pages(&page_writes).await?;
        }

        // Phase 2: URL upserts before anything that references them.
        if !url_upserts.is_empty() {
            self.store.upsert_urls(&url_upserts).await?;
        }
        if !frontier_seeds.is_empty() {
            self.store.enqueue_frontier(&frontier_seeds).await?;
        }

        // Phase 3: content, links, redirects.
        if !content_writes.is_empty() {
            self.store.write_content_with_url_resolution(&content_writes).await?;
        }
        if !link_writes.is_empty() {
            self.store.write_internal_links(&link_writes).await?;
        }
        if !redirect_writes.is_empty() {
            self.store.write_redirects(&redirect_writes).await?;
        }

        debug!(batch_size = batch.len(), done = done_urls.len(), retried = retry_urls.len(), "batch written");
        Ok(())
    }

    fn collect_discoveries(
        &self,
        source_url: &str,
        depth: u32,
        page: &webcrawl_core::PageData,
        url_upserts: &mut Vec<UrlUpsert>,
        frontier_seeds: &mut Vec<FrontierSeed>,
        link_writes: &mut Vec<LinkWrite>,
    ) {
        for link in &page.links {
            let Ok(target) = Url::parse(&link.normalized_url) else { continue };
            let classification = classify_url(&target, &self.base_host, false);

            link_writes.push(LinkWrite {
                source_url: source_url.to_string(),
                normalized_target: link.normalized_url.clone(),
                href_url: link.original_href.clone(),
                anchor_text: webcrawl_storage::truncate_utf8(&link.anchor_text, MAX_ANCHOR_TEXT_BYTES),
                xpath: link.xpath.clone(),
                fragment: link.fragment.clone(),
                query_params: link.query_params.clone(),
            });

            url_upserts.push(UrlUpsert {
                url: link.normalized_url.clone(),
                kind: UrlKind::Html,
                base_domain: self.base_host.clone(),
                discovered_from: Some(source_url.to_string()),
                is_from_sitemap: false,
                from_hreflang: false,
            });

            if self.allowed_to_enqueue(&link.normalized_url, classification, depth) {
                frontier_seeds.push(FrontierSeed {
                    url: link.normalized_url.clone(),
                    depth: depth + 1,
                    parent_url: Some(source_url.to_string()),
                    base_domain: self.base_host.clone(),
                    sitemap_priority: None,
                });
            }
        }
    }

    fn breaker_record(&self, host: &str, status: u16) {
        if CircuitBreakerRegistry::is_failure_status(status) {
            self.breaker.record_failure(host);
        } else {
            self.breaker.record_success(host);
        }
    }
}

fn load_csv_seeds(path: &str) -> Result<std::collections::HashSet<String>> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading CSV seed file {path}"))?;
    let mut urls = std::collections::HashSet::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.eq_ignore_ascii_case("url") {
            continue;
        }
        let field = line.split(',').next().unwrap_or(line).trim();
        if let Ok(normalized) = normalize_url(field, None) {
            urls.insert(normalized.to_string());
        }
    }
    Ok(urls)
}
