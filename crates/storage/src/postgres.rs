use std::collections::HashMap;

use chrono::Utc;
use sqlx::PgPool;

use webcrawl_core::{classify_url, normalize_url, CrawlError, UrlClassification};

use crate::compress;
use crate::types::*;

fn err(e: sqlx::Error) -> CrawlError {
    CrawlError::Storage(e.to_string())
}

/// Upserts a distinct set of strings into a normalization table and returns
/// a `value -> id` map covering every input.
async fn upsert_norm(
    pool: &PgPool,
    table: &str,
    column: &str,
    values: &[String],
) -> Result<HashMap<String, i64>, CrawlError> {
    if values.is_empty() {
        return Ok(HashMap::new());
    }
    let distinct: Vec<String> = {
        let mut v = values.to_vec();
        v.sort();
        v.dedup();
        v
    };

    let insert_sql = format!(
        "INSERT INTO {table} ({column}) SELECT * FROM UNNEST($1::text[]) ON CONFLICT ({column}) DO NOTHING"
    );
    sqlx::query(&insert_sql).bind(&distinct).execute(pool).await.map_err(err)?;

    let select_sql = format!("SELECT id, {column} FROM {table} WHERE {column} = ANY($1::text[])");
    let rows: Vec<(i64, String)> = sqlx::query_as(&select_sql)
        .bind(&distinct)
        .fetch_all(pool)
        .await
        .map_err(err)?;
    Ok(rows.into_iter().map(|(id, v)| (v, id)).collect())
}

async fn resolve_url_ids(pool: &PgPool, urls: &[String]) -> Result<HashMap<String, i64>, CrawlError> {
    if urls.is_empty() {
        return Ok(HashMap::new());
    }
    let distinct: Vec<String> = {
        let mut v = urls.to_vec();
        v.sort();
        v.dedup();
        v
    };
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, url FROM urls WHERE url = ANY($1::text[])")
        .bind(&distinct)
        .fetch_all(pool)
        .await
        .map_err(err)?;
    Ok(rows.into_iter().map(|(id, u)| (u, id)).collect())
}

pub async fn upsert_urls(pool: &PgPool, rows: &[UrlUpsert]) -> Result<(), CrawlError> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut urls = Vec::with_capacity(rows.len());
    let mut kinds = Vec::with_capacity(rows.len());
    let mut classifications = Vec::with_capacity(rows.len());
    for row in rows {
        let parsed = normalize_url(&row.url, None).map_err(|e| CrawlError::InvalidUrl(e.to_string()))?;
        urls.push(row.url.clone());
        kinds.push(row.kind.as_str().to_string());
        classifications.push(classify_url(&parsed, &row.base_domain, row.from_hreflang).as_str().to_string());
    }

    sqlx::query(
        "INSERT INTO urls (url, kind, classification)
         SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[])
         ON CONFLICT (url) DO UPDATE SET last_seen = now()",
    )
    .bind(&urls)
    .bind(&kinds)
    .bind(&classifications)
    .execute(pool)
    .await
    .map_err(err)?;

    let (child_urls, parent_urls): (Vec<String>, Vec<String>) = rows
        .iter()
        .filter_map(|r| r.discovered_from.clone().map(|p| (r.url.clone(), p)))
        .unzip();
    if !child_urls.is_empty() {
        sqlx::query(
            "UPDATE urls u SET discovered_from_id = d.id
             FROM UNNEST($1::text[], $2::text[]) AS x(url, discovered_from)
             JOIN urls d ON d.url = x.discovered_from
             WHERE u.url = x.url AND u.discovered_from_id IS NULL",
        )
        .bind(&child_urls)
        .bind(&parent_urls)
        .execute(pool)
        .await
        .map_err(err)?;
    }

    Ok(())
}

pub async fn enqueue_frontier(pool: &PgPool, rows: &[FrontierSeed]) -> Result<u64, CrawlError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let urls: Vec<String> = rows.iter().map(|r| r.url.clone()).collect();
    let url_ids = resolve_url_ids(pool, &urls).await?;
    let parent_urls: Vec<String> = rows.iter().filter_map(|r| r.parent_url.clone()).collect();
    let parent_ids = resolve_url_ids(pool, &parent_urls).await?;

    let mut url_id_vec = Vec::with_capacity(rows.len());
    let mut depth_vec = Vec::with_capacity(rows.len());
    let mut parent_id_vec: Vec<Option<i64>> = Vec::with_capacity(rows.len());
    let mut priority_vec = Vec::with_capacity(rows.len());
    let mut sitemap_priority_vec = Vec::with_capacity(rows.len());
    let mut content_type_vec = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(&url_id) = url_ids.get(&row.url) else { continue };
        let parent_id = row.parent_url.as_ref().and_then(|p| parent_ids.get(p)).copied();
        let content_type_score = webcrawl_frontier::content_type_score(&row.url, None);
        let priority = webcrawl_frontier::priority_score(&webcrawl_frontier::ScoreInputs {
            url: &row.url,
            depth: row.depth,
            sitemap_priority: row.sitemap_priority,
            inlinks_count: 0,
            content_type: None,
        });
        url_id_vec.push(url_id);
        depth_vec.push(row.depth as i32);
        parent_id_vec.push(parent_id);
        priority_vec.push(priority);
        sitemap_priority_vec.push(row.sitemap_priority.unwrap_or(0.5));
        content_type_vec.push(content_type_score);
    }

    if url_id_vec.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "INSERT INTO frontier (url_id, depth, parent_id, status, priority_score, sitemap_priority, content_type_score)
         SELECT x.url_id, x.depth, x.parent_id, 'queued', x.priority_score, x.sitemap_priority, x.content_type_score
         FROM UNNEST($1::int[], $2::int[], $3::int[], $4::float8[], $5::float8[], $6::float8[])
            AS x(url_id, depth, parent_id, priority_score, sitemap_priority, content_type_score)
         WHERE NOT EXISTS (SELECT 1 FROM frontier f WHERE f.url_id = x.url_id)",
    )
    .bind(&url_id_vec)
    .bind(&depth_vec)
    .bind(&parent_id_vec)
    .bind(&priority_vec)
    .bind(&sitemap_priority_vec)
    .bind(&content_type_vec)
    .execute(pool)
    .await
    .map_err(err)?;

    Ok(result.rows_affected())
}

pub async fn mark_frontier_done(pool: &PgPool, urls: &[String]) -> Result<(), CrawlError> {
    if urls.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE frontier f SET status = 'done', reset_count = 0, updated_at = now()
         FROM urls u WHERE u.id = f.url_id AND u.url = ANY($1::text[])",
    )
    .bind(urls)
    .execute(pool)
    .await
    .map_err(err)?;
    Ok(())
}

pub async fn reset_pending_to_queued(pool: &PgPool, urls: &[String]) -> Result<(), CrawlError> {
    if urls.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE frontier f SET status = 'queued', reset_count = f.reset_count + 1, updated_at = now()
         FROM urls u WHERE u.id = f.url_id AND u.url = ANY($1::text[]) AND f.status = 'pending'",
    )
    .bind(urls)
    .execute(pool)
    .await
    .map_err(err)?;
    Ok(())
}

pub async fn reset_all_pending(pool: &PgPool, max_reset_count: u32) -> Result<(), CrawlError> {
    sqlx::query("UPDATE frontier SET status = 'done', updated_at = now() WHERE status = 'pending' AND reset_count > $1")
        .bind(max_reset_count as i32)
        .execute(pool)
        .await
        .map_err(err)?;
    sqlx::query("UPDATE frontier SET status = 'queued', reset_count = reset_count + 1, updated_at = now() WHERE status = 'pending'")
        .execute(pool)
        .await
        .map_err(err)?;
    Ok(())
}

pub async fn next_frontier_batch(pool: &PgPool, n: i64) -> Result<Vec<FrontierJob>, CrawlError> {
    let rows: Vec<(i64, i32, String)> = sqlx::query_as(
        "WITH claimed AS (
             SELECT f.url_id FROM frontier f
             WHERE f.status = 'queued'
             ORDER BY f.priority_score DESC, f.enqueued_at ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED
         )
         UPDATE frontier f SET status = 'pending', updated_at = now()
         FROM claimed c JOIN urls u ON u.id = c.url_id
         WHERE f.url_id = c.url_id
         RETURNING f.url_id, f.depth, u.url",
    )
    .bind(n)
    .fetch_all(pool)
    .await
    .map_err(err)?;

    Ok(rows
        .into_iter()
        .map(|(url_id, depth, url)| FrontierJob { url_id, url, depth: depth as u32 })
        .collect())
}

pub async fn write_pages(pool: &PgPool, rows: &[PageWrite]) -> Result<(), CrawlError> {
    if rows.is_empty() {
        return Ok(());
    }
    let urls: Vec<String> = rows.iter().map(|r| r.url.clone()).collect();
    let url_ids = resolve_url_ids(pool, &urls).await?;
    let final_urls: Vec<String> = rows.iter().map(|r| r.final_url.clone()).collect();
    let final_url_ids = resolve_url_ids(pool, &final_urls).await?;
    let redirect_dests: Vec<String> = rows.iter().filter_map(|r| r.redirect_destination.clone()).collect();
    let redirect_dest_ids = resolve_url_ids(pool, &redirect_dests).await?;

    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let Some(&url_id) = url_ids.get(&row.url) else { continue };
        let headers_json = serde_json::to_string(&row.headers).unwrap_or_default();
        let compressed = compress::compress(&row.html)?;

        sqlx::query(
            "INSERT INTO pages (url_id, headers_json, html_compressed) VALUES ($1, $2, $3)
             ON CONFLICT (url_id) DO UPDATE SET headers_json = EXCLUDED.headers_json, html_compressed = EXCLUDED.html_compressed",
        )
        .bind(url_id)
        .bind(&headers_json)
        .bind(&compressed)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        let final_url_id = final_url_ids.get(&row.final_url).copied().unwrap_or(url_id);
        let redirect_dest_id = row.redirect_destination.as_ref().and_then(|d| redirect_dest_ids.get(d)).copied();

        sqlx::query(
            "INSERT INTO page_metadata (url_id, initial_status_code, final_status_code, final_url_id, redirect_destination_url_id, etag, last_modified, fetched_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (url_id) DO UPDATE SET
                initial_status_code = EXCLUDED.initial_status_code,
                final_status_code = EXCLUDED.final_status_code,
                final_url_id = EXCLUDED.final_url_id,
                redirect_destination_url_id = EXCLUDED.redirect_destination_url_id,
                etag = EXCLUDED.etag,
                last_modified = EXCLUDED.last_modified,
                fetched_at = EXCLUDED.fetched_at",
        )
        .bind(url_id)
        .bind(row.initial_status_code as i32)
        .bind(row.final_status_code as i32)
        .bind(final_url_id)
        .bind(redirect_dest_id)
        .bind(&row.etag)
        .bind(&row.last_modified)
        .bind(row.fetched_at)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        sqlx::query(
            "INSERT INTO indexability (url_id) VALUES ($1) ON CONFLICT (url_id) DO NOTHING",
        )
        .bind(url_id)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_content_with_url_resolution(pool: &PgPool, rows: &[ContentWrite]) -> Result<(), CrawlError> {
    if rows.is_empty() {
        return Ok(());
    }
    let urls: Vec<String> = rows.iter().map(|r| r.url.clone()).collect();
    let url_ids = resolve_url_ids(pool, &urls).await?;

    let descriptions: Vec<String> = rows.iter().filter_map(|r| r.meta_description.clone()).collect();
    let desc_ids = upsert_norm(pool, "meta_descriptions", "description", &descriptions).await?;
    let langs: Vec<String> = rows.iter().filter_map(|r| r.html_lang.clone()).collect();
    let lang_ids = upsert_norm(pool, "html_languages", "language_code", &langs).await?;
    let canonical_targets: Vec<String> = rows.iter().filter_map(|r| r.canonical_url.clone()).collect();
    let canonical_ids = resolve_url_ids(pool, &canonical_targets).await?;
    let all_hreflangs: Vec<String> = rows.iter().flat_map(|r| r.hreflang_html_head.iter().map(|(h, _)| h.clone())).collect();
    let hreflang_ids = upsert_norm(pool, "hreflang_languages", "language_code", &all_hreflangs).await?;
    let hreflang_targets: Vec<String> = rows.iter().flat_map(|r| r.hreflang_html_head.iter().map(|(_, href)| href.clone())).collect();
    let hreflang_target_ids = resolve_url_ids(pool, &hreflang_targets).await?;
    let all_directives: Vec<String> = rows
        .iter()
        .flat_map(|r| {
            r.meta_robots
                .iter()
                .chain(r.http_header_robots.iter())
                .cloned()
                .chain(r.robots_txt_directives.iter().map(|(is_allow, _)| {
                    if *is_allow { "allow".to_string() } else { "disallow".to_string() }
                }))
        })
        .collect();
    let directive_ids = upsert_norm(pool, "robots_directive_strings", "directive", &all_directives).await?;
    let all_types: Vec<String> = rows.iter().flat_map(|r| r.structured_data.iter().map(|s| s.schema_type.clone())).collect();
    let type_ids = upsert_norm(pool, "schema_types", "type_name", &all_types).await?;

    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let Some(&url_id) = url_ids.get(&row.url) else { continue };
        let meta_description_id = row.meta_description.as_ref().and_then(|d| desc_ids.get(d)).copied();
        let html_lang_id = row.html_lang.as_ref().and_then(|l| lang_ids.get(l)).copied();
        let h1_json = serde_json::to_string(&row.h1_tags).unwrap_or_default();
        let h2_json = serde_json::to_string(&row.h2_tags).unwrap_or_default();

        sqlx::query(
            "INSERT INTO content (url_id, title, meta_description_id, h1_tags, h2_tags, word_count, html_lang_id, crawl_depth, content_hash_sha256, content_hash_simhash, content_length)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (url_id) DO UPDATE SET
                title = EXCLUDED.title, meta_description_id = EXCLUDED.meta_description_id,
                h1_tags = EXCLUDED.h1_tags, h2_tags = EXCLUDED.h2_tags, word_count = EXCLUDED.word_count,
                html_lang_id = EXCLUDED.html_lang_id, crawl_depth = EXCLUDED.crawl_depth,
                content_hash_sha256 = EXCLUDED.content_hash_sha256, content_hash_simhash = EXCLUDED.content_hash_simhash,
                content_length = EXCLUDED.content_length",
        )
        .bind(url_id)
        .bind(&row.title)
        .bind(meta_description_id)
        .bind(&h1_json)
        .bind(&h2_json)
        .bind(row.word_count as i32)
        .bind(html_lang_id)
        .bind(row.crawl_depth as i32)
        .bind(&row.content_hash_sha256)
        .bind(row.content_hash_simhash.to_string())
        .bind(row.content_length as i32)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        for directive in row.meta_robots.iter() {
            let Some(&directive_id) = directive_ids.get(directive) else { continue };
            sqlx::query("INSERT INTO robots_directives (url_id, source, directive_id) VALUES ($1, 'html_meta', $2)")
                .bind(url_id)
                .bind(directive_id)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
        }
        for directive in row.http_header_robots.iter() {
            let Some(&directive_id) = directive_ids.get(directive) else { continue };
            sqlx::query("INSERT INTO robots_directives (url_id, source, directive_id) VALUES ($1, 'http_header', $2)")
                .bind(url_id)
                .bind(directive_id)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
        }
        for (is_allow, path) in row.robots_txt_directives.iter() {
            let key = if *is_allow { "allow" } else { "disallow" };
            let Some(&directive_id) = directive_ids.get(key) else { continue };
            sqlx::query(
                "INSERT INTO robots_directives (url_id, source, directive_id, value) VALUES ($1, 'robots_txt', $2, $3)",
            )
            .bind(url_id)
            .bind(directive_id)
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
        }

        if let Some(canonical_url) = &row.canonical_url {
            if let Some(&canonical_id) = canonical_ids.get(canonical_url) {
                sqlx::query(
                    "INSERT INTO canonical_urls (url_id, canonical_url_id, source) VALUES ($1, $2, 'html_head')
                     ON CONFLICT (url_id) DO UPDATE SET canonical_url_id = EXCLUDED.canonical_url_id",
                )
                .bind(url_id)
                .bind(canonical_id)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            }
        }

        for (hreflang, href) in &row.hreflang_html_head {
            let (Some(&hreflang_id), Some(&href_id)) = (hreflang_ids.get(hreflang), hreflang_target_ids.get(href)) else {
                continue;
            };
            sqlx::query(
                "INSERT INTO hreflang_html_head (url_id, hreflang_id, href_url_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(url_id)
            .bind(hreflang_id)
            .bind(href_id)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
        }

        let is_self_canonical = row
            .canonical_url
            .as_ref()
            .map(|c| canonical_ids.get(c).copied() == Some(url_id))
            .unwrap_or(true);
        let html_meta_allows = !row.meta_robots.iter().any(|d| d == "noindex");
        let http_header_allows = !row.http_header_robots.iter().any(|d| d == "noindex");
        let overall_indexable = row.initial_status_code == 200
            && row.robots_txt_allows
            && html_meta_allows
            && http_header_allows
            && is_self_canonical;
        let robots_txt_directives_json: Vec<String> = row
            .robots_txt_directives
            .iter()
            .map(|(is_allow, path)| format!("{}:{}", if *is_allow { "allow" } else { "disallow" }, path))
            .collect();

        sqlx::query(
            "INSERT INTO indexability (url_id, robots_txt_allows, html_meta_allows, http_header_allows, overall_indexable, robots_txt_directives, html_meta_directives, http_header_directives, robots_txt_reason, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
             ON CONFLICT (url_id) DO UPDATE SET
                robots_txt_allows = EXCLUDED.robots_txt_allows, html_meta_allows = EXCLUDED.html_meta_allows,
                http_header_allows = EXCLUDED.http_header_allows, overall_indexable = EXCLUDED.overall_indexable,
                robots_txt_directives = EXCLUDED.robots_txt_directives, html_meta_directives = EXCLUDED.html_meta_directives,
                http_header_directives = EXCLUDED.http_header_directives, robots_txt_reason = EXCLUDED.robots_txt_reason,
                updated_at = now()",
        )
        .bind(url_id)
        .bind(row.robots_txt_allows)
        .bind(html_meta_allows)
        .bind(http_header_allows)
        .bind(overall_indexable)
        .bind(serde_json::to_string(&robots_txt_directives_json).unwrap_or_default())
        .bind(serde_json::to_string(&row.meta_robots).unwrap_or_default())
        .bind(serde_json::to_string(&row.http_header_robots).unwrap_or_default())
        .bind(&row.robots_txt_reason)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        let mut parent_ref_ids: Vec<Option<i64>> = Vec::with_capacity(row.structured_data.len());
        for (position, item) in row.structured_data.iter().enumerate() {
            let content_hash = schema_content_hash(item);
            let Some(&type_id) = type_ids.get(&item.schema_type) else {
                parent_ref_ids.push(None);
                continue;
            };

            let instance_id: i64 = sqlx::query_scalar(
                "INSERT INTO schema_instances (content_hash, schema_type_id, format, raw_data, parsed_data, is_valid, validation_errors, severity)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (content_hash) DO UPDATE SET content_hash = EXCLUDED.content_hash
                 RETURNING id",
            )
            .bind(&content_hash)
            .bind(type_id)
            .bind(item.format.as_str())
            .bind(&item.raw_data)
            .bind(item.parsed_data.to_string())
            .bind(item.is_valid)
            .bind(serde_json::to_string(&item.validation_errors).unwrap_or_default())
            .bind(item.severity.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(err)?;

            let parent_ref_id = item.parent_index.and_then(|p| parent_ref_ids.get(p).copied().flatten());
            let reference_id: i64 = sqlx::query_scalar(
                "INSERT INTO page_schema_references (url_id, schema_instance_id, position, property_name, is_main_entity, parent_reference_id)
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(url_id)
            .bind(instance_id)
            .bind(position as i32)
            .bind(&item.property_name)
            .bind(item.is_main_entity)
            .bind(parent_ref_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(err)?;
            parent_ref_ids.push(Some(reference_id));
        }
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

fn schema_content_hash(item: &webcrawl_core::SchemaInstance) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(item.schema_type.as_bytes());
    hasher.update(item.format.as_str().as_bytes());
    hasher.update(item.parsed_data.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn write_internal_links(pool: &PgPool, rows: &[LinkWrite]) -> Result<(), CrawlError> {
    if rows.is_empty() {
        return Ok(());
    }
    let sources: Vec<String> = rows.iter().map(|r| r.source_url.clone()).collect();
    let source_ids = resolve_url_ids(pool, &sources).await?;
    let targets: Vec<String> = rows.iter().map(|r| r.normalized_target.clone()).collect();
    let target_ids = resolve_url_ids(pool, &targets).await?;
    let hrefs: Vec<String> = rows.iter().map(|r| r.href_url.clone()).collect();
    let href_ids = resolve_url_ids(pool, &hrefs).await?;

    let anchors: Vec<String> = rows.iter().map(|r| truncate_utf8(&r.anchor_text, MAX_ANCHOR_TEXT_BYTES)).collect();
    let anchor_ids = upsert_norm(pool, "anchor_texts", "text", &anchors).await?;
    let xpaths: Vec<String> = rows.iter().map(|r| r.xpath.clone()).collect();
    let xpath_ids = upsert_norm(pool, "xpaths", "xpath", &xpaths).await?;
    let fragments: Vec<String> = rows.iter().filter_map(|r| r.fragment.clone()).collect();
    let fragment_ids = upsert_norm(pool, "fragments", "fragment", &fragments).await?;

    let mut tx = pool.begin().await.map_err(err)?;
    let mut link_counts: HashMap<i64, (i32, i32)> = HashMap::new();
    for row in rows {
        let Some(&source_id) = source_ids.get(&row.source_url) else { continue };
        let Some(&href_id) = href_ids.get(&row.href_url) else { continue };
        let target_id = target_ids.get(&row.normalized_target).copied();
        let anchor_text = truncate_utf8(&row.anchor_text, MAX_ANCHOR_TEXT_BYTES);
        let anchor_id = anchor_ids.get(&anchor_text).copied();
        let xpath_id = xpath_ids.get(&row.xpath).copied();
        let fragment_id = row.fragment.as_ref().and_then(|f| fragment_ids.get(f)).copied();

        sqlx::query(
            "INSERT INTO internal_links (source_url_id, target_url_id, anchor_text_id, xpath_id, href_url_id, fragment_id, url_parameters)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (source_url_id, target_url_id, anchor_text_id, xpath_id, href_url_id, fragment_id, url_parameters) DO NOTHING",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(anchor_id)
        .bind(xpath_id)
        .bind(href_id)
        .bind(fragment_id)
        .bind(&row.query_params)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        let entry = link_counts.entry(source_id).or_insert((0, 0));
        entry.0 += 1;
    }

    for (source_id, (total, _)) in link_counts {
        sqlx::query(
            "UPDATE content SET
                internal_links_count = (SELECT COUNT(*) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = $1 AND t.classification IN ('internal','subdomain')),
                internal_links_unique_count = (SELECT COUNT(DISTINCT l.target_url_id) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = $1 AND t.classification IN ('internal','subdomain')),
                external_links_count = (SELECT COUNT(*) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = $1 AND t.classification IN ('external','social','network')),
                external_links_unique_count = (SELECT COUNT(DISTINCT l.target_url_id) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = $1 AND t.classification IN ('external','social','network'))
             WHERE url_id = $1",
        )
        .bind(source_id)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
        let _ = total;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_redirects(pool: &PgPool, rows: &[RedirectWrite]) -> Result<(), CrawlError> {
    if rows.is_empty() {
        return Ok(());
    }
    let sources: Vec<String> = rows.iter().map(|r| r.source_url.clone()).collect();
    let source_ids = resolve_url_ids(pool, &sources).await?;
    let targets: Vec<String> = rows.iter().map(|r| r.target_url.clone()).collect();
    let target_ids = resolve_url_ids(pool, &targets).await?;

    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let (Some(&source_id), Some(&target_id)) = (source_ids.get(&row.source_url), target_ids.get(&row.target_url)) else {
            continue;
        };
        let chain_json = serde_json::to_string(&row.chain).unwrap_or_default();
        sqlx::query(
            "INSERT INTO redirects (source_url_id, target_url_id, redirect_chain, chain_length, final_status_code)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (source_url_id) DO UPDATE SET
                target_url_id = EXCLUDED.target_url_id, redirect_chain = EXCLUDED.redirect_chain,
                chain_length = EXCLUDED.chain_length, final_status_code = EXCLUDED.final_status_code",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(&chain_json)
        .bind(row.chain.len().min(10) as i32)
        .bind(row.final_status_code as i32)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_sitemaps_and_urls(pool: &PgPool, rows: &[SitemapWrite]) -> Result<(), CrawlError> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let parent_id: Option<i64> = if let Some(parent) = &row.parent_sitemap_url {
            sqlx::query_scalar("SELECT id FROM sitemaps WHERE sitemap_url = $1")
                .bind(parent)
                .fetch_optional(&mut *tx)
                .await
                .map_err(err)?
        } else {
            None
        };

        let sitemap_id: i64 = sqlx::query_scalar(
            "INSERT INTO sitemaps (sitemap_url, is_sitemap_index, total_urls_found, parent_sitemap_id, last_crawled_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (sitemap_url) DO UPDATE SET total_urls_found = EXCLUDED.total_urls_found, last_crawled_at = now()
             RETURNING id",
        )
        .bind(&row.sitemap_url)
        .bind(row.is_sitemap_index)
        .bind(row.entries.len() as i32)
        .bind(parent_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(err)?;

        for entry in &row.entries {
            let url_id: i64 = sqlx::query_scalar(
                "INSERT INTO urls (url, kind, classification) VALUES ($1, 'html', 'internal')
                 ON CONFLICT (url) DO UPDATE SET last_seen = now() RETURNING id",
            )
            .bind(&entry.url)
            .fetch_one(&mut *tx)
            .await
            .map_err(err)?;

            sqlx::query(
                "INSERT INTO url_sitemaps (url_id, sitemap_id, position) VALUES ($1, $2, $3)
                 ON CONFLICT (url_id, sitemap_id) DO NOTHING",
            )
            .bind(url_id)
            .bind(sitemap_id)
            .bind(entry.position as i32)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
        }
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

async fn write_hreflang_table(pool: &PgPool, table: &str, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
    if rows.is_empty() {
        return Ok(());
    }
    let urls: Vec<String> = rows.iter().map(|r| r.url.clone()).collect();
    let url_ids = resolve_url_ids(pool, &urls).await?;
    let hreflangs: Vec<String> = rows.iter().map(|r| r.hreflang.clone()).collect();
    let hreflang_ids = upsert_norm(pool, "hreflang_languages", "language_code", &hreflangs).await?;
    let hrefs: Vec<String> = rows.iter().map(|r| r.href.clone()).collect();
    let href_ids = resolve_url_ids(pool, &hrefs).await?;

    let sql = format!("INSERT INTO {table} (url_id, hreflang_id, href_url_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING");
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let (Some(&url_id), Some(&hreflang_id), Some(&href_id)) =
            (url_ids.get(&row.url), hreflang_ids.get(&row.hreflang), href_ids.get(&row.href))
        else {
            continue;
        };
        sqlx::query(&sql).bind(url_id).bind(hreflang_id).bind(href_id).execute(&mut *tx).await.map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_hreflang_sitemap(pool: &PgPool, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
    write_hreflang_table(pool, "hreflang_sitemap", rows).await
}

pub async fn write_hreflang_http_header(pool: &PgPool, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
    write_hreflang_table(pool, "hreflang_http_header", rows).await
}

pub async fn record_failed_url(
    pool: &PgPool,
    url: &str,
    status: u16,
    reason: &str,
    retry_delay_secs: f64,
    retry_backoff_factor: f64,
) -> Result<(), CrawlError> {
    let url_id: Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = $1").bind(url).fetch_optional(pool).await.map_err(err)?;
    let Some(url_id) = url_id else { return Ok(()) };
    let existing_retry_count: i32 =
        sqlx::query_scalar("SELECT retry_count FROM failed_urls WHERE url_id = $1")
            .bind(url_id)
            .fetch_optional(pool)
            .await
            .map_err(err)?
            .unwrap_or(0);
    let delay_secs = retry_delay_secs * retry_backoff_factor.powi(existing_retry_count);
    let next_retry_at = Utc::now() + chrono::Duration::milliseconds((delay_secs * 1000.0) as i64);
    sqlx::query(
        "INSERT INTO failed_urls (url_id, status_code, failure_reason, retry_count, next_retry_at)
         VALUES ($1, $2, $3, 1, $4)
         ON CONFLICT (url_id) DO UPDATE SET
            status_code = EXCLUDED.status_code, failure_reason = EXCLUDED.failure_reason,
            retry_count = failed_urls.retry_count + 1, next_retry_at = EXCLUDED.next_retry_at, updated_at = now()",
    )
    .bind(url_id)
    .bind(status as i32)
    .bind(reason)
    .bind(next_retry_at)
    .execute(pool)
    .await
    .map_err(err)?;
    Ok(())
}

pub async fn remove_failed_url(pool: &PgPool, url: &str) -> Result<(), CrawlError> {
    sqlx::query("DELETE FROM failed_urls WHERE url_id = (SELECT id FROM urls WHERE url = $1)")
        .bind(url)
        .execute(pool)
        .await
        .map_err(err)?;
    Ok(())
}

pub async fn urls_ready_for_retry(pool: &PgPool, max_retries: u32) -> Result<Vec<RetryCandidate>, CrawlError> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT u.id, u.url FROM failed_urls f JOIN urls u ON u.id = f.url_id
         WHERE f.next_retry_at <= now() AND f.retry_count < $1",
    )
    .bind(max_retries as i32)
    .fetch_all(pool)
    .await
    .map_err(err)?;
    Ok(rows.into_iter().map(|(url_id, url)| RetryCandidate { url_id, url }).collect())
}

pub async fn backfill_missing_frontier_entries(pool: &PgPool, base_domain: &str) -> Result<u64, CrawlError> {
    let _ = base_domain;
    let result = sqlx::query(
        "INSERT INTO frontier (url_id, depth, status, priority_score, sitemap_priority, content_type_score)
         SELECT u.id, 0, 'queued', 0.5, 0.5, 0.7
         FROM urls u
         WHERE u.classification IN ('internal','network')
           AND NOT EXISTS (SELECT 1 FROM frontier f WHERE f.url_id = u.id)",
    )
    .execute(pool)
    .await
    .map_err(err)?;
    Ok(result.rows_affected())
}

/// Recomputes every `queued` row's priority score from its current
/// internal-inlinks count. Run periodically, not on every batch.
pub async fn rescore_frontier(pool: &PgPool) -> Result<(), CrawlError> {
    let rows: Vec<(i64, i32, f64, f64, i64)> = sqlx::query_as(
        "SELECT f.url_id, f.depth, f.sitemap_priority, f.content_type_score,
                COUNT(l.id) AS inlinks
         FROM frontier f
         LEFT JOIN internal_links l ON l.target_url_id = f.url_id
         WHERE f.status = 'queued'
         GROUP BY f.url_id, f.depth, f.sitemap_priority, f.content_type_score",
    )
    .fetch_all(pool)
    .await
    .map_err(err)?;

    if rows.is_empty() {
        return Ok(());
    }

    let mut ids = Vec::with_capacity(rows.len());
    let mut inlinks = Vec::with_capacity(rows.len());
    let mut scores = Vec::with_capacity(rows.len());
    for (url_id, depth, sitemap_priority, content_type_score, inlinks_count) in rows {
        let score = webcrawl_frontier::depth_score(depth as u32) * webcrawl_frontier::DEPTH_WEIGHT
            + webcrawl_frontier::sitemap_priority_score(Some(sitemap_priority)) * webcrawl_frontier::SITEMAP_WEIGHT
            + webcrawl_frontier::inlinks_score(inlinks_count as u64) * webcrawl_frontier::INLINKS_WEIGHT
            + content_type_score * webcrawl_frontier::CONTENT_TYPE_WEIGHT;
        ids.push(url_id);
        inlinks.push(inlinks_count);
        scores.push(score);
    }

    sqlx::query(
        "UPDATE frontier SET inlinks_count = x.inlinks, priority_score = x.score, updated_at = now()
         FROM UNNEST($1::bigint[], $2::bigint[], $3::double precision[]) AS x(url_id, inlinks, score)
         WHERE frontier.url_id = x.url_id",
    )
    .bind(&ids)
    .bind(&inlinks)
    .bind(&scores)
    .execute(pool)
    .await
    .map_err(err)?;

    Ok(())
}
