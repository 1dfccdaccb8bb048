//! SQLite backend: no `SKIP LOCKED`, no `UNNEST` — every batch runs as a
//! sequential loop inside one transaction. Correct for the single-writer
//! case SQLite is used for; not meant to scale the way the Postgres path does.

use chrono::Utc;
use sqlx::SqlitePool;

use webcrawl_core::{classify_url, normalize_url, CrawlError};

use crate::compress;
use crate::types::*;

fn err(e: sqlx::Error) -> CrawlError {
    CrawlError::Storage(e.to_string())
}

async fn url_id(pool: &SqlitePool, url: &str) -> Result<Option<i64>, CrawlError> {
    sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(url).fetch_optional(pool).await.map_err(err)
}

async fn upsert_norm_one(pool: &SqlitePool, table: &str, column: &str, value: &str) -> Result<i64, CrawlError> {
    let sql_insert = format!("INSERT INTO {table} ({column}) VALUES (?1) ON CONFLICT({column}) DO NOTHING");
    sqlx::query(&sql_insert).bind(value).execute(pool).await.map_err(err)?;
    let sql_select = format!("SELECT id FROM {table} WHERE {column} = ?1");
    sqlx::query_scalar(&sql_select).bind(value).fetch_one(pool).await.map_err(err)
}

pub async fn upsert_urls(pool: &SqlitePool, rows: &[UrlUpsert]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let parsed = normalize_url(&row.url, None).map_err(|e| CrawlError::InvalidUrl(e.to_string()))?;
        let classification = classify_url(&parsed, &row.base_domain, row.from_hreflang);

        sqlx::query(
            "INSERT INTO urls (url, kind, classification) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET last_seen = datetime('now')",
        )
        .bind(&row.url)
        .bind(row.kind.as_str())
        .bind(classification.as_str())
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        if let Some(parent) = &row.discovered_from {
            sqlx::query(
                "UPDATE urls SET discovered_from_id = (SELECT id FROM urls WHERE url = ?1)
                 WHERE url = ?2 AND discovered_from_id IS NULL",
            )
            .bind(parent)
            .bind(&row.url)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
        }
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn enqueue_frontier(pool: &SqlitePool, rows: &[FrontierSeed]) -> Result<u64, CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    let mut inserted = 0u64;
    for row in rows {
        let Some(uid) = sqlx::query_scalar::<_, i64>("SELECT id FROM urls WHERE url = ?1")
            .bind(&row.url)
            .fetch_optional(&mut *tx)
            .await
            .map_err(err)?
        else {
            continue;
        };
        let exists: Option<i64> = sqlx::query_scalar("SELECT url_id FROM frontier WHERE url_id = ?1").bind(uid).fetch_optional(&mut *tx).await.map_err(err)?;
        if exists.is_some() {
            continue;
        }
        let parent_id: Option<i64> = if let Some(p) = &row.parent_url {
            sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(p).fetch_optional(&mut *tx).await.map_err(err)?
        } else {
            None
        };
        let priority = webcrawl_frontier::priority_score(&webcrawl_frontier::ScoreInputs {
            url: &row.url,
            depth: row.depth,
            sitemap_priority: row.sitemap_priority,
            inlinks_count: 0,
            content_type: None,
        });
        let content_type_score = webcrawl_frontier::content_type_score(&row.url, None);

        sqlx::query(
            "INSERT INTO frontier (url_id, depth, parent_id, status, priority_score, sitemap_priority, content_type_score)
             VALUES (?1, ?2, ?3, 'queued', ?4, ?5, ?6)",
        )
        .bind(uid)
        .bind(row.depth as i64)
        .bind(parent_id)
        .bind(priority)
        .bind(row.sitemap_priority.unwrap_or(0.5))
        .bind(content_type_score)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
        inserted += 1;
    }
    tx.commit().await.map_err(err)?;
    Ok(inserted)
}

pub async fn mark_frontier_done(pool: &SqlitePool, urls: &[String]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    for u in urls {
        sqlx::query(
            "UPDATE frontier SET status = 'done', reset_count = 0, updated_at = datetime('now')
             WHERE url_id = (SELECT id FROM urls WHERE url = ?1)",
        )
        .bind(u)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn reset_pending_to_queued(pool: &SqlitePool, urls: &[String]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    for u in urls {
        sqlx::query(
            "UPDATE frontier SET status = 'queued', reset_count = reset_count + 1, updated_at = datetime('now')
             WHERE url_id = (SELECT id FROM urls WHERE url = ?1) AND status = 'pending'",
        )
        .bind(u)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn reset_all_pending(pool: &SqlitePool, max_reset_count: u32) -> Result<(), CrawlError> {
    sqlx::query("UPDATE frontier SET status = 'done', updated_at = datetime('now') WHERE status = 'pending' AND reset_count > ?1")
        .bind(max_reset_count as i64)
        .execute(pool)
        .await
        .map_err(err)?;
    sqlx::query("UPDATE frontier SET status = 'queued', reset_count = reset_count + 1, updated_at = datetime('now') WHERE status = 'pending'")
        .execute(pool)
        .await
        .map_err(err)?;
    Ok(())
}

pub async fn next_frontier_batch(pool: &SqlitePool, n: i64) -> Result<Vec<FrontierJob>, CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    let rows: Vec<(i64, i64, String)> = sqlx::query_as(
        "SELECT f.url_id, f.depth, u.url FROM frontier f JOIN urls u ON u.id = f.url_id
         WHERE f.status = 'queued' ORDER BY f.priority_score DESC, f.enqueued_at ASC LIMIT ?1",
    )
    .bind(n)
    .fetch_all(&mut *tx)
    .await
    .map_err(err)?;

    for (url_id, _, _) in &rows {
        sqlx::query("UPDATE frontier SET status = 'pending', updated_at = datetime('now') WHERE url_id = ?1")
            .bind(url_id)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
    }
    tx.commit().await.map_err(err)?;

    Ok(rows
        .into_iter()
        .map(|(url_id, depth, url)| FrontierJob { url_id, url, depth: depth as u32 })
        .collect())
}

pub async fn write_pages(pool: &SqlitePool, rows: &[PageWrite]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let Some(uid): Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.url).fetch_optional(&mut *tx).await.map_err(err)? else {
            continue;
        };
        let headers_json = serde_json::to_string(&row.headers).unwrap_or_default();
        let compressed = compress::compress(&row.html)?;

        sqlx::query(
            "INSERT INTO pages (url_id, headers_json, html_compressed) VALUES (?1, ?2, ?3)
             ON CONFLICT(url_id) DO UPDATE SET headers_json = excluded.headers_json, html_compressed = excluded.html_compressed",
        )
        .bind(uid)
        .bind(&headers_json)
        .bind(&compressed)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        let final_url_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.final_url).fetch_optional(&mut *tx).await.map_err(err)?;
        let redirect_dest_id: Option<i64> = if let Some(d) = &row.redirect_destination {
            sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(d).fetch_optional(&mut *tx).await.map_err(err)?
        } else {
            None
        };

        sqlx::query(
            "INSERT INTO page_metadata (url_id, initial_status_code, final_status_code, final_url_id, redirect_destination_url_id, etag, last_modified, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(url_id) DO UPDATE SET
                initial_status_code = excluded.initial_status_code, final_status_code = excluded.final_status_code,
                final_url_id = excluded.final_url_id, redirect_destination_url_id = excluded.redirect_destination_url_id,
                etag = excluded.etag, last_modified = excluded.last_modified, fetched_at = excluded.fetched_at",
        )
        .bind(uid)
        .bind(row.initial_status_code as i64)
        .bind(row.final_status_code as i64)
        .bind(final_url_id.unwrap_or(uid))
        .bind(redirect_dest_id)
        .bind(&row.etag)
        .bind(&row.last_modified)
        .bind(row.fetched_at)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        sqlx::query("INSERT INTO indexability (url_id) VALUES (?1) ON CONFLICT(url_id) DO NOTHING")
            .bind(uid)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
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

pub async fn write_content_with_url_resolution(pool: &SqlitePool, rows: &[ContentWrite]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let Some(uid): Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.url).fetch_optional(&mut *tx).await.map_err(err)? else {
            continue;
        };

        let meta_description_id = match &row.meta_description {
            Some(d) if !d.is_empty() => {
                let sql_ins = "INSERT INTO meta_descriptions (description) VALUES (?1) ON CONFLICT(description) DO NOTHING";
                sqlx::query(sql_ins).bind(d).execute(&mut *tx).await.map_err(err)?;
                let id: i64 = sqlx::query_scalar("SELECT id FROM meta_descriptions WHERE description = ?1").bind(d).fetch_one(&mut *tx).await.map_err(err)?;
                Some(id)
            }
            _ => None,
        };
        let html_lang_id = match &row.html_lang {
            Some(l) if !l.is_empty() => {
                sqlx::query("INSERT INTO html_languages (language_code) VALUES (?1) ON CONFLICT(language_code) DO NOTHING").bind(l).execute(&mut *tx).await.map_err(err)?;
                let id: i64 = sqlx::query_scalar("SELECT id FROM html_languages WHERE language_code = ?1").bind(l).fetch_one(&mut *tx).await.map_err(err)?;
                Some(id)
            }
            _ => None,
        };

        let h1_json = serde_json::to_string(&row.h1_tags).unwrap_or_default();
        let h2_json = serde_json::to_string(&row.h2_tags).unwrap_or_default();

        sqlx::query(
            "INSERT INTO content (url_id, title, meta_description_id, h1_tags, h2_tags, word_count, html_lang_id, crawl_depth, content_hash_sha256, content_hash_simhash, content_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(url_id) DO UPDATE SET
                title = excluded.title, meta_description_id = excluded.meta_description_id,
                h1_tags = excluded.h1_tags, h2_tags = excluded.h2_tags, word_count = excluded.word_count,
                html_lang_id = excluded.html_lang_id, crawl_depth = excluded.crawl_depth,
                content_hash_sha256 = excluded.content_hash_sha256, content_hash_simhash = excluded.content_hash_simhash,
                content_length = excluded.content_length",
        )
        .bind(uid)
        .bind(&row.title)
        .bind(meta_description_id)
        .bind(&h1_json)
        .bind(&h2_json)
        .bind(row.word_count as i64)
        .bind(html_lang_id)
        .bind(row.crawl_depth as i64)
        .bind(&row.content_hash_sha256)
        .bind(row.content_hash_simhash.to_string())
        .bind(row.content_length as i64)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        for (source, directive) in row
            .meta_robots
            .iter()
            .map(|d| ("html_meta", d))
            .chain(row.http_header_robots.iter().map(|d| ("http_header", d)))
        {
            sqlx::query("INSERT INTO robots_directive_strings (directive) VALUES (?1) ON CONFLICT(directive) DO NOTHING").bind(directive).execute(&mut *tx).await.map_err(err)?;
            let directive_id: i64 =
                sqlx::query_scalar("SELECT id FROM robots_directive_strings WHERE directive = ?1").bind(directive).fetch_one(&mut *tx).await.map_err(err)?;
            sqlx::query("INSERT INTO robots_directives (url_id, source, directive_id) VALUES (?1, ?2, ?3)")
                .bind(uid)
                .bind(source)
                .bind(directive_id)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
        }

        for (is_allow, path) in row.robots_txt_directives.iter() {
            let key = if *is_allow { "allow" } else { "disallow" };
            sqlx::query("INSERT INTO robots_directive_strings (directive) VALUES (?1) ON CONFLICT(directive) DO NOTHING").bind(key).execute(&mut *tx).await.map_err(err)?;
            let directive_id: i64 =
                sqlx::query_scalar("SELECT id FROM robots_directive_strings WHERE directive = ?1").bind(key).fetch_one(&mut *tx).await.map_err(err)?;
            sqlx::query("INSERT INTO robots_directives (url_id, source, directive_id, value) VALUES (?1, 'robots_txt', ?2, ?3)")
                .bind(uid)
                .bind(directive_id)
                .bind(path)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
        }

        let mut canonical_id: Option<i64> = None;
        if let Some(canonical_url) = &row.canonical_url {
            canonical_id =
                sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(canonical_url).fetch_optional(&mut *tx).await.map_err(err)?;
            if let Some(cid) = canonical_id {
                sqlx::query(
                    "INSERT INTO canonical_urls (url_id, canonical_url_id, source) VALUES (?1, ?2, 'html_head')
                     ON CONFLICT(url_id) DO UPDATE SET canonical_url_id = excluded.canonical_url_id",
                )
                .bind(uid)
                .bind(cid)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            }
        }

        for (hreflang, href) in &row.hreflang_html_head {
            sqlx::query("INSERT INTO hreflang_languages (language_code) VALUES (?1) ON CONFLICT(language_code) DO NOTHING").bind(hreflang).execute(&mut *tx).await.map_err(err)?;
            let hreflang_id: i64 =
                sqlx::query_scalar("SELECT id FROM hreflang_languages WHERE language_code = ?1").bind(hreflang).fetch_one(&mut *tx).await.map_err(err)?;
            let Some(href_id): Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(href).fetch_optional(&mut *tx).await.map_err(err)? else {
                continue;
            };
            sqlx::query("INSERT INTO hreflang_html_head (url_id, hreflang_id, href_url_id) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING")
                .bind(uid)
                .bind(hreflang_id)
                .bind(href_id)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
        }

        let is_self_canonical = canonical_id.map(|c| c == uid).unwrap_or(true);
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
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
             ON CONFLICT(url_id) DO UPDATE SET
                robots_txt_allows = excluded.robots_txt_allows, html_meta_allows = excluded.html_meta_allows,
                http_header_allows = excluded.http_header_allows, overall_indexable = excluded.overall_indexable,
                robots_txt_directives = excluded.robots_txt_directives, html_meta_directives = excluded.html_meta_directives,
                http_header_directives = excluded.http_header_directives, robots_txt_reason = excluded.robots_txt_reason,
                updated_at = datetime('now')",
        )
        .bind(uid)
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
            sqlx::query("INSERT INTO schema_types (type_name) VALUES (?1) ON CONFLICT(type_name) DO NOTHING")
                .bind(&item.schema_type)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            let type_id: i64 =
                sqlx::query_scalar("SELECT id FROM schema_types WHERE type_name = ?1").bind(&item.schema_type).fetch_one(&mut *tx).await.map_err(err)?;

            sqlx::query(
                "INSERT INTO schema_instances (content_hash, schema_type_id, format, raw_data, parsed_data, is_valid, validation_errors, severity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(content_hash) DO UPDATE SET content_hash = excluded.content_hash",
            )
            .bind(&content_hash)
            .bind(type_id)
            .bind(item.format.as_str())
            .bind(&item.raw_data)
            .bind(item.parsed_data.to_string())
            .bind(item.is_valid)
            .bind(serde_json::to_string(&item.validation_errors).unwrap_or_default())
            .bind(item.severity.as_str())
            .execute(&mut *tx)
            .await
            .map_err(err)?;
            let instance_id: i64 =
                sqlx::query_scalar("SELECT id FROM schema_instances WHERE content_hash = ?1").bind(&content_hash).fetch_one(&mut *tx).await.map_err(err)?;

            let parent_ref_id = item.parent_index.and_then(|p| parent_ref_ids.get(p).copied().flatten());
            sqlx::query(
                "INSERT INTO page_schema_references (url_id, schema_instance_id, position, property_name, is_main_entity, parent_reference_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(uid)
            .bind(instance_id)
            .bind(position as i64)
            .bind(&item.property_name)
            .bind(item.is_main_entity)
            .bind(parent_ref_id)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
            let reference_id: i64 = sqlx::query_scalar("SELECT last_insert_rowid()").fetch_one(&mut *tx).await.map_err(err)?;
            parent_ref_ids.push(Some(reference_id));
        }
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_internal_links(pool: &SqlitePool, rows: &[LinkWrite]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    let mut touched_sources: Vec<i64> = Vec::new();
    for row in rows {
        let Some(source_id): Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.source_url).fetch_optional(&mut *tx).await.map_err(err)? else {
            continue;
        };
        let Some(href_id): Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.href_url).fetch_optional(&mut *tx).await.map_err(err)? else {
            continue;
        };
        let target_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.normalized_target).fetch_optional(&mut *tx).await.map_err(err)?;

        let anchor_text = truncate_utf8(&row.anchor_text, MAX_ANCHOR_TEXT_BYTES);
        sqlx::query("INSERT INTO anchor_texts (text) VALUES (?1) ON CONFLICT(text) DO NOTHING").bind(&anchor_text).execute(&mut *tx).await.map_err(err)?;
        let anchor_id: i64 = sqlx::query_scalar("SELECT id FROM anchor_texts WHERE text = ?1").bind(&anchor_text).fetch_one(&mut *tx).await.map_err(err)?;

        sqlx::query("INSERT INTO xpaths (xpath) VALUES (?1) ON CONFLICT(xpath) DO NOTHING").bind(&row.xpath).execute(&mut *tx).await.map_err(err)?;
        let xpath_id: i64 = sqlx::query_scalar("SELECT id FROM xpaths WHERE xpath = ?1").bind(&row.xpath).fetch_one(&mut *tx).await.map_err(err)?;

        let fragment_id: Option<i64> = if let Some(f) = &row.fragment {
            sqlx::query("INSERT INTO fragments (fragment) VALUES (?1) ON CONFLICT(fragment) DO NOTHING").bind(f).execute(&mut *tx).await.map_err(err)?;
            Some(sqlx::query_scalar("SELECT id FROM fragments WHERE fragment = ?1").bind(f).fetch_one(&mut *tx).await.map_err(err)?)
        } else {
            None
        };

        sqlx::query(
            "INSERT INTO internal_links (source_url_id, target_url_id, anchor_text_id, xpath_id, href_url_id, fragment_id, url_parameters)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source_url_id, target_url_id, anchor_text_id, xpath_id, href_url_id, fragment_id, url_parameters) DO NOTHING",
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
        touched_sources.push(source_id);
    }
    touched_sources.sort();
    touched_sources.dedup();
    for source_id in touched_sources {
        sqlx::query(
            "UPDATE content SET
                internal_links_count = (SELECT COUNT(*) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = ?1 AND t.classification IN ('internal','subdomain')),
                internal_links_unique_count = (SELECT COUNT(DISTINCT l.target_url_id) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = ?1 AND t.classification IN ('internal','subdomain')),
                external_links_count = (SELECT COUNT(*) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = ?1 AND t.classification IN ('external','social','network')),
                external_links_unique_count = (SELECT COUNT(DISTINCT l.target_url_id) FROM internal_links l JOIN urls t ON t.id = l.target_url_id WHERE l.source_url_id = ?1 AND t.classification IN ('external','social','network'))
             WHERE url_id = ?1",
        )
        .bind(source_id)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_redirects(pool: &SqlitePool, rows: &[RedirectWrite]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let (Some(source_id), Some(target_id)) = (
            sqlx::query_scalar::<_, i64>("SELECT id FROM urls WHERE url = ?1").bind(&row.source_url).fetch_optional(&mut *tx).await.map_err(err)?,
            sqlx::query_scalar::<_, i64>("SELECT id FROM urls WHERE url = ?1").bind(&row.target_url).fetch_optional(&mut *tx).await.map_err(err)?,
        ) else {
            continue;
        };
        let chain_json = serde_json::to_string(&row.chain).unwrap_or_default();
        sqlx::query(
            "INSERT INTO redirects (source_url_id, target_url_id, redirect_chain, chain_length, final_status_code)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_url_id) DO UPDATE SET
                target_url_id = excluded.target_url_id, redirect_chain = excluded.redirect_chain,
                chain_length = excluded.chain_length, final_status_code = excluded.final_status_code",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(&chain_json)
        .bind(row.chain.len().min(10) as i64)
        .bind(row.final_status_code as i64)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_sitemaps_and_urls(pool: &SqlitePool, rows: &[SitemapWrite]) -> Result<(), CrawlError> {
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let parent_id: Option<i64> = if let Some(parent) = &row.parent_sitemap_url {
            sqlx::query_scalar("SELECT id FROM sitemaps WHERE sitemap_url = ?1").bind(parent).fetch_optional(&mut *tx).await.map_err(err)?
        } else {
            None
        };

        sqlx::query(
            "INSERT INTO sitemaps (sitemap_url, is_sitemap_index, total_urls_found, parent_sitemap_id, last_crawled_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(sitemap_url) DO UPDATE SET total_urls_found = excluded.total_urls_found, last_crawled_at = datetime('now')",
        )
        .bind(&row.sitemap_url)
        .bind(row.is_sitemap_index)
        .bind(row.entries.len() as i64)
        .bind(parent_id)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
        let sitemap_id: i64 = sqlx::query_scalar("SELECT id FROM sitemaps WHERE sitemap_url = ?1").bind(&row.sitemap_url).fetch_one(&mut *tx).await.map_err(err)?;

        for entry in &row.entries {
            sqlx::query(
                "INSERT INTO urls (url, kind, classification) VALUES (?1, 'html', 'internal')
                 ON CONFLICT(url) DO UPDATE SET last_seen = datetime('now')",
            )
            .bind(&entry.url)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
            let url_id: i64 = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&entry.url).fetch_one(&mut *tx).await.map_err(err)?;

            sqlx::query(
                "INSERT INTO url_sitemaps (url_id, sitemap_id, position) VALUES (?1, ?2, ?3)
                 ON CONFLICT(url_id, sitemap_id) DO NOTHING",
            )
            .bind(url_id)
            .bind(sitemap_id)
            .bind(entry.position as i64)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
        }
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

async fn write_hreflang_table(pool: &SqlitePool, table: &str, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
    let sql = format!("INSERT INTO {table} (url_id, hreflang_id, href_url_id) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING");
    let mut tx = pool.begin().await.map_err(err)?;
    for row in rows {
        let Some(url_id): Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.url).fetch_optional(&mut *tx).await.map_err(err)? else {
            continue;
        };
        let Some(href_id): Option<i64> = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?1").bind(&row.href).fetch_optional(&mut *tx).await.map_err(err)? else {
            continue;
        };
        sqlx::query("INSERT INTO hreflang_languages (language_code) VALUES (?1) ON CONFLICT(language_code) DO NOTHING").bind(&row.hreflang).execute(&mut *tx).await.map_err(err)?;
        let hreflang_id: i64 =
            sqlx::query_scalar("SELECT id FROM hreflang_languages WHERE language_code = ?1").bind(&row.hreflang).fetch_one(&mut *tx).await.map_err(err)?;

        sqlx::query(&sql).bind(url_id).bind(hreflang_id).bind(href_id).execute(&mut *tx).await.map_err(err)?;
    }
    tx.commit().await.map_err(err)?;
    Ok(())
}

pub async fn write_hreflang_sitemap(pool: &SqlitePool, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
    write_hreflang_table(pool, "hreflang_sitemap", rows).await
}

pub async fn write_hreflang_http_header(pool: &SqlitePool, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
    write_hreflang_table(pool, "hreflang_http_header", rows).await
}

pub async fn record_failed_url(
    pool: &SqlitePool,
    url: &str,
    status: u16,
    reason: &str,
    retry_delay_secs: f64,
    retry_backoff_factor: f64,
) -> Result<(), CrawlError> {
    let Some(url_id): Option<i64> = url_id(pool, url).await? else { return Ok(()) };
    let existing_retry_count: i64 =
        sqlx::query_scalar("SELECT retry_count FROM failed_urls WHERE url_id = ?1")
            .bind(url_id)
            .fetch_optional(pool)
            .await
            .map_err(err)?
            .unwrap_or(0);
    let delay_secs = retry_delay_secs * retry_backoff_factor.powi(existing_retry_count as i32);
    let next_retry_at = Utc::now() + chrono::Duration::milliseconds((delay_secs * 1000.0) as i64);
    sqlx::query(
        "INSERT INTO failed_urls (url_id, status_code, failure_reason, retry_count, next_retry_at)
         VALUES (?1, ?2, ?3, 1, ?4)
         ON CONFLICT(url_id) DO UPDATE SET
            status_code = excluded.status_code, failure_reason = excluded.failure_reason,
            retry_count = failed_urls.retry_count + 1, next_retry_at = excluded.next_retry_at, updated_at = datetime('now')",
    )
    .bind(url_id)
    .bind(status as i64)
    .bind(reason)
    .bind(next_retry_at)
    .execute(pool)
    .await
    .map_err(err)?;
    Ok(())
}

pub async fn remove_failed_url(pool: &SqlitePool, url: &str) -> Result<(), CrawlError> {
    sqlx::query("DELETE FROM failed_urls WHERE url_id = (SELECT id FROM urls WHERE url = ?1)").bind(url).execute(pool).await.map_err(err)?;
    Ok(())
}

pub async fn urls_ready_for_retry(pool: &SqlitePool, max_retries: u32) -> Result<Vec<RetryCandidate>, CrawlError> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT u.id, u.url FROM failed_urls f JOIN urls u ON u.id = f.url_id
         WHERE f.next_retry_at <= datetime('now') AND f.retry_count < ?1",
    )
    .bind(max_retries as i64)
    .fetch_all(pool)
    .await
    .map_err(err)?;
    Ok(rows.into_iter().map(|(url_id, url)| RetryCandidate { url_id, url }).collect())
}

pub async fn backfill_missing_frontier_entries(pool: &SqlitePool, base_domain: &str) -> Result<u64, CrawlError> {
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
/// internal-inlinks count. Sequential, one row at a time -- SQLite has no
/// `UNNEST` for a bulk update.
pub async fn rescore_frontier(pool: &SqlitePool) -> Result<(), CrawlError> {
    let rows: Vec<(i64, i64, f64, f64, i64)> = sqlx::query_as(
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

    for (url_id, depth, sitemap_priority, content_type_score, inlinks_count) in rows {
        let score = webcrawl_frontier::depth_score(depth as u32) * webcrawl_frontier::DEPTH_WEIGHT
            + webcrawl_frontier::sitemap_priority_score(Some(sitemap_priority)) * webcrawl_frontier::SITEMAP_WEIGHT
            + webcrawl_frontier::inlinks_score(inlinks_count as u64) * webcrawl_frontier::INLINKS_WEIGHT
            + content_type_score * webcrawl_frontier::CONTENT_TYPE_WEIGHT;
        sqlx::query("UPDATE frontier SET inlinks_count = ?1, priority_score = ?2, updated_at = datetime('now') WHERE url_id = ?3")
            .bind(inlinks_count)
            .bind(score)
            .bind(url_id)
            .execute(pool)
            .await
            .map_err(err)?;
    }
    Ok(())
}
