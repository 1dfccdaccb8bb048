//! Backend-portable persistence. [`Store`] wraps either a PostgreSQL or a
//! SQLite connection pool and dispatches every batch operation to the
//! matching dialect module. The crawl engine only ever sees this enum --
//! it never touches `sqlx::PgPool`/`SqlitePool` directly.

pub mod compress;
pub mod postgres;
pub mod sqlite;
pub mod types;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{PgPool, SqlitePool};
use tracing::info;

use webcrawl_core::{AppConfig, CrawlError};

pub use types::*;

#[derive(Clone)]
pub enum Store {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Store {
    /// Connects according to `config.database.backend` ("postgresql" or
    /// "sqlite") and runs the matching migration set.
    pub async fn connect(config: &AppConfig) -> Result<Self, CrawlError> {
        let store = match config.database.backend.as_str() {
            "postgresql" | "postgres" => {
                let url = config.database.postgres_url.as_deref().ok_or_else(|| {
                    CrawlError::Config("database.backend=postgresql requires database.postgres_url".into())
                })?;
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .connect(url)
                    .await
                    .map_err(|e| CrawlError::Storage(e.to_string()))?;
                info!(backend = "postgresql", max_connections = config.database.max_connections, "connected to store");
                Store::Postgres(pool)
            }
            other => {
                if other != "sqlite" {
                    tracing::warn!(backend = other, "unrecognized database.backend, defaulting to sqlite");
                }
                let options = SqliteConnectOptions::new()
                    .filename(&config.database.sqlite_path)
                    .create_if_missing(true);
                // SQLite has no row-level locking; a single writer connection
                // avoids `database is locked` errors under concurrent batches.
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect_with(options)
                    .await
                    .map_err(|e| CrawlError::Storage(e.to_string()))?;
                info!(backend = "sqlite", path = %config.database.sqlite_path, "connected to store");
                Store::Sqlite(pool)
            }
        };
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<(), CrawlError> {
        let (init, views): (&str, &str) = match self {
            Store::Postgres(_) => (
                include_str!("../../../migrations/postgres/0001_init.sql"),
                include_str!("../../../migrations/postgres/0002_views.sql"),
            ),
            Store::Sqlite(_) => (
                include_str!("../../../migrations/sqlite/0001_init.sql"),
                include_str!("../../../migrations/sqlite/0002_views.sql"),
            ),
        };
        match self {
            Store::Postgres(pool) => {
                sqlx::raw_sql(init).execute(pool).await.map_err(|e| CrawlError::Storage(e.to_string()))?;
                sqlx::raw_sql(views).execute(pool).await.map_err(|e| CrawlError::Storage(e.to_string()))?;
            }
            Store::Sqlite(pool) => {
                sqlx::raw_sql(init).execute(pool).await.map_err(|e| CrawlError::Storage(e.to_string()))?;
                sqlx::raw_sql(views).execute(pool).await.map_err(|e| CrawlError::Storage(e.to_string()))?;
            }
        }
        info!("migrations complete");
        Ok(())
    }

    pub async fn upsert_urls(&self, rows: &[UrlUpsert]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::upsert_urls(pool, rows).await,
            Store::Sqlite(pool) => sqlite::upsert_urls(pool, rows).await,
        }
    }

    pub async fn enqueue_frontier(&self, rows: &[FrontierSeed]) -> Result<u64, CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::enqueue_frontier(pool, rows).await,
            Store::Sqlite(pool) => sqlite::enqueue_frontier(pool, rows).await,
        }
    }

    pub async fn mark_frontier_done(&self, urls: &[String]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::mark_frontier_done(pool, urls).await,
            Store::Sqlite(pool) => sqlite::mark_frontier_done(pool, urls).await,
        }
    }

    pub async fn reset_pending_to_queued(&self, urls: &[String]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::reset_pending_to_queued(pool, urls).await,
            Store::Sqlite(pool) => sqlite::reset_pending_to_queued(pool, urls).await,
        }
    }

    pub async fn reset_all_pending(&self, max_reset_count: u32) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::reset_all_pending(pool, max_reset_count).await,
            Store::Sqlite(pool) => sqlite::reset_all_pending(pool, max_reset_count).await,
        }
    }

    pub async fn next_frontier_batch(&self, n: i64) -> Result<Vec<FrontierJob>, CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::next_frontier_batch(pool, n).await,
            Store::Sqlite(pool) => sqlite::next_frontier_batch(pool, n).await,
        }
    }

    pub async fn write_pages(&self, rows: &[PageWrite]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::write_pages(pool, rows).await,
            Store::Sqlite(pool) => sqlite::write_pages(pool, rows).await,
        }
    }

    pub async fn write_content_with_url_resolution(&self, rows: &[ContentWrite]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::write_content_with_url_resolution(pool, rows).await,
            Store::Sqlite(pool) => sqlite::write_content_with_url_resolution(pool, rows).await,
        }
    }

    pub async fn write_internal_links(&self, rows: &[LinkWrite]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::write_internal_links(pool, rows).await,
            Store::Sqlite(pool) => sqlite::write_internal_links(pool, rows).await,
        }
    }

    pub async fn write_redirects(&self, rows: &[RedirectWrite]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::write_redirects(pool, rows).await,
            Store::Sqlite(pool) => sqlite::write_redirects(pool, rows).await,
        }
    }

    pub async fn write_sitemaps_and_urls(&self, rows: &[SitemapWrite]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::write_sitemaps_and_urls(pool, rows).await,
            Store::Sqlite(pool) => sqlite::write_sitemaps_and_urls(pool, rows).await,
        }
    }

    pub async fn write_hreflang_sitemap(&self, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::write_hreflang_sitemap(pool, rows).await,
            Store::Sqlite(pool) => sqlite::write_hreflang_sitemap(pool, rows).await,
        }
    }

    pub async fn write_hreflang_http_header(&self, rows: &[HreflangWrite]) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::write_hreflang_http_header(pool, rows).await,
            Store::Sqlite(pool) => sqlite::write_hreflang_http_header(pool, rows).await,
        }
    }

    /// Records a transient failure and schedules the next retry at
    /// `retry_delay_secs * retry_backoff_factor ^ retry_count`, where
    /// `retry_count` is this URL's existing failure count.
    pub async fn record_failed_url(
        &self,
        url: &str,
        status: u16,
        reason: &str,
        retry_delay_secs: f64,
        retry_backoff_factor: f64,
    ) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => {
                postgres::record_failed_url(pool, url, status, reason, retry_delay_secs, retry_backoff_factor).await
            }
            Store::Sqlite(pool) => {
                sqlite::record_failed_url(pool, url, status, reason, retry_delay_secs, retry_backoff_factor).await
            }
        }
    }

    pub async fn remove_failed_url(&self, url: &str) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::remove_failed_url(pool, url).await,
            Store::Sqlite(pool) => sqlite::remove_failed_url(pool, url).await,
        }
    }

    pub async fn urls_ready_for_retry(&self, max_retries: u32) -> Result<Vec<RetryCandidate>, CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::urls_ready_for_retry(pool, max_retries).await,
            Store::Sqlite(pool) => sqlite::urls_ready_for_retry(pool, max_retries).await,
        }
    }

    pub async fn backfill_missing_frontier_entries(&self, base_domain: &str) -> Result<u64, CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::backfill_missing_frontier_entries(pool, base_domain).await,
            Store::Sqlite(pool) => sqlite::backfill_missing_frontier_entries(pool, base_domain).await,
        }
    }

    /// Count of `queued` frontier rows, used to decide whether the run has
    /// drained or merely exhausted the current batch window.
    pub async fn queued_count(&self) -> Result<i64, CrawlError> {
        let row: (i64,) = match self {
            Store::Postgres(pool) => sqlx::query_as("SELECT COUNT(*) FROM frontier WHERE status = 'queued'")
                .fetch_one(pool)
                .await
                .map_err(|e| CrawlError::Storage(e.to_string()))?,
            Store::Sqlite(pool) => sqlx::query_as("SELECT COUNT(*) FROM frontier WHERE status = 'queued'")
                .fetch_one(pool)
                .await
                .map_err(|e| CrawlError::Storage(e.to_string()))?,
        };
        Ok(row.0)
    }

    /// Rescales every queued frontier row's priority score from the
    /// current internal-links count, per the periodic-rescoring rule.
    pub async fn rescore_frontier(&self) -> Result<(), CrawlError> {
        match self {
            Store::Postgres(pool) => postgres::rescore_frontier(pool).await,
            Store::Sqlite(pool) => sqlite::rescore_frontier(pool).await,
        }
    }

    /// Prior `etag`/`last_modified` for a URL, if it was fetched before,
    /// used to build conditional request headers on refetch.
    pub async fn conditional_headers_for(&self, url: &str) -> Result<Option<(Option<String>, Option<String>)>, CrawlError> {
        let row: Option<(Option<String>, Option<String>)> = match self {
            Store::Postgres(pool) => sqlx::query_as(
                "SELECT pm.etag, pm.last_modified FROM page_metadata pm JOIN urls u ON u.id = pm.url_id WHERE u.url = $1",
            )
            .bind(url)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?,
            Store::Sqlite(pool) => sqlx::query_as(
                "SELECT pm.etag, pm.last_modified FROM page_metadata pm JOIN urls u ON u.id = pm.url_id WHERE u.url = ?1",
            )
            .bind(url)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?,
        };
        Ok(row)
    }
}
