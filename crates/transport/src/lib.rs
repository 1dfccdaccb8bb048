pub mod http;

#[cfg(feature = "browser")]
pub mod browser;

pub use http::HttpTransport;

#[cfg(feature = "browser")]
pub use browser::BrowserTransport;

use async_trait::async_trait;
use url::Url;
use webcrawl_core::{CrawlError, FetchConfig, FetchResponse};

/// A pluggable way to fetch a URL. Implemented by a plain HTTP client and,
/// optionally, a headless-browser renderer -- the two are interchangeable
/// from the crawl engine's point of view.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError>;
}

/// Picks the browser transport when requested and available, otherwise
/// falls back to the plain HTTP transport. Never fails the run because a
/// browser binary is missing.
pub async fn build_transport(use_browser: bool) -> Box<dyn FetchTransport> {
    #[cfg(feature = "browser")]
    if use_browser {
        match browser::BrowserTransport::launch().await {
            Ok(transport) => return Box::new(transport),
            Err(err) => {
                tracing::warn!(error = %err, "browser transport unavailable, falling back to http");
            }
        }
    }

    #[cfg(not(feature = "browser"))]
    if use_browser {
        tracing::warn!("browser transport compiled out, falling back to http");
    }

    Box::new(HttpTransport::new())
}
