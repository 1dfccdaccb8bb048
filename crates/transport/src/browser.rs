use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::Mutex;
use url::Url;
use webcrawl_core::{CrawlError, FetchConfig, FetchResponse};

use crate::FetchTransport;

/// Headless-browser transport. A graceful-degradation alternative to
/// `HttpTransport`: the crawl engine only reaches for this when configured
/// to, and `launch` failing (no Chrome/Chromium binary available) is not
/// fatal to the run -- callers fall back to `HttpTransport` instead.
pub struct BrowserTransport {
    browser: Mutex<Browser>,
}

impl BrowserTransport {
    pub async fn launch() -> anyhow::Result<Self> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("invalid browser config: {e}"))?;
        let (browser, mut handler) = Browser::launch(config).await?;

        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser: Mutex::new(browser),
        })
    }
}

#[async_trait]
impl FetchTransport for BrowserTransport {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let started = Instant::now();
        let browser = self.browser.lock().await;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        let result: anyhow::Result<(String, String)> = async {
            page.goto(url.as_str()).await?;
            page.wait_for_navigation().await?;
            let final_url = page
                .url()
                .await?
                .unwrap_or_else(|| url.to_string());
            let content = page.content().await?;
            Ok((final_url, content))
        }
        .await;

        let _ = page.close().await;

        let (final_url, content) = match result {
            Ok(pair) => pair,
            Err(_) => return Ok(FetchResponse::transport_failure(url.clone())),
        };

        let final_url = Url::parse(&final_url).unwrap_or_else(|_| url.clone());
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());

        let _ = &config.timeout; // navigation timeout handled by chromiumoxide defaults

        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            initial_status: 200,
            final_status: 200,
            headers,
            body: content.into_bytes(),
            content_type: Some("text/html".to_string()),
            fetched_at: chrono::Utc::now(),
            response_time_ms: started.elapsed().as_millis() as u64,
            redirect_chain: Vec::new(),
        })
    }
}
