use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use url::Url;
use webcrawl_core::{AuthConfig, AuthType, CrawlError, FetchConfig, FetchResponse, RedirectHop};

use crate::FetchTransport;

const MAX_REDIRECT_HOPS: usize = 10;

/// Plain HTTP(S) transport: HTTP/2, gzip/brotli/deflate, conditional
/// requests, explicit redirect-chain capture, and a handful of auth
/// schemes. Redirects are followed manually (one request per hop) rather
/// than via reqwest's built-in follower, so that every hop's status and
/// headers can be recorded.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .expect("reqwest client builder with static config must succeed");
        Self { client }
    }

    fn apply_auth(
        &self,
        mut builder: reqwest::RequestBuilder,
        url: &Url,
        auth: &AuthConfig,
    ) -> reqwest::RequestBuilder {
        if let Some(host_restriction) = &auth.restrict_to_host {
            if url.host_str() != Some(host_restriction.as_str()) {
                return builder;
            }
        }

        match auth.auth_type {
            // The reference client has no native Digest support either; it
            // falls back to Basic, and so do we.
            AuthType::Basic | AuthType::Digest => {
                builder = builder.basic_auth(
                    auth.username.clone().unwrap_or_default(),
                    auth.password.clone(),
                );
            }
            AuthType::Bearer | AuthType::Jwt => {
                if let Some(token) = &auth.token {
                    builder = builder.bearer_auth(token);
                }
            }
            AuthType::ApiKey => {
                let header = auth.header_name.clone().unwrap_or_else(|| "X-API-Key".to_string());
                if let Some(token) = &auth.token {
                    builder = builder.header(header, token);
                }
            }
            AuthType::Custom => {
                for (key, value) in &auth.custom_headers {
                    builder = builder.header(key, value);
                }
            }
        }
        builder
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let started = Instant::now();
        let mut current = url.clone();
        let mut chain = Vec::new();
        let mut initial_status: Option<u16> = None;

        for hop in 0..=MAX_REDIRECT_HOPS {
            let mut builder = self
                .client
                .get(current.clone())
                .timeout(config.timeout)
                .header("User-Agent", config.user_agent.as_str());

            if let Some(etag) = &config.if_none_match {
                builder = builder.header("If-None-Match", etag.as_str());
            }
            if let Some(since) = &config.if_modified_since {
                builder = builder.header("If-Modified-Since", since.as_str());
            }
            if let Some(auth) = &config.auth {
                builder = self.apply_auth(builder, &current, auth);
            }

            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(_) => return Ok(FetchResponse::transport_failure(url.clone())),
            };

            let status = response.status().as_u16();
            if initial_status.is_none() {
                initial_status = Some(status);
            }

            let headers = header_map(&response);

            if (300..400).contains(&status) && config.follow_redirects {
                chain.push(RedirectHop {
                    url: current.to_string(),
                    status,
                    headers: headers.clone(),
                });
                let Some(location) = headers.get("location").cloned() else {
                    return finalize(
                        url,
                        &current,
                        initial_status.unwrap_or(status),
                        status,
                        headers,
                        Vec::new(),
                        chain,
                        started,
                    );
                };
                let next = match current.join(&location) {
                    Ok(next) => next,
                    Err(_) => break,
                };
                current = next;
                if hop == MAX_REDIRECT_HOPS {
                    break;
                }
                continue;
            }

            let content_type = headers.get("content-type").cloned();
            let max_body = config.max_body_size;
            let body = match read_bounded_body(response, max_body).await {
                Ok(body) => body,
                Err(err) => return Err(err),
            };

            return finalize(
                url,
                &current,
                initial_status.unwrap_or(status),
                status,
                headers,
                body,
                chain,
                started,
            )
            .map(|mut resp| {
                resp.content_type = content_type;
                resp
            });
        }

        Ok(FetchResponse {
            url: url.clone(),
            final_url: current,
            initial_status: initial_status.unwrap_or(0),
            final_status: 0,
            headers: HashMap::new(),
            body: Vec::new(),
            content_type: None,
            fetched_at: chrono::Utc::now(),
            response_time_ms: started.elapsed().as_millis() as u64,
            redirect_chain: chain,
        })
    }
}

fn header_map(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

async fn read_bounded_body(
    response: reqwest::Response,
    max_body_size: usize,
) -> Result<Vec<u8>, CrawlError> {
    if let Some(len) = response.content_length() {
        if len as usize > max_body_size {
            return Err(CrawlError::BodyTooLarge {
                size: len as usize,
                max: max_body_size,
            });
        }
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| CrawlError::Network(e.to_string()))?;
    if bytes.len() > max_body_size {
        return Err(CrawlError::BodyTooLarge {
            size: bytes.len(),
            max: max_body_size,
        });
    }
    Ok(bytes.to_vec())
}

fn finalize(
    original_url: &Url,
    final_url: &Url,
    initial_status: u16,
    final_status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    redirect_chain: Vec<RedirectHop>,
    started: Instant,
) -> Result<FetchResponse, CrawlError> {
    Ok(FetchResponse {
        url: original_url.clone(),
        final_url: final_url.clone(),
        initial_status,
        final_status,
        headers,
        body,
        content_type: None,
        fetched_at: chrono::Utc::now(),
        response_time_ms: started.elapsed().as_millis() as u64,
        redirect_chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_sentinel_has_zero_status() {
        let url = Url::parse("https://example.com").unwrap();
        let resp = FetchResponse::transport_failure(url);
        assert_eq!(resp.initial_status, 0);
        assert_eq!(resp.final_status, 0);
        assert!(resp.redirect_chain.is_empty());
    }
}
