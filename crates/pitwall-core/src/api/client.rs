//! HTTP client for the Ergast-compatible results API.

use std::time::Duration;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiError, DataSource, Endpoint};
use crate::config::ApiSettings;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the results API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct ErgastClient {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl ErgastClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("pitwall/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
        })
    }

    /// Longest a single `fetch` can take: every attempt timing out plus all backoff sleeps.
    pub fn fetch_budget(settings: &ApiSettings) -> Duration {
        let attempts = settings.max_retries.saturating_add(1);
        let backoff_ms: u64 = (0..settings.max_retries)
            .map(|retry| INITIAL_BACKOFF_MS.saturating_mul(1u64 << retry.min(16)))
            .sum();
        settings.timeout() * attempts + Duration::from_millis(backoff_ms)
    }

    pub fn url_for(&self, endpoint: &Endpoint) -> String {
        format!("{}/{}.json", self.base_url, endpoint.path())
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.client.get(url).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    let value = serde_json::from_str(&text)
                        .map_err(|e| ApiError::InvalidResponse(format!("{} from {}", e, url)))?;
                    debug!(url = url, bytes = text.len(), "Fetched payload");
                    return Ok(value);
                }
                None => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

impl DataSource for ErgastClient {
    fn fetch<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Value, ApiError>> {
        async move {
            let url = self.url_for(endpoint);
            self.get(&url).await
        }
        .boxed()
    }
}
