//! Feed fetching: a single GET with timeout, retried with exponential backoff.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, RetryPolicy};
use crate::error::FetchError;
use crate::parser::{RawEnvelope, parse_envelope};

/// Anything the scheduler can pull raw feed envelopes from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawEnvelope, FetchError>;
}

/// Fetches GBFS documents through an [`HttpClient`].
///
/// Each attempt is bounded by `timeout` (request and body). Network errors,
/// timeouts, 5xx, 429 and unparseable bodies are retried up to
/// `retry.max_attempts` total attempts; other 4xx responses fail at once.
pub struct FeedFetcher<C> {
    client: C,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<C: HttpClient> FeedFetcher<C> {
    pub fn new(client: C, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            client,
            timeout,
            retry,
        }
    }

    pub fn from_config(client: C, config: &Config) -> Self {
        Self::new(client, config.per_feed_timeout(), config.retry_policy)
    }

    /// Fetches `url` and returns the raw body.
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.with_retry(url, Ok).await
    }

    /// Fetches `url` and decodes the GBFS envelope.
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub async fn fetch_envelope(&self, url: &str) -> Result<RawEnvelope, FetchError> {
        self.with_retry(url, |bytes| parse_envelope(&bytes)).await
    }

    async fn with_retry<T>(
        &self,
        url: &str,
        parse: impl Fn(Vec<u8>) -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 1;
        loop {
            let result = self.attempt(url).await.and_then(&parse);
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = url
            .parse::<reqwest::Url>()
            .map_err(|e| FetchError::Network(format!("invalid URL {url}: {e}")))?;
        let req = reqwest::Request::new(reqwest::Method::GET, parsed);

        let request = async {
            let resp = self.client.execute(req).await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }
            Ok::<_, FetchError>(resp.bytes().await?.to_vec())
        };

        let bytes = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout)??;
        debug!(bytes = bytes.len(), "Feed bytes received");
        Ok(bytes)
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for FeedFetcher<C> {
    async fn fetch(&self, url: &str) -> Result<RawEnvelope, FetchError> {
        self.fetch_envelope(url).await
    }
}
