use log::debug;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::feeds::FeedError;

const USER_AGENT: &str = "TON-BuyBot/1.0 (Telegram)";

/// Retry policy for rate-limited or failing upstream APIs
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(750),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let backoff = base.saturating_mul(1u64 << attempt.min(6));
        let jitter = fastrand::u64(0..=base / 2);
        Duration::from_millis(backoff + jitter)
    }
}

/// Shared JSON-over-HTTP client for the data APIs
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryConfig,
}

impl HttpClient {
    /// Create a client whose every request is capped at `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// GET `url` and decode the JSON body. 429 and 5xx responses are retried
    /// according to the retry policy; everything else fails immediately.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let mut attempt = 0;

        loop {
            let response = self
                .client
                .get(url)
                .query(query)
                .header(ACCEPT, "application/json")
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body = response.bytes().await?;
                return serde_json::from_slice(&body).map_err(|e| FeedError::Decode {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.retry.max_retries {
                let delay = self.retry.delay_for(attempt);
                debug!("{} returned {}, retrying in {:?}", url, status, delay);
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
    }
}
