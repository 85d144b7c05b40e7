//! Authenticated registry client with quota and retries

use crate::error::FetchError;
use crate::fetch::limiter::QuotaLimiter;
use crate::fetch::Fetch;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff between attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What to do with a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Payload,
    /// Answer with `{"error": <message>}` instead of failing
    Sentinel(&'static str),
    Retry,
}

pub fn classify(status: StatusCode) -> StatusClass {
    match status {
        s if s.is_success() => StatusClass::Payload,
        StatusCode::NOT_FOUND => StatusClass::Sentinel("not found"),
        StatusCode::UNAUTHORIZED => StatusClass::Sentinel("not authorised"),
        StatusCode::BAD_REQUEST => StatusClass::Sentinel("bad request"),
        _ => StatusClass::Retry,
    }
}

/// Registry client: one quota slot per attempt, basic auth with the API key
pub struct RateLimitedFetcher {
    client: Client,
    api_key: String,
    limiter: QuotaLimiter,
    retry: RetryPolicy,
}

impl RateLimitedFetcher {
    pub fn new(
        api_key: impl Into<String>,
        limiter: QuotaLimiter,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(RateLimitedFetcher {
            client,
            api_key: api_key.into(),
            limiter,
            retry,
        })
    }
}

#[async_trait]
impl Fetch for RateLimitedFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut cause = String::new();

        for attempt in 1..=attempts {
            self.limiter.acquire().await;

            match self
                .client
                .get(url)
                .basic_auth(&self.api_key, Some(""))
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    match classify(status) {
                        StatusClass::Payload => {
                            return response.json::<Value>().await.map_err(|source| {
                                FetchError::Decode {
                                    url: url.to_string(),
                                    source,
                                }
                            });
                        }
                        StatusClass::Sentinel(message) => {
                            debug!(url, %status, "registry answered with a sentinel");
                            return Ok(json!({ "error": message }));
                        }
                        StatusClass::Retry => cause = format!("HTTP {}", status),
                    }
                }
                Err(e) => cause = e.to_string(),
            }

            if attempt < attempts {
                let delay = self.retry.delay_for(attempt);
                warn!(url, attempt, ?delay, cause = %cause, "request failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            cause,
        })
    }
}
