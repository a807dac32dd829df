//! HTTP client wrapper for fetching portal pages.
//!
//! All fetch sites share one [`RetryPolicy`]: transient failures (connect
//! errors, timeouts, 5xx, too-short bodies) retry with multiplicative
//! backoff; a 404 is a definitive absence signal and never retried.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::config::{HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::error::{HarvestError, Result};

/// Retry behavior shared by every fetch site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (first try included).
    pub max_attempts: u32,

    /// Base delay for multiplicative backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given attempt (1-based): 500ms, 1000ms, 2000ms...
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms * (1 << (attempt.saturating_sub(1))))
    }
}

/// Create a configured HTTP client.
///
/// The client is reused across thousands of sequential requests, so
/// connection pooling matters more than construction cost.
pub fn create_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Fetch a page as text, enforcing a minimum body length.
///
/// # Arguments
/// * `client` - HTTP client to use
/// * `policy` - Retry policy
/// * `url` - URL to fetch
/// * `min_len` - Minimum acceptable body length in bytes; shorter 200
///   responses are treated as disguised error pages and retried
///
/// # Returns
/// The response body.
///
/// # Errors
/// * `HarvestError::NotFound` on HTTP 404 (immediately, no retry)
/// * `HarvestError::HttpStatus` on other client errors (no retry) or on a
///   server error that persisted through all attempts
/// * `HarvestError::ShortBody` when every attempt produced a too-short body
/// * `HarvestError::RetriesExhausted` for persistent transport failures
pub fn fetch_html(client: &Client, policy: RetryPolicy, url: &str, min_len: usize) -> Result<String> {
    let mut last_error: Option<HarvestError> = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, url, "Retrying after delay");
            thread::sleep(delay);
        }

        match client.get(url).send() {
            Ok(response) => {
                let status = response.status();

                if status == StatusCode::NOT_FOUND {
                    return Err(HarvestError::NotFound {
                        url: url.to_string(),
                    });
                }

                // Retry on server errors (5xx)
                if status.is_server_error() {
                    tracing::warn!(
                        status = %status,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        url,
                        "Server error, will retry"
                    );
                    last_error = Some(HarvestError::HttpStatus {
                        code: status.as_u16(),
                        url: url.to_string(),
                    });
                    continue;
                }

                // Don't retry other client errors (4xx) - they won't succeed
                if !status.is_success() {
                    return Err(HarvestError::HttpStatus {
                        code: status.as_u16(),
                        url: url.to_string(),
                    });
                }

                let body = match response.text() {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(error = %e, attempt = attempt + 1, url, "Body read failed, will retry");
                        last_error = Some(HarvestError::Http(e));
                        continue;
                    }
                };

                if body.len() < min_len {
                    tracing::warn!(
                        len = body.len(),
                        min_len,
                        attempt = attempt + 1,
                        url,
                        "Response body too short, will retry"
                    );
                    last_error = Some(HarvestError::ShortBody {
                        url: url.to_string(),
                        len: body.len(),
                        min: min_len,
                    });
                    continue;
                }

                return Ok(body);
            }
            Err(e) => {
                // Retry on connection/timeout errors
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        url,
                        "Connection error, will retry"
                    );
                    last_error = Some(HarvestError::Http(e));
                    continue;
                }
                // Other errors (like invalid URL) - don't retry
                return Err(HarvestError::Http(e));
            }
        }
    }

    // All retries exhausted; keep the precise cause where it classifies
    // the record (short body, persistent 5xx).
    match last_error {
        Some(e @ HarvestError::ShortBody { .. }) | Some(e @ HarvestError::HttpStatus { .. }) => {
            Err(e)
        }
        Some(e) => Err(HarvestError::RetriesExhausted {
            attempts: policy.max_attempts,
            message: e.to_string(),
        }),
        None => Err(HarvestError::RetriesExhausted {
            attempts: policy.max_attempts,
            message: "Unknown error".to_string(),
        }),
    }
}
