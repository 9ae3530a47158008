// src/client/mod.rs

//! HTTP fetch plumbing shared by both pipeline clients.
//!
//! - `create_client`: configured reqwest client
//! - `RetryPolicy`: backoff schedule, kept pure so it tests without sleeping
//! - `get_json`: GET with retry/backoff, Retry-After handling and the
//!   404-as-end-of-pagination signal

pub mod cursor;
pub mod snapshot;

use std::time::Duration;

use reqwest::StatusCode;

use crate::error::{AppError, Result};
use crate::models::{FetchConfig, RawCreative};

pub use cursor::{CursorApiClient, CursorSource};
pub use snapshot::{SnapshotApiClient, SnapshotSource};

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &FetchConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Retry schedule for transient fetch failures.
///
/// Attempt `n` (1-based) backs off `n * base_delay`. 429 responses honor
/// the server's Retry-After clamped to `max_retry_after` and consume their
/// own `max_rate_limit_hits` budget instead of the retry budget, so a
/// rate-limited request never counts as a server failure but also cannot
/// stall forever.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_retry_after: Duration,
    pub max_rate_limit_hits: u32,
}

impl RetryPolicy {
    /// Build the policy from fetch configuration.
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.retry_delay_secs),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
            max_rate_limit_hits: config.max_rate_limit_hits,
        }
    }

    /// Backoff before retry `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// How long to wait on a 429, given the parsed Retry-After seconds.
    pub fn retry_after_delay(&self, header_secs: Option<u64>) -> Duration {
        let wanted = Duration::from_secs(header_secs.unwrap_or(60));
        wanted.min(self.max_retry_after)
    }
}

/// GET a URL and decode the JSON body, retrying transient failures.
///
/// Error contract: 404 maps to [`AppError::PageNotFound`] without retries;
/// network errors and 5xx retry with backoff until the budget is spent;
/// other non-2xx statuses fail immediately.
pub async fn get_json(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    policy: &RetryPolicy,
) -> Result<serde_json::Value> {
    let mut attempt: u32 = 1;
    let mut rate_limit_hits: u32 = 0;

    loop {
        let mut request = client.get(url).header("Accept", "application/json");
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status == StatusCode::NOT_FOUND {
                    return Err(AppError::PageNotFound {
                        url: url.to_string(),
                    });
                }

                if status == StatusCode::TOO_MANY_REQUESTS {
                    rate_limit_hits += 1;
                    if rate_limit_hits > policy.max_rate_limit_hits {
                        return Err(AppError::fetch(
                            url,
                            format!("rate limited {rate_limit_hits} times, giving up"),
                        ));
                    }
                    let header_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse().ok());
                    let delay = policy.retry_after_delay(header_secs);
                    log::warn!(
                        "Rate limited by {url} (hit {rate_limit_hits}), waiting {}s",
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                if status.is_server_error() {
                    if attempt > policy.max_retries {
                        return Err(AppError::fetch(
                            url,
                            format!("HTTP {status} after {} retries", policy.max_retries),
                        ));
                    }
                    let delay = policy.delay_for(attempt);
                    log::warn!(
                        "Server error {status} from {url}, retry {attempt}/{} in {}s",
                        policy.max_retries,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                let body = response.text().await.unwrap_or_default();
                return Err(AppError::fetch(url, format!("HTTP {status}: {body}")));
            }
            Err(e) => {
                if attempt > policy.max_retries {
                    return Err(AppError::fetch(
                        url,
                        format!("{e} after {} retries", policy.max_retries),
                    ));
                }
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "Request to {url} failed ({e}), retry {attempt}/{} in {}s",
                    policy.max_retries,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Interpret a page body. Both upstreams return a flat JSON array; an empty
/// array signals the end of pagination, and anything that is not an array
/// is treated as an empty page rather than a hard failure.
pub fn parse_page(body: serde_json::Value, url: &str) -> Vec<RawCreative> {
    match body {
        serde_json::Value::Array(items) => items,
        other => {
            log::warn!(
                "Unexpected non-array response from {url} ({})",
                type_name(&other)
            );
            Vec::new()
        }
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_retry_after: Duration::from_secs(60),
            max_rate_limit_hits: 5,
        }
    }

    #[test]
    fn backoff_grows_linearly_with_attempt() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(p.delay_for(3), Duration::from_secs(6));
    }

    #[test]
    fn retry_after_is_clamped() {
        let p = policy();
        assert_eq!(p.retry_after_delay(Some(10)), Duration::from_secs(10));
        assert_eq!(p.retry_after_delay(Some(600)), Duration::from_secs(60));
        assert_eq!(p.retry_after_delay(None), Duration::from_secs(60));
    }

    #[test]
    fn parse_page_accepts_array() {
        let page = parse_page(json!([{"id": 1}, {"id": 2}]), "http://x");
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn parse_page_tolerates_non_array() {
        assert!(parse_page(json!({"error": "nope"}), "http://x").is_empty());
        assert!(parse_page(json!(null), "http://x").is_empty());
    }
}
