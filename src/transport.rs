// src/transport.rs
//! HTTP transport against the portal: a shared connection pool, a total-call
//! timeout, and an exponential-backoff retry loop over the portal's known
//! transient failure modes. Retry state lives entirely inside one call.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tracing::{error, warn};

/// Statuses worth another attempt: rate limiting and transient server errors.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

/// Errors that survive the retry loop and reach the coordinator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A response status that retrying will not fix.
    #[error("terminal response status {status}")]
    Terminal { status: StatusCode },

    /// Every allowed attempt failed with a retryable outcome.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Delay slept before attempt `next_attempt` (attempts are numbered from 1,
    /// so the delay before attempt n+1 is `backoff_base ^ n`). No jitter.
    fn delay_before(&self, next_attempt: u32) -> Duration {
        let exp = next_attempt.saturating_sub(1) as i32;
        Duration::from_secs_f64(self.backoff_base.powi(exp).max(0.0))
    }
}

/// Fixed XHR-style header set the portal expects on metric requests.
/// Content-Type is supplied by the form encoder.
pub fn xhr_headers(origin: &str, referer: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/html, */*; q=0.01"));
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(origin).context("origin header value")?,
    );
    headers.insert(
        REFERER,
        HeaderValue::from_str(referer).context("referer header value")?,
    );
    headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"),
    );
    Ok(headers)
}

/// Shared client + retry policy. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(timeout: Duration, pool_max_idle_per_host: usize, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build()
            .context("building http client")?;
        Ok(Self { client, policy })
    }

    /// Wrap a pre-existing client (e.g. one with a warm session).
    pub fn from_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// One-time liveness probe against the portal root. A failure here is
    /// fatal for the whole run, unlike per-task retryable failures.
    pub async fn probe(&self, url: &str) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("reaching portal root {url}"))?;
        if !resp.status().is_success() {
            bail!("portal root {url} answered status {}", resp.status());
        }
        Ok(())
    }

    /// POST a form to `url`, retrying retryable statuses and timeouts with
    /// exponential backoff. Unexpected transport errors are treated like
    /// timeouts and retried until attempts run out.
    pub async fn post_form_with_retry(
        &self,
        url: &str,
        form: &[(&str, String)],
        headers: &HeaderMap,
    ) -> Result<Response, TransportError> {
        let mut attempt = 1u32;
        loop {
            let sent = self
                .client
                .post(url)
                .headers(headers.clone())
                .form(form)
                .send()
                .await;
            match sent {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if is_retryable_status(resp.status()) => {
                    warn!(
                        status = %resp.status(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "retryable status from portal"
                    );
                }
                Ok(resp) => {
                    error!(status = %resp.status(), "non-retryable status from portal");
                    return Err(TransportError::Terminal {
                        status: resp.status(),
                    });
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "portal call timed out"
                    );
                }
                Err(e) => {
                    warn!(
                        error = ?e,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "portal call failed, treating as retryable"
                    );
                }
            }

            if attempt >= self.policy.max_attempts {
                return Err(TransportError::RetriesExhausted { attempts: attempt });
            }
            attempt += 1;
            tokio::time::sleep(self.policy.delay_before(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_are_the_portal_transients() {
        for code in [429u16, 500, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [400u16, 401, 403, 404, 418] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn backoff_grows_exponentially_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base: 1.5,
        };
        assert_eq!(policy.delay_before(2), Duration::from_secs_f64(1.5));
        assert_eq!(policy.delay_before(3), Duration::from_secs_f64(2.25));
        assert_eq!(policy.delay_before(4), Duration::from_secs_f64(3.375));
    }

    #[test]
    fn xhr_headers_carry_the_portal_contract() {
        let h = xhr_headers("https://portal.test", "https://portal.test/").unwrap();
        assert_eq!(h.get("x-requested-with").unwrap(), "XMLHttpRequest");
        assert_eq!(h.get(ORIGIN).unwrap(), "https://portal.test");
        assert!(h.get(USER_AGENT).unwrap().to_str().unwrap().starts_with("Mozilla/5.0"));
    }
}
