//! Retry policy for idempotent registry reads.
//!
//! Only searches go through here. Writes are sent once: a create that timed out may still have
//! been applied, and the workflow recovers from that by searching again on resume.
//!
//! - Max retries: 2 (3 attempts)
//! - Initial delay: 500 ms, doubling per retry, capped at 8 s
//! - Down-jitter of up to 25%
//! - Retryable: HTTP 408, 429, 5xx and connection/timeout errors
//! - `Retry-After` (seconds) is honoured when it is between 0 and 60 s
//! - Each attempt gets an equal share of the per-call timeout, so a hung first attempt still
//!   leaves room to retry

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction by which a delay may be randomly shortened (0.25 = up to 25%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that sends each request exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Time allowed for one attempt when every attempt must fit in `budget`.
    pub fn attempt_timeout(&self, budget: Duration) -> Duration {
        budget / self.max_retries.saturating_add(1)
    }
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date values are ignored; the backoff schedule applies instead.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let delay = Duration::from_secs(secs);
    (delay > Duration::ZERO && delay < Duration::from_secs(60)).then_some(delay)
}

/// Statuses that indicate a transient registry condition.
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500..=599)
}

/// Delay before retry number `backoff_step + 1`.
#[must_use]
pub fn retry_delay(backoff_step: u32, policy: &RetryPolicy, headers: Option<&HeaderMap>) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }

    let base = policy.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(policy.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * policy.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

/// Outcome of a request sent under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response: either not retryable, or the last of the allowed attempts.
    HttpError(Response),
    /// Transport failure on the last attempt, or one that is not worth retrying.
    ConnectionError { attempts: u32, source: reqwest::Error },
}

/// Send the request built by `build_request`, retrying transient failures.
pub async fn send_with_retry<F>(build_request: F, policy: &RetryPolicy) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let last_attempt = attempt >= policy.max_retries;

        match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return RetryOutcome::Success(response);
                }
                if last_attempt || !is_transient_status(status) {
                    return RetryOutcome::HttpError(response);
                }
                let delay = retry_delay(attempt, policy, Some(response.headers()));
                tracing::debug!(
                    %status,
                    retry = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying registry request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if last_attempt || !is_retryable_error(&e) {
                    return RetryOutcome::ConnectionError {
                        attempts: attempt + 1,
                        source: e,
                    };
                }
                let delay = retry_delay(attempt, policy, None);
                tracing::debug!(
                    error = %e,
                    retry = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying registry request after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
