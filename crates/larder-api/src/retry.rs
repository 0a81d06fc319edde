// Backoff for flaky uploads
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// How hard to try before giving up on a request
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Pause before retry number `retry` (1-based), capped at `max_delay_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(ms.min(self.max_delay_ms as f64) as u64)
    }
}

/// Run `operation` until it succeeds, fails for good, or retries run out
///
/// Only errors `is_transient` accepts are retried; anything else comes back
/// on the spot. The last error is returned once the budget is spent.
pub async fn retry_transient<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("Succeeded on retry {}", retries);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_transient(&err) {
            return Err(err);
        }
        if retries >= config.max_retries {
            warn!("Giving up after {} attempts: {}", retries + 1, err);
            return Err(err);
        }

        retries += 1;
        let delay = config.delay_for(retries);
        warn!(
            "Attempt {} of {} failed: {}. Next try in {:?}",
            retries,
            config.max_retries + 1,
            err,
            delay
        );
        sleep(delay).await;
    }
}

/// Statuses that usually clear up on their own
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delays_grow_then_cap() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.delay_for(2), Duration::from_millis(1000));
        assert_eq!(config.delay_for(3), Duration::from_millis(2000));
        assert_eq!(config.delay_for(10), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = retry_transient(
            &config,
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("503")
                } else {
                    Ok("2024-05-01")
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok("2024-05-01"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_runs_out() {
        let config = RetryConfig {
            max_retries: 2,
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);

        let result = retry_transient(
            &config,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("connection reset")
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("connection reset"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result = retry_transient(
            &RetryConfig::default(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("415 unsupported media type")
            },
            |err: &&str| !err.starts_with("4"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::REQUEST_TIMEOUT));

        assert!(!is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(reqwest::StatusCode::PAYLOAD_TOO_LARGE));
    }
}
