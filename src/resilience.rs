//! Retry schedules and a bounded retry helper.
//!
//! - [`RetryConfig`]: exponential backoff schedule plus per-attempt timeout
//! - [`retry_with_backoff`]: drive an async operation through a schedule
//!
//! The push path uses a short bounded schedule (see
//! [`PushConfig::retry_config`](crate::config::PushConfig::retry_config)).
//! The subscriber uses [`RetryConfig::daemon`] and never gives up.

use crate::error::{ReplicationError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    /// Set to `usize::MAX` for infinite retries (daemon mode).
    pub max_attempts: usize,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,

    /// Timeout for each individual attempt.
    pub connection_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Fast-fail retry for the initial broker connection.
    ///
    /// Gives up after roughly 45 seconds so a misconfigured broker URL
    /// surfaces at startup instead of hanging the process.
    ///
    /// ```text
    /// Attempt  Delay     Cumulative
    /// -------  -----     ----------
    /// 1        500ms     500ms
    /// 2        750ms     1.25s
    /// 3        1.12s     2.37s
    /// ...
    /// 20       30s       ~45s (total)
    /// ```
    pub fn startup() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 1.5,
            connection_timeout: Duration::from_secs(10),
        }
    }

    /// Infinite retry for the event subscriber.
    ///
    /// Once the replica is up, a broker outage must never kill the
    /// subscriber: queued events are delivered when it comes back.
    ///
    /// ```text
    /// Attempt  Delay
    /// -------  -----
    /// 1        1s
    /// 2        2s
    /// 3        4s
    /// ...
    /// 9        256s
    /// 10+      300s (cap, retry forever)
    /// ```
    pub fn daemon() -> Self {
        Self {
            max_attempts: usize::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_factor: 2.0,
            connection_timeout: Duration::from_secs(30),
        }
    }

    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            connection_timeout: Duration::from_millis(500),
        }
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        // powi overflows to inf long before usize attempts run out; clamp first.
        let exponent = (attempt - 1).min(64) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        std::cmp::min(Duration::from_secs_f64(delay_secs), self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// schedule is exhausted.
///
/// Each attempt is bounded by `config.connection_timeout`. The last error
/// is returned when attempts run out.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0usize;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(config.connection_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ReplicationError::timeout(operation, config.connection_timeout)),
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
