//! Exponential-backoff retry for transient venue errors.
//!
//! Network failures, timeouts, 429s, and 5xx responses are retried with
//! jittered exponential delays. Authentication errors, malformed input,
//! and business rejections surface immediately.

use rand::Rng;
use spot_arb_core::{VenueError, VenueResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry behaviour for one class of operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry attempts after the first try.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with a given number of retries, keeping default delays.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Fast policy for tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            exponential_base: 2.0,
        }
    }

    /// Backoff delay for a zero-based attempt number, before jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt as i32);
        let millis = self.initial_delay.as_millis() as f64 * exp;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    /// Delay with up to 20% additive jitter.
    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let jitter = rand::thread_rng().gen_range(0.0..0.2);
        let millis = base.as_millis() as f64 * (1.0 + jitter);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Runs `op`, retrying transient failures per `policy`.
///
/// `label` names the operation in log lines.
///
/// # Errors
/// Returns the last error once retries are exhausted, or the first
/// non-transient error immediately.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> VenueResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VenueResult<T>>,
{
    let mut last_err: Option<VenueError> = None;
    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt == policy.max_retries {
                    return Err(err);
                }
                let delay = match err.retry_delay_secs() {
                    Some(secs) if Duration::from_secs(secs) > policy.jittered(attempt) => {
                        Duration::from_secs(secs)
                    }
                    _ => policy.jittered(attempt),
                };
                warn!(
                    operation = label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                last_err = Some(err);
                tokio::time::sleep(delay).await;
            }
        }
    }
    // Loop always returns; this is unreachable but keeps the compiler honest.
    Err(last_err.unwrap_or_else(|| VenueError::Network("retry loop exhausted".into())))
}
