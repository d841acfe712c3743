//! Retry with exponential backoff for remote calls.
//!
//! Every call to the remote API (run resolution, attachment upload, bulk
//! create, run completion) goes through [`with_retry`]. Transient errors are
//! retried; permanent ones are returned immediately.
//!
//! # Backoff
//!
//! | Error | Delay before retry `n` |
//! |-------|------------------------|
//! | `RateLimited { retry_after: Some(d) }` | `min(d, max_delay)` ±10 % |
//! | other transient | uniform in `[0, min(base * 2^(n-1), max_delay)]`, at least 10 ms |

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::api::{ApiError, ApiResult};
use crate::config::RetryConfig;

/// Retry limits and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based) after `error`.
    pub fn backoff(&self, retry: u32, error: &ApiError) -> Duration {
        let mut rng = rand::thread_rng();

        if let ApiError::RateLimited {
            retry_after: Some(retry_after),
        } = error
        {
            let capped = (*retry_after).min(self.max_delay);
            let jitter: f64 = rng.gen_range(0.9_f64..=1.1_f64);
            let millis = (capped.as_millis() as f64 * jitter).round() as u64;
            return Duration::from_millis(millis.max(10));
        }

        let exp = retry.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let millis = rng.gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis.max(10))
    }
}

/// Runs `op` until it succeeds, fails permanently, or retries run out.
///
/// `label` names the operation in log output.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut retries = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let backoff = policy.backoff(retries, &e);

                warn!(
                    operation = label,
                    error = %e,
                    retry = retries,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying request"
                );

                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
