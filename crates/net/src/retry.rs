use std::future::Future;
use std::time::Duration;

use tracing::warn;

use memoir_config::RetryConfig;

use crate::error::ApiError;

/// Bounded geometric backoff schedule for one network call.
///
/// The wrapped operation is transient and never persisted: it exists only
/// for the duration of the call and is dropped when the operation succeeds
/// or the attempt budget runs out.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt `attempt` (0-based).  Doubles per
    /// attempt and is capped, so the schedule is non-decreasing.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(16) as u32;
        (self.base_delay * factor).min(self.max_delay)
    }
}

/// Run `op` up to `policy.max_attempts` times.
///
/// Only [`ApiError::is_transient`] failures are retried; anything else is
/// returned immediately without consuming the remaining budget.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let budget = policy.max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !err.is_transient() || attempt >= budget {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(label, attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient failure; retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
