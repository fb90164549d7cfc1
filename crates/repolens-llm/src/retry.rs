use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

const MAX_BACKOFF_SHIFT: u32 = 16;

/// Bounded retry with a per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_backoff: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `attempt + 1`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(1_u32 << attempt.min(MAX_BACKOFF_SHIFT))
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the retry
/// budget is spent.
///
/// Each attempt runs under `policy.timeout`; an attempt that exceeds it counts
/// as a retryable [`LlmError::Timeout`]. Nothing is shared between attempts, so
/// a failed attempt leaves no partial state behind.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-retryable error.
pub async fn with_retry<T, F, Fut>(
    provider_name: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: provider_name.to_owned(),
                timeout: policy.timeout,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    provider = provider_name,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "{e}, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
