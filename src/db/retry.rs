use std::future::Future;
use std::time::Duration;

use crate::config::RetrySettings;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Attempt once, then up to `max_retries` more times. Returns the first error
/// when every attempt fails.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let first_error = match operation().await {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if !first_error.is_retryable() {
        return Err(first_error);
    }

    for attempt in 1..=policy.max_retries {
        let delay = policy.delay_for(attempt);
        tracing::debug!(
            operation = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %first_error,
            "Retrying cache operation"
        );
        tokio::time::sleep(delay).await;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => continue,
            Err(_) => break,
        }
    }

    tracing::debug!(operation = label, error = %first_error, "Cache operation retries exhausted");
    Err(first_error)
}
