//! Retry with exponential backoff on throttling responses.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GlimpseError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Upper bound on any single delay, including provider hints.
    #[serde(with = "millis")]
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Execute an async operation, retrying only throttling errors.
    ///
    /// Any other error is returned as-is on the attempt that produced it.
    /// When every attempt is throttled the last error is surfaced inside
    /// [`GlimpseError::RetryExhausted`].
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, GlimpseError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GlimpseError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_throttling() => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return Err(GlimpseError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.delay_for(backoff, err.retry_after_ms());
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after throttling"
            );
            tokio::time::sleep(delay).await;

            backoff = Duration::from_secs_f64(
                (backoff.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
            );
        }
    }

    /// Provider hints raise the delay but never past `max_backoff`.
    fn delay_for(&self, backoff: Duration, retry_after_ms: Option<u64>) -> Duration {
        let hinted = retry_after_ms.map(Duration::from_millis).unwrap_or_default();
        backoff.max(hinted).min(self.max_backoff)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
