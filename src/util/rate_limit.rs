//! Minimum-spacing gate between consecutive requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Last-request-timestamp gate.
///
/// Callers arriving before `min_interval` has elapsed since the previous
/// request are delayed, never rejected. The lock is held across the sleep so
/// waiters are released one interval apart in arrival order.
#[derive(Debug)]
pub struct RequestGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be sent, then record it as sent.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "spacing request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
