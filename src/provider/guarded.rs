//! Rate/retry wrapper around any provider adapter.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::GlimpseError;
use crate::models::ModelCapabilities;
use crate::types::DeltaStream;
use crate::util::rate_limit::RequestGate;
use crate::util::retry::RetryPolicy;

use super::{ProviderAdapter, TurnRequest};

/// Applies request spacing and throttling retry to an inner adapter.
///
/// Only opening the stream is retried; once deltas flow, a failure belongs
/// to the turn. Knows nothing about message content.
pub struct GuardedAdapter {
    inner: Box<dyn ProviderAdapter>,
    gate: RequestGate,
    retry: RetryPolicy,
}

impl GuardedAdapter {
    pub fn new(inner: Box<dyn ProviderAdapter>, min_interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            inner,
            gate: RequestGate::new(min_interval),
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

#[async_trait]
impl ProviderAdapter for GuardedAdapter {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn capabilities(&self) -> &ModelCapabilities {
        self.inner.capabilities()
    }

    async fn stream_turn(&self, request: &TurnRequest) -> Result<DeltaStream, GlimpseError> {
        self.retry
            .execute(|| async {
                self.gate.acquire().await;
                self.inner.stream_turn(request).await
            })
            .await
    }
}
