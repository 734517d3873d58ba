//! Groq adapter (OpenAI-compatible).

use async_trait::async_trait;

use crate::error::GlimpseError;
use crate::models::{ModelCapabilities, ModelConfig};
use crate::types::DeltaStream;

use super::openai::OpenAiAdapter;
use super::{ProviderAdapter, TurnRequest};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub struct GroqAdapter {
    inner: OpenAiAdapter,
}

impl GroqAdapter {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            inner: OpenAiAdapter::for_endpoint(config, "groq", DEFAULT_BASE_URL)
                .without_stream_options(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GroqAdapter {
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
        self.inner.stream_turn(request).await
    }
}
