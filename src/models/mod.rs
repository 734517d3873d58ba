//! Model identifiers, per-adapter configuration, and selection.

pub mod capabilities;
pub mod provider_key;

pub use capabilities::ModelCapabilities;
pub use provider_key::ProviderKey;

use std::fmt;

use bon::Builder;

use crate::error::GlimpseError;

/// Everything needed to build one provider adapter.
///
/// Immutable once built; switching models builds a new config and a new
/// adapter.
#[derive(Clone, Builder)]
pub struct ModelConfig {
    pub provider: ProviderKey,
    #[builder(into)]
    pub model_id: String,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    #[builder(into)]
    pub credential: String,
    /// Override for the provider endpoint (OpenAI-compatible servers, tests).
    #[builder(into)]
    pub base_url: Option<String>,
}

impl ModelConfig {
    pub fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::lookup(self.provider, &self.model_id)
    }

    /// Output tokens requested from the provider.
    pub fn output_reservation(&self) -> usize {
        self.max_output_tokens
            .map(|v| v as usize)
            .unwrap_or_else(|| self.capabilities().max_output_tokens)
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("credential", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Parse "provider:model_id" selectors.
pub struct ModelSelector;

impl ModelSelector {
    /// Examples: "openai:gpt-4o", "anthropic:claude-sonnet-4-5", "gemini:gemini-2.5-flash"
    pub fn parse(s: &str) -> Result<(ProviderKey, String), GlimpseError> {
        let (provider, model_id) = s.split_once(':').ok_or_else(|| {
            GlimpseError::InvalidArgument(format!(
                "Invalid model selector '{s}': expected 'provider:model_id'"
            ))
        })?;
        if model_id.trim().is_empty() {
            return Err(GlimpseError::InvalidArgument(format!(
                "Invalid model selector '{s}': empty model id"
            )));
        }
        let provider: ProviderKey = provider.parse()?;
        Ok((provider, model_id.trim().to_string()))
    }
}
