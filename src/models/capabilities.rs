//! Model capabilities descriptor.

use serde::{Deserialize, Serialize};

use super::ProviderKey;

/// Describes what a model can do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCapabilities {
    pub supports_vision: bool,
    pub supports_tools: bool,
    pub context_length: usize,
    pub max_output_tokens: usize,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_vision: false,
            supports_tools: false,
            context_length: 8_192,
            max_output_tokens: 4_096,
        }
    }
}

impl ModelCapabilities {
    /// Full-featured model capabilities.
    pub fn full(context_length: usize) -> Self {
        Self {
            supports_vision: true,
            supports_tools: true,
            context_length,
            max_output_tokens: 8_192,
        }
    }

    /// Best-known capabilities for a provider/model pair.
    ///
    /// Unknown ids fall back to the provider's mainstream family.
    pub fn lookup(provider: ProviderKey, model_id: &str) -> Self {
        let id = model_id.to_ascii_lowercase();
        match provider {
            ProviderKey::OpenAi => {
                if id.starts_with("gpt-4.1") || id.starts_with("gpt-5") {
                    Self::sized(1_000_000, 32_768, true)
                } else if id.starts_with("o3") || id.starts_with("o4") || id.starts_with("o1") {
                    Self::sized(200_000, 100_000, true)
                } else if id.starts_with("gpt-3.5") {
                    Self::sized(16_385, 4_096, false)
                } else {
                    Self::sized(128_000, 16_384, true)
                }
            }
            ProviderKey::Anthropic => {
                if id.contains("haiku") && id.contains("3-") {
                    Self::sized(200_000, 4_096, true)
                } else {
                    Self::sized(200_000, 8_192, true)
                }
            }
            ProviderKey::Google => Self::sized(1_048_576, 8_192, true),
            ProviderKey::Groq => {
                let vision = id.contains("vision") || id.contains("llama-4");
                Self::sized(131_072, 8_192, vision)
            }
        }
    }

    fn sized(context_length: usize, max_output_tokens: usize, supports_vision: bool) -> Self {
        Self {
            supports_vision,
            supports_tools: true,
            context_length,
            max_output_tokens,
        }
    }

    /// History budget that leaves room for `reserve_output` response tokens
    /// plus a 5% safety margin.
    pub fn default_token_ceiling(&self, reserve_output: usize) -> usize {
        let headroom = self.context_length / 20;
        self.context_length
            .saturating_sub(reserve_output)
            .saturating_sub(headroom)
    }
}
