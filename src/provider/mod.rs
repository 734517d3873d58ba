//! Provider adapters and the uniform streaming contract they implement.

pub mod format;
pub mod guarded;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "google")]
pub mod google;

#[cfg(feature = "groq")]
pub mod groq;

pub use guarded::GuardedAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GlimpseError;
use crate::models::{ModelCapabilities, ModelConfig};
use crate::types::{ContextBundle, DeltaStream, Message, MessageStatus};

/// Everything an adapter needs to open one streamed provider turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub system_prompt: Option<String>,
    /// Prior turns, text only. Error-status messages are never sent.
    pub history: Vec<Message>,
    /// The user message for this submission.
    pub current: Message,
    /// Tool round material following `current`: the assistant's tool-call
    /// message and one result message per call.
    pub follow_up: Vec<Message>,
    /// Context attached to `current` only.
    pub context: ContextBundle,
    pub tools: Vec<ToolDefinition>,
}

impl TurnRequest {
    /// Plain single-message request with no history or tools.
    pub fn single(current: Message) -> Self {
        Self {
            system_prompt: None,
            history: Vec::new(),
            current,
            follow_up: Vec::new(),
            context: ContextBundle::default(),
            tools: Vec::new(),
        }
    }

    /// History messages that may be replayed to a provider.
    pub fn replayable_history(&self) -> impl Iterator<Item = &Message> {
        self.history
            .iter()
            .filter(|m| m.status != MessageStatus::Error)
    }
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Core trait implemented by every provider adapter.
///
/// An adapter translates a [`TurnRequest`] into the provider's wire format
/// and its response stream into uniform [`crate::types::DeltaEvent`]s. The
/// stream always ends with exactly one `Finish` event or an error.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name (e.g., "openai", "google").
    fn provider_name(&self) -> &str;
    /// The model ID this adapter instance serves.
    fn model_id(&self) -> &str;

    fn capabilities(&self) -> &ModelCapabilities;

    /// Open a streamed turn.
    async fn stream_turn(&self, request: &TurnRequest) -> Result<DeltaStream, GlimpseError>;
}

/// Create the adapter described by `config`.
pub fn create_adapter(config: &ModelConfig) -> Result<Box<dyn ProviderAdapter>, GlimpseError> {
    if config.credential.trim().is_empty() {
        return Err(GlimpseError::Authentication(format!(
            "Missing credential for provider '{}'",
            config.provider
        )));
    }

    match config.provider {
        #[cfg(feature = "openai")]
        crate::models::ProviderKey::OpenAi => Ok(Box::new(openai::OpenAiAdapter::new(config))),
        #[cfg(feature = "anthropic")]
        crate::models::ProviderKey::Anthropic => {
            Ok(Box::new(anthropic::AnthropicAdapter::new(config)))
        }
        #[cfg(feature = "google")]
        crate::models::ProviderKey::Google => Ok(Box::new(google::GoogleAdapter::new(config))),
        #[cfg(feature = "groq")]
        crate::models::ProviderKey::Groq => Ok(Box::new(groq::GroqAdapter::new(config))),
        #[allow(unreachable_patterns)]
        other => Err(GlimpseError::Configuration(format!(
            "Provider '{other}' is not enabled in this build"
        ))),
    }
}
