//! Error types for glimpse.

pub mod unified;

pub use unified::{ErrorCategory, ErrorClass, ErrorDetails};

use thiserror::Error;

/// Primary error type for all glimpse operations.
#[derive(Error, Debug)]
pub enum GlimpseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<ErrorDetails>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<GlimpseError>,
    },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Turn too large: ~{estimated} tokens exceeds the {ceiling}-token budget")]
    TurnTooLarge { estimated: usize, ceiling: usize },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session '{0}' already has a turn in flight")]
    SessionBusy(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl GlimpseError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: None,
        }
    }

    /// Create an API error with provider-supplied details.
    pub fn api_with_details(status: u16, message: impl Into<String>, details: ErrorDetails) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: Some(details),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } | Self::RetryExhausted { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Stream(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::ModelNotFound(_) => ErrorCategory::Configuration,
            Self::Serialization(_) | Self::MalformedResponse(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 | 529 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::TurnTooLarge { .. } => ErrorCategory::Budget,
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorCategory::ToolExecution,
            Self::InvalidState(_) | Self::SessionBusy(_) | Self::SessionNotFound(_) => {
                ErrorCategory::State
            }
            Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is a throttling response that backoff may cure.
    ///
    /// Anthropic answers 529 `overloaded_error` when it sheds load.
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
            || matches!(self, Self::Api { status: 429 | 529, .. })
    }

    /// Provider-suggested wait before the next attempt, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// Position of this error in the turn-level error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RetryExhausted { .. } => ErrorClass::FatalAfterRetry,
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorClass::RecoverablePerCall,
            _ if self.is_throttling() => ErrorClass::FatalAfterRetry,
            _ => ErrorClass::FatalImmediate,
        }
    }

    /// Short diagnostic shown to the user as the content of an error message.
    pub fn diagnostic(&self) -> String {
        match self.category() {
            ErrorCategory::Authentication => {
                format!("Authentication failed. Check your API key. ({self})")
            }
            ErrorCategory::RateLimit => {
                format!("The provider is rate limiting requests. Try again shortly. ({self})")
            }
            ErrorCategory::Budget => {
                format!("Your message is too long for this model. ({self})")
            }
            _ => format!("Something went wrong: {self}"),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GlimpseError>;
