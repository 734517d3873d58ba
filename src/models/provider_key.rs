//! Typed provider identifiers and alias handling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GlimpseError;

/// Canonical provider keys used across model parsing, config, and adapter wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKey {
    OpenAi,
    Anthropic,
    Google,
    Groq,
}

impl ProviderKey {
    pub const ALL: [ProviderKey; 4] = [Self::OpenAi, Self::Anthropic, Self::Google, Self::Groq];

    /// Canonical provider key string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Groq => "groq",
        }
    }

    /// Parse user-facing provider aliases into a typed provider key.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "google" | "gemini" => Some(Self::Google),
            "groq" => Some(Self::Groq),
            _ => None,
        }
    }

    /// Environment variables holding this provider's API key, in priority order.
    pub const fn api_key_env_vars(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            Self::Groq => &["GROQ_API_KEY"],
        }
    }

    /// Environment variable overriding this provider's base URL.
    pub const fn base_url_env_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_BASE_URL",
            Self::Anthropic => "ANTHROPIC_BASE_URL",
            Self::Google => "GOOGLE_BASE_URL",
            Self::Groq => "GROQ_BASE_URL",
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKey {
    type Err = GlimpseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| GlimpseError::ModelNotFound(format!("unknown provider '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderKey;

    #[test]
    fn parses_aliases() {
        assert_eq!(ProviderKey::parse("gemini"), Some(ProviderKey::Google));
        assert_eq!(ProviderKey::parse("Claude"), Some(ProviderKey::Anthropic));
        assert_eq!(ProviderKey::parse("mistral"), None);
    }

    #[test]
    fn google_checks_both_key_vars() {
        assert_eq!(
            ProviderKey::Google.api_key_env_vars(),
            &["GOOGLE_API_KEY", "GEMINI_API_KEY"]
        );
    }
}
