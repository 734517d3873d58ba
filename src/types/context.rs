//! Per-turn context material: screenshots, selections, search snippets.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A captured screen image, base64 encoded.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageAttachment {
    pub data: String,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
}

impl ImageAttachment {
    pub fn from_base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            captured_at: Utc::now(),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::from_base64(
            base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type,
        )
    }

    /// `data:` URL form used by OpenAI-style multimodal parts.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Short SHA-256 digest of the payload, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.data.as_bytes());
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("mime_type", &self.mime_type)
            .field("bytes_b64", &self.data.len())
            .field("fingerprint", &self.fingerprint())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// A web search result snippet offered as context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSnippet {
    pub title: String,
    pub content: String,
    pub url: String,
    pub relevance: f32,
}

/// Non-text material attached to a single turn.
///
/// Lives only as long as the turn that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBundle {
    pub image: Option<ImageAttachment>,
    pub selection: Option<String>,
    pub search_results: Vec<SearchSnippet>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.selection.is_none() && self.search_results.is_empty()
    }
}
