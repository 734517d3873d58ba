//! Interfaces to collaborators outside the engine.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::GlimpseError;
use crate::models::ProviderKey;
use crate::types::ImageAttachment;

/// A captured screen.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Opaque location of the full capture on disk.
    pub image_path: PathBuf,
    /// Encoded image ready to attach to a turn.
    pub preview: ImageAttachment,
}

/// Screenshot acquisition.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture_screen(&self) -> Result<Capture, GlimpseError>;
}

/// Quota decision for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDecision {
    pub allowed: bool,
    pub remaining: i64,
}

/// Usage/quota collaborator. Consulted by callers before submitting a turn;
/// the engine itself enforces nothing.
#[async_trait]
pub trait UsageGate: Send + Sync {
    async fn check(&self, conversation_id: &str) -> Result<UsageDecision, GlimpseError>;
}

/// Gate that always allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

#[async_trait]
impl UsageGate for Unmetered {
    async fn check(&self, _conversation_id: &str) -> Result<UsageDecision, GlimpseError> {
        Ok(UsageDecision {
            allowed: true,
            remaining: i64::MAX,
        })
    }
}

/// Resolves the secret used to authenticate with a provider.
pub trait CredentialResolver: Send + Sync {
    fn credential_for(&self, provider: ProviderKey) -> Result<String, GlimpseError>;
}

/// Screen capture backed by an existing image file.
#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScreenCapture for FileCapture {
    async fn capture_screen(&self) -> Result<Capture, GlimpseError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let mime_type = match self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/png",
        };
        Ok(Capture {
            image_path: self.path.clone(),
            preview: ImageAttachment::from_bytes(bytes, mime_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn file_capture_encodes_and_guesses_mime() {
        let mut file = tempfile::Builder::new().suffix(".JPG").tempfile().unwrap();
        file.write_all(b"\xff\xd8\xff").unwrap();

        let capture = FileCapture::new(file.path()).capture_screen().await.unwrap();
        assert_eq!(capture.preview.mime_type, "image/jpeg");
        assert_eq!(capture.preview.data, "/9j/");
        assert_eq!(capture.image_path, file.path());
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let result = FileCapture::new("/definitely/not/here.png").capture_screen().await;
        assert!(matches!(result, Err(GlimpseError::Io(_))));
    }

    #[tokio::test]
    async fn unmetered_always_allows() {
        assert!(Unmetered.check("any").await.unwrap().allowed);
    }
}
