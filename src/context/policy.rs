//! Decides whether a pending screenshot rides along with a turn.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::error::{ErrorClass, GlimpseError};
use crate::provider::{ProviderAdapter, TurnRequest};
use crate::stream::{DeltaAccumulator, Step};
use crate::types::{ImageAttachment, Message};

/// How the first turn of a session treats a pending screenshot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScreenshotMode {
    /// Ask the model whether the image is needed.
    #[default]
    Probe,
    Always,
    Never,
}

/// Answers "is the attached image necessary to answer this query".
#[async_trait]
pub trait ScreenshotProbe: Send + Sync {
    async fn image_needed(
        &self,
        query: &str,
        adapter: &dyn ProviderAdapter,
    ) -> Result<bool, GlimpseError>;
}

const PROBE_SYSTEM_PROMPT: &str = "You decide whether a screenshot of the user's screen is \
     needed to answer their message. Reply with exactly YES or NO.";

/// Probe that asks the session's own model, text only.
#[derive(Debug, Clone)]
pub struct ModelProbe {
    timeout: Duration,
}

impl ModelProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ModelProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ScreenshotProbe for ModelProbe {
    async fn image_needed(
        &self,
        query: &str,
        adapter: &dyn ProviderAdapter,
    ) -> Result<bool, GlimpseError> {
        let mut request = TurnRequest::single(Message::user(format!(
            "User message: \"{query}\"\n\nIs a screenshot of the user's screen needed to answer it?"
        )));
        request.system_prompt = Some(PROBE_SYSTEM_PROMPT.to_string());

        tokio::time::timeout(self.timeout, ask(adapter, &request))
            .await
            .unwrap_or_else(|_| Err(GlimpseError::Timeout(self.timeout.as_millis() as u64)))
    }
}

async fn ask(adapter: &dyn ProviderAdapter, request: &TurnRequest) -> Result<bool, GlimpseError> {
    let mut stream = adapter.stream_turn(request).await?;
    let mut acc = DeltaAccumulator::new();
    while let Some(event) = stream.next().await {
        if let Step::Finished(output) = acc.push(event?)? {
            return Ok(is_affirmative(output.message.text()));
        }
    }
    acc.end_of_stream()?;
    Ok(false)
}

/// Whether a probe reply starts with "yes", ignoring case and punctuation.
pub fn is_affirmative(reply: &str) -> bool {
    static YES: OnceLock<Regex> = OnceLock::new();
    YES.get_or_init(|| Regex::new(r"(?i)^[\s\W]*yes\b").expect("affirmative regex must compile"))
        .is_match(reply)
}

/// Per-session screenshot policy.
#[derive(Clone)]
pub struct ContextPolicy {
    mode: ScreenshotMode,
    probe: Arc<dyn ScreenshotProbe>,
}

impl ContextPolicy {
    pub fn new(mode: ScreenshotMode, probe: Arc<dyn ScreenshotProbe>) -> Self {
        Self { mode, probe }
    }

    pub fn mode(&self) -> ScreenshotMode {
        self.mode
    }

    /// Decide what image, if any, is attached to this turn.
    ///
    /// Only the session's first turn is filtered by the mode; later turns
    /// attach whatever the caller supplied. A discarded image is gone: it is
    /// never carried to another turn.
    pub async fn resolve(
        &self,
        first_turn: bool,
        query: &str,
        pending: Option<ImageAttachment>,
        adapter: &dyn ProviderAdapter,
    ) -> Option<ImageAttachment> {
        let image = pending?;

        if !adapter.capabilities().supports_vision {
            warn!(
                model = adapter.model_id(),
                fingerprint = %image.fingerprint(),
                "model has no vision support; discarding screenshot"
            );
            return None;
        }

        if !first_turn {
            return Some(image);
        }

        let attach = match self.mode {
            ScreenshotMode::Always => true,
            ScreenshotMode::Never => false,
            // Nothing to ask about: the image is the whole request.
            ScreenshotMode::Probe if query.trim().is_empty() => true,
            ScreenshotMode::Probe => match self.probe.image_needed(query, adapter).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    debug!(
                        class = ?ErrorClass::Advisory,
                        error = %e,
                        "screenshot probe failed; not attaching"
                    );
                    false
                }
            },
        };

        debug!(
            mode = %self.mode,
            attach,
            fingerprint = %image.fingerprint(),
            "resolved first-turn screenshot"
        );
        attach.then_some(image)
    }
}

impl std::fmt::Debug for ContextPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPolicy")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelCapabilities;
    use crate::types::DeltaStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        verdict: Result<bool, ()>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(verdict: Result<bool, ()>) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ScreenshotProbe for Fixed {
        async fn image_needed(&self, _: &str, _: &dyn ProviderAdapter) -> Result<bool, GlimpseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
                .map_err(|_| GlimpseError::Timeout(10))
        }
    }

    struct NoNetwork {
        caps: ModelCapabilities,
    }

    #[async_trait]
    impl ProviderAdapter for NoNetwork {
        fn provider_name(&self) -> &str {
            "stub"
        }
        fn model_id(&self) -> &str {
            "stub-model"
        }
        fn capabilities(&self) -> &ModelCapabilities {
            &self.caps
        }
        async fn stream_turn(&self, _: &TurnRequest) -> Result<DeltaStream, GlimpseError> {
            Err(GlimpseError::Stream("offline".into()))
        }
    }

    fn vision() -> NoNetwork {
        NoNetwork { caps: ModelCapabilities::full(128_000) }
    }

    fn image() -> Option<ImageAttachment> {
        Some(ImageAttachment::from_base64("AAAA", "image/png"))
    }

    #[test]
    fn affirmative_parsing() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("  yes, the screenshot helps"));
        assert!(is_affirmative("**Yes**"));
        assert!(!is_affirmative("No."));
        assert!(!is_affirmative("yesterday"));
        assert!(!is_affirmative(""));
    }

    #[tokio::test]
    async fn probe_verdict_decides_first_turn() {
        let yes = ContextPolicy::new(ScreenshotMode::Probe, Fixed::new(Ok(true)));
        assert!(yes.resolve(true, "fix this bug", image(), &vision()).await.is_some());

        let no = ContextPolicy::new(ScreenshotMode::Probe, Fixed::new(Ok(false)));
        assert!(no.resolve(true, "fix this bug", image(), &vision()).await.is_none());
    }

    #[tokio::test]
    async fn probe_failure_defaults_to_no_image() {
        let policy = ContextPolicy::new(ScreenshotMode::Probe, Fixed::new(Err(())));
        assert!(policy.resolve(true, "what is this", image(), &vision()).await.is_none());
    }

    #[tokio::test]
    async fn later_turns_skip_the_probe() {
        let probe = Fixed::new(Ok(false));
        let policy = ContextPolicy::new(ScreenshotMode::Probe, probe.clone());
        assert!(policy.resolve(false, "and now?", image(), &vision()).await.is_some());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_pending_image_is_a_no_op() {
        let probe = Fixed::new(Ok(true));
        let policy = ContextPolicy::new(ScreenshotMode::Probe, probe.clone());
        assert!(policy.resolve(true, "hello", None, &vision()).await.is_none());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn modes_and_vision_support() {
        let always = ContextPolicy::new(ScreenshotMode::Always, Fixed::new(Ok(false)));
        assert!(always.resolve(true, "q", image(), &vision()).await.is_some());

        let never = ContextPolicy::new(ScreenshotMode::Never, Fixed::new(Ok(true)));
        assert!(never.resolve(true, "q", image(), &vision()).await.is_none());

        let blind = NoNetwork { caps: ModelCapabilities::default() };
        assert!(always.resolve(false, "q", image(), &blind).await.is_none());
    }

    #[tokio::test]
    async fn model_probe_failure_surfaces_as_error() {
        let result = ModelProbe::default().image_needed("q", &vision()).await;
        assert!(result.is_err());
    }
}
