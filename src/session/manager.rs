//! Session manager: owns sessions by id and serializes their turns.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::config::GlimpseConfig;
use crate::error::GlimpseError;
use crate::models::{ModelConfig, ProviderKey};
use crate::tools::{Tool, ToolRegistry};

use super::{Session, TurnEvent, TurnInput};

type SharedSession = Arc<Mutex<Session>>;

/// Creates sessions from a [`GlimpseConfig`] and routes turns to them.
///
/// Every session sits behind its own async mutex. Turns on different
/// sessions run concurrently; a second turn on a busy session is rejected
/// instead of queued.
pub struct SessionManager {
    config: GlimpseConfig,
    tools: ToolRegistry,
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl SessionManager {
    pub fn new(config: GlimpseConfig) -> Self {
        Self {
            config,
            tools: ToolRegistry::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GlimpseConfig {
        &self.config
    }

    /// Add a tool to the registry handed to sessions created afterwards.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), GlimpseError> {
        self.tools.register(tool)
    }

    /// Create a session on `provider`/`model_id` with a generated id.
    pub fn create_session(
        &self,
        provider: ProviderKey,
        model_id: &str,
    ) -> Result<String, GlimpseError> {
        let model = self.config.model_config(provider, model_id)?;
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), &model, self.config.engine(), self.tools.clone())?;
        self.insert(session);
        Ok(id)
    }

    /// Adopt an already built session, replacing any with the same id.
    pub fn insert(&self, session: Session) {
        let id = session.id().to_string();
        tracing::debug!(session = %id, model = session.model_id(), "session registered");
        self.write_sessions()
            .insert(id, Arc::new(Mutex::new(session)));
    }

    pub fn get(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<SharedSession> {
        self.write_sessions().remove(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Start a turn on `session_id`.
    ///
    /// Fails with [`GlimpseError::SessionBusy`] while another turn on the same
    /// session is still streaming. The returned stream holds the session lock
    /// until it ends or is dropped.
    pub fn submit_turn(
        &self,
        session_id: &str,
        input: impl Into<TurnInput>,
    ) -> Result<BoxStream<'static, TurnEvent>, GlimpseError> {
        let session = self.lookup(session_id)?;
        let mut guard = session
            .try_lock_owned()
            .map_err(|_| GlimpseError::SessionBusy(session_id.to_string()))?;
        let input = input.into();

        Ok(Box::pin(async_stream::stream! {
            let mut events = guard.submit_turn(input);
            while let Some(event) = events.next().await {
                yield event;
            }
        }))
    }

    /// Move `session_id` to another model, waiting for any in-flight turn to
    /// finish first. `credential` defaults to the configured key.
    pub async fn switch_model(
        &self,
        session_id: &str,
        provider: ProviderKey,
        model_id: &str,
        credential: Option<String>,
    ) -> Result<(), GlimpseError> {
        let model = match credential {
            Some(credential) => ModelConfig::builder()
                .provider(provider)
                .model_id(model_id)
                .credential(credential)
                .maybe_base_url(self.config.get_base_url(provider))
                .build(),
            None => self.config.model_config(provider, model_id)?,
        };
        let session = self.lookup(session_id)?;
        let mut session = session.lock().await;
        session.switch_model(&model)
    }

    fn lookup(&self, session_id: &str) -> Result<SharedSession, GlimpseError> {
        self.get(session_id)
            .ok_or_else(|| GlimpseError::SessionNotFound(session_id.to_string()))
    }

    fn write_sessions(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SharedSession>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.session_ids())
            .field("tools", &self.tools)
            .finish()
    }
}
