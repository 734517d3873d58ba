//! Conversation sessions: the turn engine and its owner.

pub mod manager;
pub mod turn;

pub use manager::SessionManager;
pub use turn::{TurnEvent, TurnInput, TurnSummary};

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::budget::{estimate_current_tokens, estimate_message_tokens, estimate_tool_tokens, TokenBudget};
use crate::config::EngineSettings;
use crate::context::{ContextPolicy, ModelProbe, ScreenshotProbe};
use crate::error::GlimpseError;
use crate::models::ModelConfig;
use crate::provider::{create_adapter, GuardedAdapter, ProviderAdapter, TurnRequest};
use crate::stream::{DeltaAccumulator, Step, TurnOutput};
use crate::tools::{Tool, ToolDispatcher, ToolRegistry};
use crate::types::{ContextBundle, Message, MessageStatus, ToolCall, Usage};

/// One conversation with exclusive ownership of its provider adapter.
///
/// `submit_turn` borrows the session mutably for the lifetime of the
/// returned stream, so at most one turn is ever in flight.
pub struct Session {
    id: String,
    adapter: GuardedAdapter,
    output_reservation: usize,
    settings: EngineSettings,
    policy: ContextPolicy,
    tools: ToolRegistry,
    history: Vec<Message>,
    first_turn_done: bool,
    submitted: bool,
}

impl Session {
    /// Session backed by the provider adapter described by `model`.
    pub fn new(
        id: impl Into<String>,
        model: &ModelConfig,
        settings: EngineSettings,
        tools: ToolRegistry,
    ) -> Result<Self, GlimpseError> {
        let adapter = create_adapter(model)?;
        Ok(Self::with_adapter(id, adapter, settings, tools)
            .with_output_reservation(model.output_reservation()))
    }

    /// Session over an already built adapter.
    pub fn with_adapter(
        id: impl Into<String>,
        adapter: Box<dyn ProviderAdapter>,
        settings: EngineSettings,
        tools: ToolRegistry,
    ) -> Self {
        let output_reservation = adapter.capabilities().max_output_tokens;
        let policy = ContextPolicy::new(
            settings.screenshot_mode,
            Arc::new(ModelProbe::new(settings.probe_timeout())),
        );
        Self {
            id: id.into(),
            adapter: guard(adapter, &settings),
            output_reservation,
            settings,
            policy,
            tools,
            history: Vec::new(),
            first_turn_done: false,
            submitted: false,
        }
    }

    /// Replace the screenshot probe.
    pub fn with_probe(mut self, probe: Arc<dyn ScreenshotProbe>) -> Self {
        self.policy = ContextPolicy::new(self.settings.screenshot_mode, probe);
        self
    }

    fn with_output_reservation(mut self, tokens: usize) -> Self {
        self.output_reservation = tokens;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.adapter.provider_name()
    }

    pub fn model_id(&self) -> &str {
        self.adapter.model_id()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Add a tool. Only allowed before the first turn is submitted.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), GlimpseError> {
        if self.submitted {
            return Err(GlimpseError::InvalidState(format!(
                "session '{}' already started; tools must be registered before the first turn",
                self.id
            )));
        }
        self.tools.register(tool)
    }

    /// Replace the adapter with a fresh one for `model`.
    ///
    /// Taking `&mut self` guarantees no turn is in flight on the old adapter.
    pub fn switch_model(&mut self, model: &ModelConfig) -> Result<(), GlimpseError> {
        let adapter = create_adapter(model)?;
        self.replace_adapter(adapter);
        self.output_reservation = model.output_reservation();
        Ok(())
    }

    /// Replace the adapter with an already built one.
    pub fn replace_adapter(&mut self, adapter: Box<dyn ProviderAdapter>) {
        info!(
            session = %self.id,
            from = %format!("{}:{}", self.adapter.provider_name(), self.adapter.model_id()),
            to = %format!("{}:{}", adapter.provider_name(), adapter.model_id()),
            "switching model"
        );
        self.output_reservation = adapter.capabilities().max_output_tokens;
        self.adapter = guard(adapter, &self.settings);
    }

    fn budget(&self) -> TokenBudget {
        let ceiling = self.settings.token_ceiling.unwrap_or_else(|| {
            self.adapter
                .capabilities()
                .default_token_ceiling(self.output_reservation)
        });
        TokenBudget::new(ceiling, self.settings.system_prompt.as_deref())
    }

    /// Submit a user turn and stream its events.
    ///
    /// The stream yields text fragments as they arrive and ends with exactly
    /// one [`TurnEvent::Done`]. History is updated only when that event is
    /// produced: dropping the stream earlier aborts the provider request and
    /// leaves the session untouched.
    pub fn submit_turn(&mut self, input: impl Into<TurnInput>) -> BoxStream<'_, TurnEvent> {
        let input = input.into();
        self.submitted = true;

        Box::pin(async_stream::stream! {
            let first_turn = !self.first_turn_done;
            let user_message = Message::user(input.text.clone());
            let image = self
                .policy
                .resolve(first_turn, &input.text, input.pending_image, &self.adapter)
                .await;
            if let Some(image) = &image {
                debug!(session = %self.id, fingerprint = %image.fingerprint(), "screenshot attached");
            }
            let context = ContextBundle {
                image,
                selection: input.selection,
                search_results: input.search_results,
            };

            let budget = self.budget();
            let tools = self.tools.definitions();
            let dispatcher = ToolDispatcher::new(self.tools.clone()).with_session(self.id.clone());
            let replayable: Vec<Message> = self
                .history
                .iter()
                .filter(|m| m.status != MessageStatus::Error)
                .map(Message::without_image)
                .collect();

            let mut follow_up: Vec<Message> = Vec::new();
            let mut usage = Usage::default();
            let mut rounds: u32 = 0;

            let outcome: Result<(Message, Vec<ToolCall>), GlimpseError> = loop {
                rounds += 1;

                let reserved = estimate_current_tokens(&user_message, &context)
                    + follow_up.iter().map(estimate_message_tokens).sum::<usize>()
                    + estimate_tool_tokens(&tools);
                let fitted = match budget.fit(&replayable, reserved) {
                    Ok(fitted) => fitted,
                    Err(e) => break Err(e),
                };
                let request = TurnRequest {
                    system_prompt: self.settings.system_prompt.clone(),
                    history: fitted.history,
                    current: user_message.clone(),
                    follow_up: follow_up.clone(),
                    context: context.clone(),
                    tools: tools.clone(),
                };

                let mut upstream = match self.adapter.stream_turn(&request).await {
                    Ok(stream) => stream,
                    Err(e) => break Err(e),
                };

                let mut acc = DeltaAccumulator::new();
                let mut finished: Option<TurnOutput> = None;
                let mut failure: Option<GlimpseError> = None;
                while let Some(event) = upstream.next().await {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            acc.abort();
                            failure = Some(e);
                            break;
                        }
                    };
                    match acc.push(event) {
                        Ok(Step::Text(fragment)) => yield TurnEvent::Text(fragment),
                        Ok(Step::Pending) => {}
                        Ok(Step::Finished(output)) => finished = Some(output),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                drop(upstream);

                if let Some(e) = failure {
                    usage.merge(&acc.usage());
                    break Err(e);
                }
                let output = match finished {
                    Some(output) => output,
                    None => match acc.end_of_stream() {
                        Err(e) => break Err(e),
                        Ok(()) => break Err(GlimpseError::InvalidState("turn finished without output".into())),
                    },
                };
                usage.merge(&output.usage);

                if !output.requires_tool_round {
                    break Ok((output.message, Vec::new()));
                }

                if rounds > self.settings.max_tool_rounds {
                    let mut message = output.message;
                    let pending = std::mem::take(&mut message.tool_calls);
                    if message.content.is_none() {
                        message.content = Some(String::new());
                    }
                    warn!(
                        session = %self.id,
                        calls = pending.len(),
                        "tool calls requested after the last automatic continuation; not executing"
                    );
                    break Ok((message, pending));
                }

                let results = dispatcher.dispatch(&output.calls).await;
                follow_up.push(output.message);
                follow_up.extend(results);
            };

            self.history.push(user_message.with_image(context.image));
            self.history.append(&mut follow_up);
            self.first_turn_done = true;

            let summary = match outcome {
                Ok((mut message, pending_tool_calls)) => {
                    message.usage = Some(usage);
                    self.history.push(message.clone());
                    info!(
                        session = %self.id,
                        provider = self.adapter.provider_name(),
                        model = self.adapter.model_id(),
                        rounds,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "turn complete"
                    );
                    TurnSummary {
                        status: MessageStatus::Complete,
                        message,
                        usage,
                        rounds,
                        pending_tool_calls,
                    }
                }
                Err(e) => {
                    warn!(
                        session = %self.id,
                        error = %e,
                        class = ?e.class(),
                        category = ?e.category(),
                        "turn failed"
                    );
                    let mut message = Message::assistant_error(e.diagnostic());
                    message.usage = Some(usage);
                    self.history.push(message.clone());
                    TurnSummary {
                        status: MessageStatus::Error,
                        message,
                        usage,
                        rounds,
                        pending_tool_calls: Vec::new(),
                    }
                }
            };

            yield TurnEvent::Done(summary);
        })
    }
}

fn guard(adapter: Box<dyn ProviderAdapter>, settings: &EngineSettings) -> GuardedAdapter {
    GuardedAdapter::new(adapter, settings.min_request_interval(), settings.retry.clone())
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("provider", &self.adapter.provider_name())
            .field("model", &self.adapter.model_id())
            .field("messages", &self.history.len())
            .field("tools", &self.tools)
            .finish()
    }
}
