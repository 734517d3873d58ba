//! Shared test helpers: a scripted adapter and a fixed probe.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use glimpse::context::ScreenshotProbe;
use glimpse::error::GlimpseError;
use glimpse::models::ModelCapabilities;
use glimpse::provider::{ProviderAdapter, TurnRequest};
use glimpse::tools::{FnTool, ToolArguments, ToolParameters};
use glimpse::types::*;

/// One scripted provider round.
pub enum Script {
    /// Events streamed in order once the stream is opened.
    Events(Vec<Result<DeltaEvent, GlimpseError>>),
    /// Opening the stream fails.
    Fail(GlimpseError),
    /// Stream that yields the events and then never ends.
    Hang(Vec<DeltaEvent>),
}

/// Adapter that replays queued scripts and records every request.
#[derive(Clone)]
pub struct ScriptedAdapter {
    model_id: String,
    capabilities: ModelCapabilities,
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<TurnRequest>>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            model_id: "scripted-1".into(),
            capabilities: ModelCapabilities::full(128_000),
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn without_vision(mut self) -> Self {
        self.capabilities.supports_vision = false;
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.capabilities.context_length = context_length;
        self
    }

    pub fn push(&self, script: Script) -> &Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    /// Queue a plain text reply split into `fragments`.
    pub fn reply(&self, fragments: &[&str]) -> &Self {
        let mut events: Vec<Result<DeltaEvent, GlimpseError>> =
            fragments.iter().map(|f| Ok(DeltaEvent::text(*f))).collect();
        events.push(Ok(DeltaEvent::Usage(Usage::new(10, 5))));
        events.push(Ok(DeltaEvent::finish(FinishReason::Stop)));
        self.push(Script::Events(events))
    }

    /// Queue a round that requests one tool call, with arguments split in two.
    pub fn tool_call(&self, name: &str, arguments: &str) -> &Self {
        let (head, tail) = arguments.split_at(arguments.len() / 2);
        self.push(Script::Events(vec![
            Ok(DeltaEvent::ToolCall(ToolCallFragment::new(0).name(name).arguments(head))),
            Ok(DeltaEvent::ToolCall(ToolCallFragment::new(0).arguments(tail))),
            Ok(DeltaEvent::Usage(Usage::new(8, 3))),
            Ok(DeltaEvent::finish(FinishReason::ToolCalls)),
        ]))
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    pub fn boxed(&self) -> Box<dyn ProviderAdapter> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn stream_turn(&self, request: &TurnRequest) -> Result<DeltaStream, GlimpseError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Fail(GlimpseError::Stream("no script queued".into())));

        match script {
            Script::Events(events) => Ok(futures::stream::iter(events).boxed()),
            Script::Fail(err) => Err(err),
            Script::Hang(events) => Ok(futures::stream::iter(events.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
        }
    }
}

/// Probe that answers with a fixed verdict and counts calls.
#[derive(Clone, Default)]
pub struct FixedProbe {
    verdict: Option<bool>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FixedProbe {
    pub fn yes() -> Self {
        Self { verdict: Some(true), ..Default::default() }
    }

    pub fn no() -> Self {
        Self { verdict: Some(false), ..Default::default() }
    }

    /// Probe whose every call fails.
    pub fn broken() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScreenshotProbe for FixedProbe {
    async fn image_needed(
        &self,
        query: &str,
        _adapter: &dyn ProviderAdapter,
    ) -> Result<bool, GlimpseError> {
        self.calls.lock().unwrap().push(query.to_string());
        self.verdict
            .ok_or_else(|| GlimpseError::Timeout(10_000))
    }
}

/// `calc` tool that sums a `+`-separated expression of integers.
pub fn calc_tool() -> FnTool {
    FnTool::new(
        "calc",
        "Evaluate an addition such as 2+2",
        ToolParameters::object()
            .string("expr", "Expression to evaluate", true)
            .build(),
        |args, _ctx| async move { evaluate(&args) },
    )
}

fn evaluate(args: &ToolArguments) -> Result<serde_json::Value, GlimpseError> {
    let expr = args.get_str("expr")?;
    let mut total = 0i64;
    for term in expr.split('+') {
        total += term.trim().parse::<i64>().map_err(|e| GlimpseError::ToolExecution {
            tool_name: "calc".into(),
            message: format!("bad term '{term}': {e}"),
        })?;
    }
    Ok(serde_json::Value::from(total.to_string()))
}

pub fn screenshot() -> ImageAttachment {
    ImageAttachment::from_bytes(b"\x89PNG fake".to_vec(), "image/png")
}

/// Collect every event of a turn.
pub async fn collect<S>(stream: S) -> (Vec<String>, Option<glimpse::session::TurnSummary>)
where
    S: futures::Stream<Item = glimpse::session::TurnEvent>,
{
    let events: Vec<_> = stream.collect().await;
    let mut text = Vec::new();
    let mut summary = None;
    for event in events {
        match event {
            glimpse::session::TurnEvent::Text(t) => text.push(t),
            glimpse::session::TurnEvent::Done(s) => summary = Some(s),
        }
    }
    (text, summary)
}
