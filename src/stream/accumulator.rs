//! Per-turn delta accumulation: visible text plus tool-call reassembly.

use std::collections::BTreeMap;

use serde_json::Value;
use strum::Display;
use tracing::{debug, warn};

use crate::error::GlimpseError;
use crate::types::{
    DeltaEvent, FinishReason, Message, MessageStatus, ToolCall, ToolCallFragment, TurnResult, Usage,
};

/// Lifecycle of one provider turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AccumulatorState {
    Idle,
    Accumulating,
    Finalizing,
    Done,
    Failed,
}

/// What the caller should do after feeding one event.
#[derive(Debug)]
pub enum Step {
    /// Forward this fragment to the caller now.
    Text(String),
    /// Nothing visible yet.
    Pending,
    /// The turn is finished.
    Finished(TurnOutput),
}

/// A finalized tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledCall {
    pub call: ToolCall,
    /// Set when the arguments buffer was not one JSON document. Such a call
    /// is never executed; the error becomes its result.
    pub parse_error: Option<String>,
}

/// Result of a finished turn.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    /// Assistant message in `complete` state, carrying any tool calls.
    pub message: Message,
    pub calls: Vec<AssembledCall>,
    pub requires_tool_round: bool,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Default)]
struct CallRecord {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl CallRecord {
    fn append(&mut self, fragment: ToolCallFragment) {
        if let Some(id) = fragment.id {
            self.id.get_or_insert_with(String::new).push_str(&id);
        }
        if let Some(name) = fragment.name {
            self.name.get_or_insert_with(String::new).push_str(&name);
        }
        if let Some(args) = fragment.arguments {
            self.arguments.push_str(&args);
        }
    }
}

/// Turns a sequence of [`DeltaEvent`]s into a finished assistant turn.
///
/// Text is handed back for forwarding as soon as it arrives; tool-call
/// fragments are buffered by index until the provider reports completion.
#[derive(Debug)]
pub struct DeltaAccumulator {
    state: AccumulatorState,
    text: String,
    records: BTreeMap<usize, CallRecord>,
    usage: Usage,
}

impl Default for DeltaAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self {
            state: AccumulatorState::Idle,
            text: String::new(),
            records: BTreeMap::new(),
            usage: Usage::default(),
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Visible text received so far.
    /// Usage reported so far, including rounds that never finish.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Feed one event.
    pub fn push(&mut self, event: DeltaEvent) -> Result<Step, GlimpseError> {
        match self.state {
            AccumulatorState::Idle => self.state = AccumulatorState::Accumulating,
            AccumulatorState::Accumulating => {}
            AccumulatorState::Finalizing | AccumulatorState::Done | AccumulatorState::Failed => {
                return Err(self.fail("event received after the turn finished"));
            }
        }

        match event {
            DeltaEvent::Text(fragment) if fragment.is_empty() => Ok(Step::Pending),
            DeltaEvent::Text(fragment) => {
                self.text.push_str(&fragment);
                Ok(Step::Text(fragment))
            }
            DeltaEvent::ToolCall(fragment) => {
                self.records
                    .entry(fragment.index)
                    .or_default()
                    .append(fragment);
                Ok(Step::Pending)
            }
            DeltaEvent::Usage(update) => {
                self.usage.absorb(&update);
                Ok(Step::Pending)
            }
            DeltaEvent::Finish(result) => self.finalize(result).map(Step::Finished),
        }
    }

    /// Signal that the upstream stream closed.
    ///
    /// Fails unless a finish event has already completed the turn.
    pub fn end_of_stream(&mut self) -> Result<(), GlimpseError> {
        if self.state == AccumulatorState::Done {
            Ok(())
        } else {
            Err(self.fail("stream ended before the provider reported completion"))
        }
    }

    /// Mark the turn failed after an upstream error.
    pub fn abort(&mut self) {
        self.state = AccumulatorState::Failed;
    }

    fn fail(&mut self, reason: &str) -> GlimpseError {
        self.state = AccumulatorState::Failed;
        GlimpseError::MalformedResponse(reason.to_string())
    }

    fn finalize(&mut self, result: TurnResult) -> Result<TurnOutput, GlimpseError> {
        self.state = AccumulatorState::Finalizing;
        self.usage.absorb(&result.usage);

        let records = std::mem::take(&mut self.records);
        let calls = match result.finish_reason {
            FinishReason::Error => {
                self.state = AccumulatorState::Failed;
                return Err(GlimpseError::Stream(
                    "provider ended the turn with an error".into(),
                ));
            }
            FinishReason::ToolCalls => {
                let mut calls = Vec::with_capacity(records.len());
                for (index, record) in records {
                    match assemble(index, record) {
                        Ok(call) => calls.push(call),
                        Err(e) => {
                            self.state = AccumulatorState::Failed;
                            return Err(e);
                        }
                    }
                }
                if calls.is_empty() {
                    warn!("provider reported tool_calls without any tool call; finishing as stop");
                }
                calls
            }
            reason => {
                if !records.is_empty() {
                    warn!(
                        %reason,
                        dropped = records.len(),
                        "discarding tool call fragments on a non-tool finish"
                    );
                }
                Vec::new()
            }
        };

        let mut message = Message::streaming_assistant();
        message.content = if self.text.is_empty() && !calls.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.text))
        };
        message.tool_calls = calls.iter().map(|c| c.call.clone()).collect();
        message.usage = Some(self.usage);
        message.transition(MessageStatus::Complete)?;

        self.state = AccumulatorState::Done;
        debug!(
            finish_reason = %result.finish_reason,
            tool_calls = calls.len(),
            "turn finalized"
        );

        Ok(TurnOutput {
            message,
            requires_tool_round: !calls.is_empty(),
            calls,
            finish_reason: result.finish_reason,
            usage: self.usage,
        })
    }
}

fn assemble(index: usize, record: CallRecord) -> Result<AssembledCall, GlimpseError> {
    let name = record
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            GlimpseError::MalformedResponse(format!("tool call at index {index} has no name"))
        })?;
    let id = record.id.filter(|id| !id.is_empty()).unwrap_or_else(|| {
        let id = format!("call_{}", uuid::Uuid::new_v4().simple());
        debug!(index, %id, "tool call arrived without an id");
        id
    });

    let raw = record.arguments.trim();
    let (arguments, parse_error) = if raw.is_empty() {
        (Value::Object(Default::default()), None)
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => (value, None),
            Err(e) => (
                Value::Object(Default::default()),
                Some(format!("Error: arguments for '{name}' are not valid JSON: {e}")),
            ),
        }
    };

    Ok(AssembledCall {
        call: ToolCall {
            id,
            name,
            arguments,
        },
        parse_error,
    })
}
