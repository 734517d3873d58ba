//! Uniform streaming events produced by every provider adapter.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::usage::Usage;
use crate::error::GlimpseError;

/// Stream of delta events for one provider turn.
pub type DeltaStream = BoxStream<'static, Result<DeltaEvent, GlimpseError>>;

/// One incremental event from a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaEvent {
    /// Visible text fragment.
    Text(String),
    /// Fragment of a tool call, keyed by its positional index.
    ToolCall(ToolCallFragment),
    /// Partial usage counters.
    Usage(Usage),
    /// Terminal event; nothing follows it.
    Finish(TurnResult),
}

impl DeltaEvent {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self::Text(fragment.into())
    }

    pub fn finish(finish_reason: FinishReason) -> Self {
        Self::Finish(TurnResult {
            finish_reason,
            usage: Usage::default(),
        })
    }
}

/// A piece of a tool call. Absent fields carry nothing for this delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// How a provider turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnResult {
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}
