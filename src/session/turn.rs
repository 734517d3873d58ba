//! Inputs and events of one submitted turn.

use crate::types::{ImageAttachment, Message, MessageStatus, SearchSnippet, ToolCall, Usage};

/// What the caller submits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnInput {
    pub text: String,
    /// Screenshot offered for this turn; the context policy decides whether
    /// it is sent.
    pub pending_image: Option<ImageAttachment>,
    pub selection: Option<String>,
    pub search_results: Vec<SearchSnippet>,
}

impl TurnInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.pending_image = Some(image);
        self
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    pub fn with_search_results(mut self, results: Vec<SearchSnippet>) -> Self {
        self.search_results = results;
        self
    }
}

impl From<&str> for TurnInput {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for TurnInput {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// One item of a turn's event stream.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Visible text, in provider order.
    Text(String),
    /// Terminal event; always the last item.
    Done(TurnSummary),
}

/// How a turn ended.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    /// `Complete` or `Error`.
    pub status: MessageStatus,
    /// Final assistant message as committed to history. For errors its
    /// content is the diagnostic.
    pub message: Message,
    /// Usage summed over every provider round of the turn.
    pub usage: Usage,
    /// Provider rounds issued (1 plus automatic continuations).
    pub rounds: u32,
    /// Tool calls requested in the last permitted round, not executed.
    pub pending_tool_calls: Vec<ToolCall>,
}

impl TurnSummary {
    pub fn is_complete(&self) -> bool {
        self.status == MessageStatus::Complete
    }
}
