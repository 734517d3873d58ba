//! Conversation messages and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::context::ImageAttachment;
use super::usage::Usage;
use crate::error::GlimpseError;

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    /// `None` when a tool call occupies the whole turn.
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Message {
    fn new(role: Role, content: Option<String>, status: MessageStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            image: None,
            tool_calls: Vec::new(),
            tool_result: None,
            status,
            usage: None,
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Some(text.into()), MessageStatus::Complete)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Some(text.into()), MessageStatus::Complete)
    }

    /// Create a finished assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(text.into()), MessageStatus::Complete)
    }

    /// Create an assistant message that is about to receive streamed content.
    pub fn streaming_assistant() -> Self {
        Self::new(Role::Assistant, None, MessageStatus::Streaming)
    }

    /// Create an assistant message carrying a user-facing error diagnostic.
    pub fn assistant_error(diagnostic: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(diagnostic.into()), MessageStatus::Error)
    }

    /// Create a tool result message answering `result.tool_call_id`.
    pub fn tool(result: ToolResult) -> Self {
        let mut msg = Self::new(Role::Tool, Some(result.content.clone()), MessageStatus::Complete);
        msg.tool_result = Some(result);
        msg
    }

    /// Attach a screenshot to this message.
    pub fn with_image(mut self, image: Option<ImageAttachment>) -> Self {
        self.image = image;
        self
    }

    /// Text content, or the empty string when the turn has none.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Move the message to `next`, enforcing the one-way lifecycle.
    ///
    /// `sending → streaming → {complete, error}`; a terminal message never
    /// changes status again.
    pub fn transition(&mut self, next: MessageStatus) -> Result<(), GlimpseError> {
        use MessageStatus::*;
        let allowed = matches!(
            (self.status, next),
            (Sending, Streaming) | (Sending | Streaming, Complete | Error)
        );
        if !allowed {
            return Err(GlimpseError::InvalidState(format!(
                "message {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Copy of this message suitable for replaying as history: text only.
    pub fn without_image(&self) -> Self {
        let mut msg = self.clone();
        msg.image = None;
        msg
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Lifecycle state of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Streaming,
    Complete,
    Error,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of one tool call, as fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    /// Name of the tool that was called (Gemini keys results by name).
    pub tool_name: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}
