//! Provider-independent formatting of the current user turn.

use serde_json::Value;

use crate::types::{ContextBundle, Message};

/// Instruction used when a screenshot is attached without any query text.
pub const SCREEN_ONLY_INSTRUCTION: &str = "Analyze what's on my screen and proactively help with \
     whatever I appear to be working on.";

/// Frame the user's literal query relative to an attached screenshot.
pub fn frame_image_query(query: &str) -> String {
    let query = query.trim();
    if query.is_empty() {
        SCREEN_ONLY_INSTRUCTION.to_string()
    } else {
        format!(
            "The attached image is a screenshot of my screen. Use it as context to answer: {query}"
        )
    }
}

/// Full text of the current user turn, including any context material.
///
/// Budgeting uses the same text as the adapters so estimates match the wire.
pub fn compose_current_text(current: &Message, context: &ContextBundle) -> String {
    let mut text = if context.image.is_some() {
        frame_image_query(current.text())
    } else {
        current.text().to_string()
    };

    if let Some(selection) = context.selection.as_deref().filter(|s| !s.trim().is_empty()) {
        text.push_str("\n\nSelected text:\n");
        text.push_str(selection);
    }

    if !context.search_results.is_empty() {
        text.push_str("\n\nSearch results:");
        for (i, snippet) in context.search_results.iter().enumerate() {
            text.push_str(&format!(
                "\n[{}] {} ({})\n{}",
                i + 1,
                snippet.title,
                snippet.url,
                snippet.content
            ));
        }
    }

    text
}

/// Convert a tool result JSON value into a string payload for providers.
pub fn tool_result_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
