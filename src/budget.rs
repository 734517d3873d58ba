//! Token budget: estimate costs and truncate history to a ceiling.

use std::collections::HashSet;

use tracing::debug;

use crate::error::GlimpseError;
use crate::provider::format::compose_current_text;
use crate::provider::ToolDefinition;
use crate::types::{ContextBundle, Message, Role};

/// Fixed cost charged to every message for role and framing tokens.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Flat cost charged for an attached screenshot.
pub const IMAGE_TOKEN_ESTIMATE: usize = 765;

/// Deterministic estimate: about four characters per token.
pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = MESSAGE_OVERHEAD_TOKENS + estimate_text_tokens(message.text());
    for call in &message.tool_calls {
        tokens += estimate_text_tokens(&call.name)
            + estimate_text_tokens(&call.arguments.to_string())
            + 8;
    }
    if let Some(result) = &message.tool_result {
        tokens += estimate_text_tokens(&result.tool_call_id) + 8;
    }
    if message.image.is_some() {
        tokens += IMAGE_TOKEN_ESTIMATE;
    }
    tokens
}

/// Cost of the current user turn exactly as adapters will send it.
pub fn estimate_current_tokens(current: &Message, context: &ContextBundle) -> usize {
    let mut tokens =
        MESSAGE_OVERHEAD_TOKENS + estimate_text_tokens(&compose_current_text(current, context));
    if context.image.is_some() {
        tokens += IMAGE_TOKEN_ESTIMATE;
    }
    tokens
}

pub fn estimate_tool_tokens(tools: &[ToolDefinition]) -> usize {
    tools
        .iter()
        .map(|t| {
            estimate_text_tokens(&t.name)
                + estimate_text_tokens(&t.description)
                + estimate_text_tokens(&t.parameters.to_string())
        })
        .sum()
}

/// History that fits the budget.
#[derive(Debug, Clone)]
pub struct Fitted {
    pub history: Vec<Message>,
    /// Estimated total of system prompt, retained history and reserved cost.
    pub estimated_tokens: usize,
    pub dropped: usize,
}

/// Fixed system-prompt cost plus a ceiling on the whole request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBudget {
    ceiling: usize,
    system_prompt_tokens: usize,
}

impl TokenBudget {
    pub fn new(ceiling: usize, system_prompt: Option<&str>) -> Self {
        let system_prompt_tokens = system_prompt
            .map(|p| MESSAGE_OVERHEAD_TOKENS + estimate_text_tokens(p))
            .unwrap_or(0);
        Self {
            ceiling,
            system_prompt_tokens,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn system_prompt_tokens(&self) -> usize {
        self.system_prompt_tokens
    }

    /// Keep the newest history that fits alongside `reserved` tokens.
    ///
    /// System-role messages are always kept. Walking newest to oldest, the
    /// first message that would overflow is dropped along with everything
    /// older. Tool results whose originating call was dropped go too.
    pub fn fit(&self, history: &[Message], reserved: usize) -> Result<Fitted, GlimpseError> {
        let pinned: usize = history
            .iter()
            .filter(|m| m.role == Role::System)
            .map(estimate_message_tokens)
            .sum();
        let fixed = self.system_prompt_tokens + reserved + pinned;
        if fixed > self.ceiling {
            return Err(GlimpseError::TurnTooLarge {
                estimated: fixed,
                ceiling: self.ceiling,
            });
        }

        let mut used = fixed;
        let mut cutoff = 0;
        for (i, message) in history.iter().enumerate().rev() {
            if message.role == Role::System {
                continue;
            }
            let cost = estimate_message_tokens(message);
            if used + cost > self.ceiling {
                cutoff = i + 1;
                break;
            }
            used += cost;
        }

        let mut kept: Vec<Message> = history
            .iter()
            .enumerate()
            .filter(|(i, m)| *i >= cutoff || m.role == Role::System)
            .map(|(_, m)| m.clone())
            .collect();

        let live_calls: HashSet<String> = kept
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
            .collect();
        kept.retain(|m| match (&m.role, &m.tool_result) {
            (Role::Tool, Some(result)) => live_calls.contains(&result.tool_call_id),
            (Role::Tool, None) => false,
            _ => true,
        });

        let estimated_tokens = fixed
            + kept
                .iter()
                .filter(|m| m.role != Role::System)
                .map(estimate_message_tokens)
                .sum::<usize>();
        let dropped = history.len() - kept.len();
        if dropped > 0 {
            debug!(dropped, estimated_tokens, ceiling = self.ceiling, "truncated history");
        }

        Ok(Fitted {
            history: kept,
            estimated_tokens,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageAttachment, ToolCall, ToolResult};
    use pretty_assertions::assert_eq;

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text()).collect()
    }

    #[test]
    fn text_estimate_rounds_up() {
        assert_eq!(estimate_text_tokens(""), 0);
        assert_eq!(estimate_text_tokens("abc"), 1);
        assert_eq!(estimate_text_tokens("abcde"), 2);
    }

    #[test]
    fn image_adds_flat_cost() {
        let context = ContextBundle {
            image: Some(ImageAttachment::from_base64("AAAA", "image/png")),
            ..Default::default()
        };
        let with = estimate_current_tokens(&Message::user(""), &context);
        assert!(with >= IMAGE_TOKEN_ESTIMATE + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn oldest_messages_are_dropped_first() {
        // each message: 4 overhead + 10 tokens of text
        let history: Vec<Message> = (0..5)
            .map(|i| Message::user(format!("{i}").repeat(40)))
            .collect();
        let budget = TokenBudget::new(14 * 3 + 10, None);
        let fitted = budget.fit(&history, 10).unwrap();
        assert_eq!(fitted.history.len(), 3);
        assert_eq!(fitted.history[0].text(), "2".repeat(40));
        assert_eq!(fitted.dropped, 2);
        assert!(fitted.estimated_tokens <= budget.ceiling());
    }

    #[test]
    fn system_messages_survive_truncation() {
        let history = vec![
            Message::system("rules"),
            Message::user("a".repeat(400)),
            Message::assistant("b".repeat(400)),
            Message::user("short"),
        ];
        let budget = TokenBudget::new(30, Some("be nice"));
        let fitted = budget.fit(&history, 5).unwrap();
        assert_eq!(texts(&fitted.history), vec!["rules", "short"]);
        assert!(fitted.estimated_tokens <= 30);
    }

    #[test]
    fn oversized_current_turn_fails_fast() {
        let budget = TokenBudget::new(100, Some("prompt"));
        let err = budget.fit(&[], 200).unwrap_err();
        assert!(matches!(err, GlimpseError::TurnTooLarge { ceiling: 100, .. }));
    }

    #[test]
    fn truncation_never_leaves_orphan_tool_results() {
        let mut call = Message::assistant("x".repeat(200));
        call.tool_calls = vec![ToolCall {
            id: "c1".into(),
            name: "calc".into(),
            arguments: serde_json::json!({}),
        }];
        let result = Message::tool(ToolResult {
            tool_call_id: "c1".into(),
            tool_name: "calc".into(),
            content: "4".into(),
            is_error: false,
        });
        let history = vec![Message::user("2+2"), call, result, Message::assistant("It is 4.")];

        let fitted = TokenBudget::new(40, None).fit(&history, 0).unwrap();
        assert!(fitted.history.iter().all(|m| m.role != Role::Tool));
        assert_eq!(texts(&fitted.history), vec!["It is 4."]);
    }

    #[test]
    fn invariant_holds_across_ceilings() {
        let history: Vec<Message> = (0..12)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user("q".repeat(i * 13 + 1))
                } else {
                    Message::assistant("a".repeat(i * 7 + 3))
                }
            })
            .collect();
        for ceiling in (30..400).step_by(17) {
            let budget = TokenBudget::new(ceiling, Some("system prompt"));
            if let Ok(fitted) = budget.fit(&history, 12) {
                let total = budget.system_prompt_tokens()
                    + 12
                    + fitted.history.iter().map(estimate_message_tokens).sum::<usize>();
                assert!(total <= ceiling, "ceiling {ceiling} exceeded: {total}");
                assert_eq!(total, fitted.estimated_tokens);
            }
        }
    }
}
