//! Sequential execution of assembled tool calls.

use tracing::{debug, warn};

use crate::provider::format::tool_result_to_string;
use crate::stream::AssembledCall;
use crate::types::{Message, ToolResult};

use super::arguments::ToolArguments;
use super::registry::ToolRegistry;
use super::tool::ToolContext;
use super::validation::validate_arguments;

/// Runs tool calls against a registry.
///
/// Never fails: unknown tools, invalid arguments and tool errors all become
/// error results the model can read and react to.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    session_id: Option<String>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Execute `calls` one at a time and return one `tool` message per
    /// call, in call order.
    pub async fn dispatch(&self, calls: &[AssembledCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for assembled in calls {
            let result = self.run_one(assembled).await;
            if result.is_error {
                warn!(tool = %result.tool_name, call_id = %result.tool_call_id, "tool call produced an error result");
            }
            results.push(Message::tool(result));
        }
        results
    }

    async fn run_one(&self, assembled: &AssembledCall) -> ToolResult {
        let call = &assembled.call;
        let result = |content: String, is_error: bool| ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content,
            is_error,
        };

        if let Some(parse_error) = &assembled.parse_error {
            return result(parse_error.clone(), true);
        }

        let Some(tool) = self.registry.get(&call.name) else {
            return result(format!("Error: unknown tool '{}'", call.name), true);
        };

        if let Err(reason) = validate_arguments(&call.arguments, &tool.parameters().schema) {
            return result(
                format!("Error: invalid arguments for '{}': {reason}", call.name),
                true,
            );
        }

        let ctx = ToolContext {
            call_id: call.id.clone(),
            session_id: self.session_id.clone(),
        };
        debug!(tool = %call.name, call_id = %call.id, "executing tool");
        match tool
            .execute(&ToolArguments::new(call.arguments.clone()), &ctx)
            .await
        {
            Ok(value) => result(tool_result_to_string(&value), false),
            Err(e) => result(format!("Error: tool '{}' failed: {e}", call.name), true),
        }
    }
}
