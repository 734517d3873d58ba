//! Anthropic Messages API streaming adapter.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::GlimpseError;
use crate::models::{ModelCapabilities, ModelConfig};
use crate::types::{
    DeltaEvent, DeltaStream, FinishReason, Message, Role, ToolCallFragment, TurnResult, Usage,
};

use super::format::compose_current_text;
use super::http::{anthropic_headers, post_streaming, sse_delta_stream, SseDecoder};
use super::{ProviderAdapter, TurnRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    model_id: String,
    api_key: String,
    base_url: String,
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
    capabilities: ModelCapabilities,
}

impl AnthropicAdapter {
    pub fn new(config: &ModelConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            model_id: config.model_id.clone(),
            api_key: config.credential.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            capabilities: config.capabilities(),
        }
    }

    pub fn build_request_body(&self, request: &TurnRequest) -> Value {
        let mut system_parts: Vec<&str> = request.system_prompt.as_deref().into_iter().collect();
        let mut messages = Vec::new();

        for msg in request.replayable_history() {
            if msg.role == Role::System {
                system_parts.push(msg.text());
                continue;
            }
            push_blocks(&mut messages, wire_role(msg.role), message_blocks(msg));
        }

        let mut current = Vec::new();
        if let Some(image) = &request.context.image {
            current.push(serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.mime_type,
                    "data": image.data,
                }
            }));
        }
        let text = compose_current_text(&request.current, &request.context);
        if !text.trim().is_empty() {
            current.push(serde_json::json!({ "type": "text", "text": text }));
        }
        push_blocks(&mut messages, "user", current);

        for msg in &request.follow_up {
            push_blocks(&mut messages, wire_role(msg.role), message_blocks(msg));
        }

        let mut body = serde_json::json!({
            "model": self.model_id,
            "max_tokens": self.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
            "stream": true,
        });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert("system".into(), system_parts.join("\n\n").into());
            }
            if let Some(temp) = self.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if !request.tools.is_empty() {
                let tools: Vec<Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tools.into());
            }
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn stream_turn(&self, request: &TurnRequest) -> Result<DeltaStream, GlimpseError> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(provider = "anthropic", model = %self.model_id, "opening stream");

        let resp = post_streaming(&url, anthropic_headers(&self.api_key, API_VERSION), &body).await?;
        Ok(sse_delta_stream(resp, AnthropicDecoder::default()))
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        _ => "user",
    }
}

fn message_blocks(msg: &Message) -> Vec<Value> {
    if let Some(result) = &msg.tool_result {
        return vec![serde_json::json!({
            "type": "tool_result",
            "tool_use_id": result.tool_call_id,
            "content": result.content,
            "is_error": result.is_error,
        })];
    }

    let mut blocks = Vec::new();
    if !msg.text().trim().is_empty() {
        blocks.push(serde_json::json!({ "type": "text", "text": msg.text() }));
    }
    for call in &msg.tool_calls {
        blocks.push(serde_json::json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.arguments,
        }));
    }
    blocks
}

/// Append `blocks` under `role`, merging into the previous message when the
/// role repeats. The Messages API requires strictly alternating roles.
fn push_blocks(messages: &mut Vec<Value>, role: &str, blocks: Vec<Value>) {
    if blocks.is_empty() {
        return;
    }
    if let Some(last) = messages.last_mut() {
        if last["role"] == role {
            if let Some(content) = last["content"].as_array_mut() {
                content.extend(blocks);
                return;
            }
        }
    }
    messages.push(serde_json::json!({ "role": role, "content": blocks }));
}

/// Decodes Messages API stream events.
#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl SseDecoder for AnthropicDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<DeltaEvent>, GlimpseError> {
        let event: Value = serde_json::from_str(data)
            .map_err(|e| GlimpseError::MalformedResponse(format!("Anthropic event: {e}")))?;

        let mut events = Vec::new();
        match event.get("type").and_then(Value::as_str).unwrap_or("") {
            "message_start" => {
                if let Some(input) = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    let update = Usage {
                        prompt_tokens: input as u32,
                        ..Default::default()
                    };
                    self.usage.absorb(&update);
                    events.push(DeltaEvent::Usage(update));
                }
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    let mut fragment = ToolCallFragment::new(block_index(&event));
                    fragment.id = block["id"].as_str().map(str::to_string);
                    fragment.name = block["name"].as_str().map(str::to_string);
                    events.push(DeltaEvent::ToolCall(fragment));
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                            events.push(DeltaEvent::text(text));
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            events.push(DeltaEvent::ToolCall(
                                ToolCallFragment::new(block_index(&event)).arguments(partial),
                            ));
                        }
                    }
                    _ => {}
                }
            }
            "message_delta" => {
                if let Some(reason) = event.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.finish_reason = Some(map_stop_reason(reason));
                }
                if let Some(output) = event
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                {
                    let update = Usage {
                        completion_tokens: output as u32,
                        ..Default::default()
                    };
                    self.usage.absorb(&update);
                    events.push(DeltaEvent::Usage(update));
                }
            }
            "error" => {
                let message = event
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("provider reported an error mid-stream");
                return Err(GlimpseError::Stream(message.to_string()));
            }
            _ => {}
        }
        Ok(events)
    }

    fn finish(&mut self) -> Result<DeltaEvent, GlimpseError> {
        let finish_reason = self.finish_reason.take().ok_or_else(|| {
            GlimpseError::Stream("stream ended before a stop reason was reported".into())
        })?;
        Ok(DeltaEvent::Finish(TurnResult {
            finish_reason,
            usage: self.usage,
        }))
    }
}

fn block_index(event: &Value) -> usize {
    event["index"].as_u64().unwrap_or(0) as usize
}

fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => {
            debug!(reason = other, "unknown stop reason, treating as stop");
            FinishReason::Stop
        }
    }
}
