//! OpenAI Chat Completions streaming adapter.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::GlimpseError;
use crate::models::{ModelCapabilities, ModelConfig};
use crate::types::{
    DeltaEvent, DeltaStream, FinishReason, Message, Role, ToolCallFragment, TurnResult, Usage,
};

use super::format::compose_current_text;
use super::http::{bearer_headers, post_streaming, sse_delta_stream, SseDecoder};
use super::{ProviderAdapter, TurnRequest};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiAdapter {
    provider_name: &'static str,
    model_id: String,
    api_key: String,
    base_url: String,
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
    capabilities: ModelCapabilities,
    stream_usage_option: bool,
}

impl OpenAiAdapter {
    pub fn new(config: &ModelConfig) -> Self {
        Self::for_endpoint(config, "openai", DEFAULT_BASE_URL)
    }

    /// Adapter for an OpenAI wire-compatible endpoint.
    pub(crate) fn for_endpoint(
        config: &ModelConfig,
        provider_name: &'static str,
        default_base_url: &str,
    ) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url.to_string());
        Self {
            provider_name,
            model_id: config.model_id.clone(),
            api_key: config.credential.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            capabilities: config.capabilities(),
            stream_usage_option: true,
        }
    }

    /// Stop sending `stream_options`; for endpoints that reject it.
    pub(crate) fn without_stream_options(mut self) -> Self {
        self.stream_usage_option = false;
        self
    }

    pub fn build_request_body(&self, request: &TurnRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.extend(request.replayable_history().map(message_to_openai));

        let text = compose_current_text(&request.current, &request.context);
        let current = match &request.context.image {
            Some(image) => serde_json::json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": text },
                    { "type": "image_url", "image_url": { "url": image.data_url() } },
                ],
            }),
            None => serde_json::json!({ "role": "user", "content": text }),
        };
        messages.push(current);
        messages.extend(request.follow_up.iter().map(message_to_openai));

        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "stream": true,
        });

        if let Some(obj) = body.as_object_mut() {
            if self.stream_usage_option {
                obj.insert(
                    "stream_options".into(),
                    serde_json::json!({ "include_usage": true }),
                );
            }
            if let Some(max) = self.max_output_tokens {
                obj.insert("max_tokens".into(), max.into());
            }
            if let Some(temp) = self.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if !request.tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &str {
        self.provider_name
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn stream_turn(&self, request: &TurnRequest) -> Result<DeltaStream, GlimpseError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            provider = self.provider_name,
            model = %self.model_id,
            messages = body["messages"].as_array().map_or(0, Vec::len),
            "opening chat completions stream"
        );

        let resp = post_streaming(&url, bearer_headers(&self.api_key), &body).await?;
        Ok(sse_delta_stream(resp, OpenAiDecoder::default()))
    }
}

fn message_to_openai(msg: &Message) -> serde_json::Value {
    match msg.role {
        Role::Tool => {
            let (id, content) = msg
                .tool_result
                .as_ref()
                .map(|r| (r.tool_call_id.as_str(), r.content.as_str()))
                .unwrap_or(("", msg.text()));
            serde_json::json!({ "role": "tool", "tool_call_id": id, "content": content })
        }
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let calls: Vec<serde_json::Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = match msg.text() {
                "" => serde_json::Value::Null,
                text => serde_json::Value::String(text.to_string()),
            };
            serde_json::json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        role => serde_json::json!({ "role": role.to_string(), "content": msg.text() }),
    }
}

/// Decodes Chat Completions chunks.
///
/// Finish reason and usage arrive in separate chunks (usage last when
/// `include_usage` is set), so both are held until the stream closes.
#[derive(Debug, Default)]
pub struct OpenAiDecoder {
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl SseDecoder for OpenAiDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<DeltaEvent>, GlimpseError> {
        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|e| GlimpseError::MalformedResponse(format!("OpenAI chunk: {e}")))?;

        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("provider reported an error mid-stream");
            return Err(GlimpseError::Stream(message.to_string()));
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta.unwrap_or_default();
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                events.push(DeltaEvent::Text(text));
            }
            for call in delta.tool_calls.into_iter().flatten() {
                let mut fragment = ToolCallFragment::new(call.index);
                fragment.id = call.id;
                if let Some(function) = call.function {
                    fragment.name = function.name;
                    fragment.arguments = function.arguments;
                }
                events.push(DeltaEvent::ToolCall(fragment));
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.finish_reason = Some(map_finish_reason(reason));
            }
        }

        let usage = chunk
            .usage
            .or_else(|| chunk.x_groq.and_then(|x| x.usage));
        if let Some(u) = usage {
            let update = Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            };
            self.usage.absorb(&update);
            events.push(DeltaEvent::Usage(update));
        }

        Ok(events)
    }

    fn finish(&mut self) -> Result<DeltaEvent, GlimpseError> {
        let finish_reason = self.finish_reason.take().ok_or_else(|| {
            GlimpseError::Stream("stream ended before a finish reason was reported".into())
        })?;
        Ok(DeltaEvent::Finish(TurnResult {
            finish_reason,
            usage: self.usage,
        }))
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => {
            debug!(reason = other, "unknown finish reason, treating as stop");
            FinishReason::Stop
        }
    }
}

// OpenAI wire types (internal)

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
    x_groq: Option<GroqExtra>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    // Some compatible servers send `"delta": null` alongside the finish reason.
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct GroqExtra {
    usage: Option<WireUsage>,
}
