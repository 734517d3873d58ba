//! Google Gemini streaming adapter.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::GlimpseError;
use crate::models::{ModelCapabilities, ModelConfig};
use crate::types::{
    DeltaEvent, DeltaStream, FinishReason, Message, Role, ToolCallFragment, TurnResult, Usage,
};

use super::format::compose_current_text;
use super::http::{google_headers, post_streaming, sse_delta_stream, SseDecoder};
use super::{ProviderAdapter, TurnRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleAdapter {
    model_id: String,
    api_key: String,
    base_url: String,
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
    capabilities: ModelCapabilities,
}

impl GoogleAdapter {
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
        let mut contents = Vec::new();

        for msg in request.replayable_history() {
            if msg.role == Role::System {
                system_parts.push(msg.text());
                continue;
            }
            push_parts(&mut contents, wire_role(msg.role), message_parts(msg));
        }

        let mut current = Vec::new();
        let text = compose_current_text(&request.current, &request.context);
        if !text.trim().is_empty() {
            current.push(serde_json::json!({ "text": text }));
        }
        if let Some(image) = &request.context.image {
            current.push(serde_json::json!({
                "inlineData": { "mimeType": image.mime_type, "data": image.data }
            }));
        }
        push_parts(&mut contents, "user", current);

        for msg in &request.follow_up {
            push_parts(&mut contents, wire_role(msg.role), message_parts(msg));
        }

        let mut body = serde_json::json!({ "contents": contents });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert(
                    "systemInstruction".into(),
                    serde_json::json!({ "parts": [{ "text": system_parts.join("\n\n") }] }),
                );
            }

            let mut generation_config = serde_json::Map::new();
            if let Some(max) = self.max_output_tokens {
                generation_config.insert("maxOutputTokens".into(), max.into());
            }
            if let Some(temp) = self.temperature {
                generation_config.insert("temperature".into(), temp.into());
            }
            if !generation_config.is_empty() {
                obj.insert("generationConfig".into(), generation_config.into());
            }

            if !request.tools.is_empty() {
                let declarations: Vec<Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        })
                    })
                    .collect();
                obj.insert(
                    "tools".into(),
                    serde_json::json!([{ "functionDeclarations": declarations }]),
                );
            }
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn provider_name(&self) -> &str {
        "google"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn stream_turn(&self, request: &TurnRequest) -> Result<DeltaStream, GlimpseError> {
        let body = self.build_request_body(request);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model_id
        );

        debug!(provider = "google", model = %self.model_id, "opening stream");

        let resp = post_streaming(&url, google_headers(&self.api_key), &body).await?;
        Ok(sse_delta_stream(resp, GoogleDecoder::default()))
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        _ => "user",
    }
}

fn message_parts(msg: &Message) -> Vec<Value> {
    // Gemini matches results to calls by function name, not by id.
    if let Some(result) = &msg.tool_result {
        return vec![serde_json::json!({
            "functionResponse": {
                "name": result.tool_name,
                "response": { "result": result.content },
            }
        })];
    }

    let mut parts = Vec::new();
    if !msg.text().trim().is_empty() {
        parts.push(serde_json::json!({ "text": msg.text() }));
    }
    for call in &msg.tool_calls {
        parts.push(serde_json::json!({
            "functionCall": { "name": call.name, "args": call.arguments }
        }));
    }
    parts
}

fn push_parts(contents: &mut Vec<Value>, role: &str, parts: Vec<Value>) {
    if parts.is_empty() {
        return;
    }
    if let Some(last) = contents.last_mut() {
        if last["role"] == role {
            if let Some(existing) = last["parts"].as_array_mut() {
                existing.extend(parts);
                return;
            }
        }
    }
    contents.push(serde_json::json!({ "role": role, "parts": parts }));
}

/// Decodes `streamGenerateContent` SSE chunks.
///
/// Gemini sends each function call whole, so every call becomes a single
/// complete fragment with a locally generated id.
#[derive(Debug, Default)]
pub struct GoogleDecoder {
    next_index: usize,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl SseDecoder for GoogleDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<DeltaEvent>, GlimpseError> {
        let chunk: Value = serde_json::from_str(data)
            .map_err(|e| GlimpseError::MalformedResponse(format!("Gemini chunk: {e}")))?;

        if let Some(message) = chunk.pointer("/error/message").and_then(Value::as_str) {
            return Err(GlimpseError::Stream(message.to_string()));
        }

        let mut events = Vec::new();
        let candidates = chunk["candidates"].as_array().map(Vec::as_slice).unwrap_or(&[]);
        for candidate in candidates {
            let parts = candidate
                .pointer("/content/parts")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            for part in parts {
                if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
                    events.push(DeltaEvent::text(text));
                }
                if let Some(call) = part.get("functionCall") {
                    let name = call["name"].as_str().ok_or_else(|| {
                        GlimpseError::MalformedResponse("Gemini functionCall without name".into())
                    })?;
                    let args = call
                        .get("args")
                        .cloned()
                        .unwrap_or_else(|| serde_json::json!({}));
                    events.push(DeltaEvent::ToolCall(
                        ToolCallFragment::new(self.next_index)
                            .id(format!("call_{}", uuid::Uuid::new_v4().simple()))
                            .name(name)
                            .arguments(args.to_string()),
                    ));
                    self.next_index += 1;
                }
            }
            if let Some(reason) = candidate["finishReason"].as_str() {
                self.finish_reason = Some(map_finish_reason(reason));
            }
        }

        if let Some(meta) = chunk.get("usageMetadata") {
            let count = |key: &str| meta[key].as_u64().unwrap_or(0) as u32;
            let update = Usage {
                prompt_tokens: count("promptTokenCount"),
                completion_tokens: count("candidatesTokenCount"),
                total_tokens: count("totalTokenCount"),
            };
            self.usage.absorb(&update);
            events.push(DeltaEvent::Usage(update));
        }

        Ok(events)
    }

    fn finish(&mut self) -> Result<DeltaEvent, GlimpseError> {
        let mut finish_reason = self.finish_reason.take().ok_or_else(|| {
            GlimpseError::Stream("stream ended before a finish reason was reported".into())
        })?;
        // Gemini reports STOP even when the turn ended in function calls.
        if finish_reason == FinishReason::Stop && self.next_index > 0 {
            finish_reason = FinishReason::ToolCalls;
        }
        Ok(DeltaEvent::Finish(TurnResult {
            finish_reason,
            usage: self.usage,
        }))
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        other => {
            debug!(reason = other, "unknown finish reason, treating as stop");
            FinishReason::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKey;
    use crate::types::{ImageAttachment, ToolCall, ToolResult};

    fn adapter() -> GoogleAdapter {
        let config = ModelConfig::builder()
            .provider(ProviderKey::Google)
            .model_id("gemini-2.5-flash")
            .credential("key")
            .temperature(0.2)
            .build();
        GoogleAdapter::new(&config)
    }

    #[test]
    fn function_call_becomes_complete_fragment() {
        let mut decoder = GoogleDecoder::default();
        let events = decoder
            .decode(r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"calc","args":{"expr":"2+2"}}}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":11,"candidatesTokenCount":4,"totalTokenCount":15}}"#)
            .unwrap();

        let DeltaEvent::ToolCall(fragment) = &events[0] else {
            panic!("expected tool call fragment, got {events:?}");
        };
        assert_eq!(fragment.index, 0);
        assert_eq!(fragment.name.as_deref(), Some("calc"));
        assert!(fragment.id.as_deref().unwrap().starts_with("call_"));
        assert_eq!(fragment.arguments.as_deref(), Some(r#"{"expr":"2+2"}"#));

        let DeltaEvent::Finish(result) = decoder.finish().unwrap() else {
            panic!("expected finish");
        };
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
        assert_eq!(result.usage.total_tokens, 15);
    }

    #[test]
    fn text_chunks_then_stop() {
        let mut decoder = GoogleDecoder::default();
        let events = decoder
            .decode(r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#)
            .unwrap();
        assert_eq!(events, vec![DeltaEvent::text("Hel")]);
        decoder
            .decode(r#"{"candidates":[{"content":{"parts":[{"text":"lo"}]},"finishReason":"STOP"}]}"#)
            .unwrap();
        let DeltaEvent::Finish(result) = decoder.finish().unwrap() else {
            panic!("expected finish");
        };
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn safety_block_is_content_filter() {
        let mut decoder = GoogleDecoder::default();
        decoder
            .decode(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#)
            .unwrap();
        let DeltaEvent::Finish(result) = decoder.finish().unwrap() else {
            panic!("expected finish");
        };
        assert_eq!(result.finish_reason, FinishReason::ContentFilter);
    }

    #[test]
    fn request_uses_model_role_and_function_response() {
        let mut request = TurnRequest::single(Message::user("2+2?"));
        request.history = vec![Message::user("hi"), Message::assistant("hello")];
        request.context.image = Some(ImageAttachment::from_base64("AAAA", "image/jpeg"));
        let mut call_msg = Message::assistant("");
        call_msg.tool_calls = vec![ToolCall {
            id: "call_x".into(),
            name: "calc".into(),
            arguments: serde_json::json!({"expr": "2+2"}),
        }];
        request.follow_up = vec![
            call_msg,
            Message::tool(ToolResult {
                tool_call_id: "call_x".into(),
                tool_name: "calc".into(),
                content: "4".into(),
                is_error: false,
            }),
        ];

        let body = adapter().build_request_body(&request);
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(contents[3]["parts"][0]["functionCall"]["name"], "calc");
        assert_eq!(contents[4]["role"], "user");
        assert_eq!(contents[4]["parts"][0]["functionResponse"]["response"]["result"], "4");
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
    }
}
