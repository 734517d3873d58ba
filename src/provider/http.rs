//! Shared HTTP client, SSE decoding, and error mapping.

use std::sync::OnceLock;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};

use crate::error::{ErrorDetails, GlimpseError};
use crate::types::{DeltaEvent, DeltaStream};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// Only a connect timeout is set: streamed responses may legitimately run
/// for minutes.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Build Anthropic-style headers (x-api-key).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Build Gemini headers (x-goog-api-key keeps the key out of request URLs).
pub fn google_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-goog-api-key", val);
    }
    headers
}

/// One classified line of an SSE body.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    Data(&'a str),
    Done,
    Ignored,
}

/// Classify an SSE line; comments, `event:` lines and blanks are ignored.
pub fn parse_sse_line(line: &str) -> SseLine<'_> {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Ignored;
    };
    let data = data.trim();
    if data == "[DONE]" {
        SseLine::Done
    } else if data.is_empty() {
        SseLine::Ignored
    } else {
        SseLine::Data(data)
    }
}

/// Translate one provider's SSE payloads into uniform delta events.
pub trait SseDecoder: Send + 'static {
    /// Decode one `data:` payload.
    fn decode(&mut self, data: &str) -> Result<Vec<DeltaEvent>, GlimpseError>;

    /// Called once at `[DONE]` or end of body; must yield the terminal
    /// [`DeltaEvent::Finish`] or fail if the provider never said how it ended.
    fn finish(&mut self) -> Result<DeltaEvent, GlimpseError>;
}

/// Drive `decoder` over a streaming HTTP response.
///
/// Dropping the returned stream drops the response body, which aborts the
/// underlying connection.
pub fn sse_delta_stream<D: SseDecoder>(resp: reqwest::Response, mut decoder: D) -> DeltaStream {
    let byte_stream = resp.bytes_stream();

    let stream = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut saw_done = false;
        futures::pin_mut!(byte_stream);

        'body: while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(GlimpseError::Network(e));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&raw);
                match parse_sse_line(line.trim()) {
                    SseLine::Ignored => continue,
                    SseLine::Done => {
                        saw_done = true;
                        break 'body;
                    }
                    SseLine::Data(data) => match decoder.decode(data) {
                        Ok(events) => {
                            for event in events {
                                yield Ok(event);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                }
            }
        }

        let tail = String::from_utf8_lossy(&buffer).to_string();
        if let (false, SseLine::Data(data)) = (saw_done, parse_sse_line(tail.trim())) {
            match decoder.decode(data) {
                Ok(events) => {
                    for event in events {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        yield decoder.finish();
    };

    Box::pin(stream)
}

/// Post `body` and return the response, or the mapped error for a non-2xx status.
pub async fn post_streaming(
    url: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<reqwest::Response, GlimpseError> {
    let resp = shared_client()
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await?;

    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let retry_after_ms = retry_after_header_ms(resp.headers());
    let body_text = resp.text().await.unwrap_or_default();
    Err(status_to_error(status, &body_text, retry_after_ms))
}

/// Map an HTTP error status and body to a [`GlimpseError`].
pub fn status_to_error(status: u16, body: &str, retry_after_ms: Option<u64>) -> GlimpseError {
    match status {
        401 | 403 => GlimpseError::Authentication(error_message(body)),
        429 => GlimpseError::RateLimited {
            retry_after_ms: retry_after_ms.or_else(|| extract_retry_after(body)),
        },
        _ => match error_details(body) {
            Some(details) => GlimpseError::api_with_details(status, error_message(body), details),
            None => GlimpseError::api(status, error_message(body)),
        },
    }
}

fn retry_after_header_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

/// Pull a human-readable message out of a JSON error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn error_details(body: &str) -> Option<ErrorDetails> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let text = |key: &str| error.get(key).and_then(|v| v.as_str()).map(str::to_string);
    Some(ErrorDetails {
        provider_code: text("code").or_else(|| text("type")).or_else(|| text("status")),
        param: text("param"),
        request_id: value
            .get("request_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}
