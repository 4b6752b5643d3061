//! Streaming HTTP client for the Qwen backend and the SSE chunk classifier

use crate::error::ChatError;
use crate::models::StreamEvent;
use crate::settings::ChatSettings;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use log::info;
use serde_json::{json, Value};
use std::collections::VecDeque;

/// Raw SSE line sequence for one turn.
///
/// Finite and non-restartable; dropping it closes the underlying
/// connection. A transport fault yields exactly one `Err` item and then
/// the sequence ends, so the consumer's loop always exits cleanly.
pub type LineStream = BoxStream<'static, Result<String, ChatError>>;

/// Classifies one raw wire line into a typed stream event.
///
/// Blank separators, keep-alive comments and non-data lines classify to
/// `None`. Malformed JSON after a `data: ` prefix becomes an `Error`
/// event carrying a diagnostic instead of raising, so stream termination
/// semantics are preserved.
pub fn classify(raw_line: &str) -> Option<StreamEvent> {
    let line = raw_line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();

    // Legacy vLLM passthrough termination marker
    if data == "[DONE]" {
        return Some(StreamEvent::Finish { reason: None });
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => return Some(StreamEvent::Error(format!("Malformed stream frame: {}", e))),
    };

    // Error frames from the API layer carry "error": true without a type tag
    if value["error"].as_bool() == Some(true) {
        return Some(StreamEvent::Error(
            value["chunk"].as_str().unwrap_or("Unknown error").to_string(),
        ));
    }

    match value["type"].as_str() {
        Some("thinking") => Some(StreamEvent::Thinking(
            value["thinking_content"].as_str().unwrap_or_default().to_string(),
        )),
        Some("content") => Some(StreamEvent::ContentDelta(
            value["chunk"].as_str().unwrap_or_default().to_string(),
        )),
        Some("finish") => Some(StreamEvent::Finish {
            reason: value["finish_reason"].as_str().map(str::to_string),
        }),
        Some("error") => Some(StreamEvent::Error(
            value["chunk"].as_str().unwrap_or("Unknown error").to_string(),
        )),
        _ => {
            // Old backend format: untyped frames default to content, and a
            // bare done signal ends the stream
            if value["done"].as_bool() == Some(true) {
                Some(StreamEvent::Finish { reason: None })
            } else {
                value["chunk"]
                    .as_str()
                    .map(|chunk| StreamEvent::ContentDelta(chunk.to_string()))
            }
        }
    }
}

/// One turn's request, mirroring the backend's chat request model.
///
/// `conversation_id` and `context` are passthrough fields: the backend
/// tracks the conversation and injects RAG context server-side (see
/// [`crate::prompts::contextual_question`] for the template it applies).
pub struct TurnRequest<'a> {
    pub message: &'a str,
    pub conversation_id: Option<&'a str>,
    pub context: Option<&'a str>,
}

fn request_body(request: &TurnRequest<'_>, settings: &ChatSettings) -> Value {
    let mut body = json!({
        "message": request.message,
        "temperature": settings.temperature,
        "max_tokens": settings.max_tokens,
        "enable_thinking": settings.enable_thinking,
        "stream": true,
    });
    if !settings.system_prompt.is_empty() {
        body["system_prompt"] = json!(settings.system_prompt);
    }
    if let Some(conversation_id) = request.conversation_id {
        body["conversation_id"] = json!(conversation_id);
    }
    if let Some(context) = request.context {
        body["context"] = json!(context);
    }
    body
}

/// HTTP client opening one streaming chat request per turn
pub struct StreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl StreamClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Opens a streaming chat request and returns the raw SSE line sequence.
    pub async fn open(
        &self,
        request: &TurnRequest<'_>,
        settings: &ChatSettings,
    ) -> Result<LineStream, ChatError> {
        let body = request_body(request, settings);

        info!(
            "Opening chat stream (thinking={}, context={})",
            settings.enable_thinking,
            request.context.is_some()
        );

        let response = self
            .http
            .post(format!("{}/qwen/chat/stream", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::Protocol(format!("API error ({}): {}", status, error_text)));
        }

        Ok(sse_lines(response))
    }

    /// Pings the backend health endpoint.
    pub async fn check_health(&self) -> Result<bool, ChatError> {
        let response = self
            .http
            .get(format!("{}/qwen/health", self.base_url))
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Health check failed: {}", e)))?;
        Ok(response.status().is_success())
    }
}

struct LineState<S> {
    bytes: S,
    buffer: String,
    pending: VecDeque<String>,
    done: bool,
}

/// Splits a streaming response body into trimmed SSE lines.
fn sse_lines(response: reqwest::Response) -> LineStream {
    let state = LineState {
        bytes: response.bytes_stream().boxed(),
        buffer: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let chunk_str = String::from_utf8_lossy(&chunk);
                    state.buffer.push_str(&chunk_str);

                    // Process complete SSE lines from buffer
                    while let Some(line_end) = state.buffer.find('\n') {
                        let line = state.buffer[..line_end].trim().to_string();
                        state.buffer = state.buffer[line_end + 1..].to_string();
                        state.pending.push_back(line);
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((
                        Err(ChatError::Transport(format!("Stream error: {}", e))),
                        state,
                    ));
                }
                None => {
                    state.done = true;
                    // Flush a trailing line that arrived without a newline
                    let tail = state.buffer.trim().to_string();
                    state.buffer.clear();
                    if !tail.is_empty() {
                        return Some((Ok(tail), state));
                    }
                    return None;
                }
            }
        }
    })
    .boxed()
}
