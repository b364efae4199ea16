//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! a streaming `/chat/completions` route.
//!
//! The provider only decodes the SSE wire format into [`ContentDelta`]s.
//! Tool call fragments are forwarded untouched, in arrival order.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use streamgram_core::error::ProviderError;
use streamgram_core::message::{Message, Role};
use streamgram_core::provider::*;
use tracing::{debug, trace, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// An OpenAI-compatible streaming provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", DEFAULT_BASE_URL, api_key, Duration::from_secs(120))
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": true,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl streamgram_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<DeltaReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and forward deltas
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseEvent::Skip => {}
                        SseEvent::Done => {
                            trace!(provider = %provider_name, "Stream finished");
                            return;
                        }
                        SseEvent::Delta(delta) => {
                            if tx.send(Ok(delta)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseEvent::Malformed(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without [DONE]; a trailing unterminated line may
            // still carry data.
            if let Some(line) = lines.finish() {
                match parse_sse_line(&line) {
                    SseEvent::Delta(delta) => {
                        let _ = tx.send(Ok(delta)).await;
                    }
                    SseEvent::Malformed(e) => {
                        let _ = tx.send(Err(e)).await;
                    }
                    SseEvent::Skip | SseEvent::Done => {}
                }
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Builds an [`OpenAiCompatProvider`] from per-user [`ClientSettings`].
pub struct OpenAiCompatFactory {
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl OpenAiCompatFactory {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_model: default_model.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OpenAiCompatFactory {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
    }
}

impl ProviderFactory for OpenAiCompatFactory {
    fn build(&self, settings: &ClientSettings) -> Result<Arc<dyn Provider>, ProviderError> {
        let api_key = settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("no API key set".into()))?;
        let base_url = settings.endpoint.as_deref().unwrap_or(&self.base_url);
        let provider = OpenAiCompatProvider::new("openai", base_url, api_key, self.timeout)?;
        Ok(Arc::new(provider))
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// --- SSE decoding ---

/// Splits a byte stream into lines.
///
/// Splitting happens on raw bytes so a multi-byte character spanning two
/// network chunks is decoded only once it is complete.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string())
    }
}

#[derive(Debug)]
enum SseEvent {
    Skip,
    Done,
    Delta(ContentDelta),
    Malformed(ProviderError),
}

fn parse_sse_line(line: &str) -> SseEvent {
    // Skip empty lines, SSE comments and non-data fields
    if line.is_empty() || line.starts_with(':') {
        return SseEvent::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => match resp.choices.into_iter().next() {
            Some(choice) => match to_delta(choice.delta) {
                Some(delta) => SseEvent::Delta(delta),
                None => SseEvent::Skip,
            },
            None => SseEvent::Skip,
        },
        Err(e) => SseEvent::Malformed(ProviderError::MalformedFrame(format!("{e}: {data}"))),
    }
}

fn to_delta(delta: StreamDelta) -> Option<ContentDelta> {
    let text = delta.content.filter(|c| !c.is_empty());
    let tool_calls: Vec<ToolCallFragment> = delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            ToolCallFragment {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            }
        })
        .collect();

    if text.is_none() && tool_calls.is_empty() {
        return None;
    }
    Some(ContentDelta { text, tool_calls })
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamgram_core::message::ToolCall;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider =
            OpenAiCompatProvider::new("local", "http://localhost:8080/v1/", "k", Duration::from_secs(5))
                .unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "call_1".into(),
                name: "get_web_content".into(),
                arguments: r#"{"url":"https://example.com"}"#.into(),
            }],
        );
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "get_web_content");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "result data");
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_includes_tools_only_when_present() {
        let mut request = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: None,
            max_tokens: None,
            tools: vec![],
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["stream"], true);
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());

        request.tools.push(ToolDefinition {
            name: "get_current_time".into(),
            description: "Get the current time".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        });
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["tools"][0]["function"]["name"], "get_current_time");
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_content_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        match parse_sse_line(line) {
            SseEvent::Delta(d) => assert_eq!(d, ContentDelta::text("Hello")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_done_and_comments() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
        assert!(matches!(parse_sse_line(": keep-alive"), SseEvent::Skip));
        assert!(matches!(parse_sse_line(""), SseEvent::Skip));
        assert!(matches!(parse_sse_line("event: ping"), SseEvent::Skip));
    }

    #[test]
    fn parse_finish_chunk_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(matches!(parse_sse_line(line), SseEvent::Skip));
    }

    #[test]
    fn parse_tool_call_fragments_untouched() {
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"get_current_time","arguments":""}},{"index":1,"function":{"arguments":"{\"url\""}}]},"finish_reason":null}]}"#;
        let SseEvent::Delta(d) = parse_sse_line(line) else {
            panic!("expected delta");
        };
        assert!(d.text.is_none());
        assert_eq!(d.tool_calls.len(), 2);
        assert_eq!(d.tool_calls[0].id.as_deref(), Some("call_a"));
        assert_eq!(d.tool_calls[0].name.as_deref(), Some("get_current_time"));
        assert_eq!(d.tool_calls[1].index, 1);
        assert!(d.tool_calls[1].id.is_none());
        assert_eq!(d.tool_calls[1].arguments.as_deref(), Some("{\"url\""));
    }

    #[test]
    fn parse_malformed_frame() {
        let event = parse_sse_line("data: {\"choices\": [");
        assert!(matches!(
            event,
            SseEvent::Malformed(ProviderError::MalformedFrame(_))
        ));
    }

    #[test]
    fn line_buffer_handles_split_chunks() {
        let mut lines = LineBuffer::default();
        assert!(lines.push(b"data: {\"a\"").is_empty());
        let out = lines.push(b":1}\r\n\ndata: x");
        assert_eq!(out, vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(lines.finish().as_deref(), Some("data: x"));
        assert!(lines.finish().is_none());
    }

    #[test]
    fn line_buffer_keeps_multibyte_chars_intact() {
        let text = "data: \u{00e9}t\u{00e9}\n";
        let bytes = text.as_bytes();
        // Split inside the two-byte "é"
        let mut lines = LineBuffer::default();
        assert!(lines.push(&bytes[..7]).is_empty());
        let out = lines.push(&bytes[7..]);
        assert_eq!(out, vec!["data: \u{00e9}t\u{00e9}".to_string()]);
    }

    #[test]
    fn factory_requires_api_key() {
        let factory = OpenAiCompatFactory::default();
        let err = factory.build(&ClientSettings::default()).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(!err.is_retryable());

        let settings = ClientSettings {
            api_key: Some("sk-test".into()),
            ..ClientSettings::default()
        };
        let provider = factory.build(&settings).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(factory.default_model(), "gpt-4o");
    }
}
