//! Completion client for OpenAI-compatible chat APIs.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parley_core::config::GenerationConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GenerationError;

/// Fixed instructions placed ahead of the grounding context.
pub const SYSTEM_INSTRUCTIONS: &str = "You are a helpful AI assistant with access to real-time information.

Use the provided context from web search results to answer the user's question accurately and comprehensively.
If the context doesn't contain relevant information, acknowledge this and provide general knowledge if appropriate.
Always cite your sources when using information from the search results.
Keep your responses conversational but informative.";

/// A language model that answers a query given grounding context.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce the whole answer in one round trip.
    async fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError>;

    /// Produce the answer incrementally.
    ///
    /// Each non-empty increment is handed to `on_chunk` as it arrives. On
    /// error, increments already delivered stay delivered.
    async fn generate_streaming(
        &self,
        query: &str,
        context: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), GenerationError>;
}

/// One chat message sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// The system turn (instructions plus context) followed by the user's query.
pub fn build_messages(query: &str, context: &str) -> Vec<ChatTurn> {
    vec![
        ChatTurn {
            role: "system".to_string(),
            content: format!("{SYSTEM_INSTRUCTIONS}\n\nContext:\n{context}"),
        },
        ChatTurn {
            role: "user".to_string(),
            content: query.to_string(),
        },
    ]
}

// OpenAI-compatible wire types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Client for `{endpoint}/chat/completions`.
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompletionClient {
    /// Build a client from the `[generation]` config section.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    async fn send(
        &self,
        query: &str,
        context: &str,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        if self.api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let body = ChatRequest {
            model: &self.model,
            messages: build_messages(query, context),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionClient {
    async fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError> {
        let response = self.send(query, context, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedBody(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)?;

        info!(model = %self.model, answer_len = content.len(), "Completion received");
        Ok(content)
    }

    async fn generate_streaming(
        &self,
        query: &str,
        context: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), GenerationError> {
        let response = self.send(query, context, true).await?;
        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut delivered = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GenerationError::Stream(e.to_string()))?;
            for line in lines.push(&chunk) {
                match parse_sse_line(&line) {
                    SseEvent::Delta(text) => {
                        delivered += 1;
                        on_chunk(&text);
                    }
                    SseEvent::Done => {
                        info!(model = %self.model, chunks = delivered, "Completion stream finished");
                        return Ok(());
                    }
                    SseEvent::Skip => {}
                }
            }
        }

        if let Some(line) = lines.finish() {
            match parse_sse_line(&line) {
                SseEvent::Delta(text) => on_chunk(&text),
                SseEvent::Done => return Ok(()),
                SseEvent::Skip => {}
            }
        }

        Err(GenerationError::Stream(
            "stream closed before the end marker".to_string(),
        ))
    }
}

// =============================================================================
// Server-sent events
// =============================================================================

/// Reassembles lines that may be split across network reads.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Append bytes and return every line completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Whatever is left after the stream closes, if anything.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

pub(crate) fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty())
            .map_or(SseEvent::Skip, SseEvent::Delta),
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable stream event");
            SseEvent::Skip
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({"choices":[{"delta":{"content":text}}]})
        )
    }

    #[test]
    fn test_build_messages_shape() {
        let messages = build_messages("What is the capital of France?", "ctx block");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.starts_with(SYSTEM_INSTRUCTIONS));
        assert!(messages[0].content.ends_with("\n\nContext:\nctx block"));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "What is the capital of France?");
    }

    #[test]
    fn test_system_instructions_cover_grounding_rules() {
        assert!(SYSTEM_INSTRUCTIONS.contains("cite your sources"));
        assert!(SYSTEM_INSTRUCTIONS.contains("general knowledge"));
        assert!(SYSTEM_INSTRUCTIONS.contains("conversational"));
    }

    #[test]
    fn test_request_serializes_stream_flag() {
        let req = ChatRequest {
            model: "gpt-4",
            messages: build_messages("q", "c"),
            max_tokens: 1000,
            temperature: 0.7,
            stream: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn test_parse_delta_line() {
        assert_eq!(
            parse_sse_line(&delta_line("Par")),
            SseEvent::Delta("Par".to_string())
        );
    }

    #[test]
    fn test_parse_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line("data:[DONE]"), SseEvent::Done);
    }

    #[test]
    fn test_parse_skips_noise() {
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line("event: ping"), SseEvent::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseEvent::Skip);
        // Role-only and empty deltas carry no text
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Skip
        );
        assert_eq!(parse_sse_line(&delta_line("")), SseEvent::Skip);
    }

    #[test]
    fn test_line_buffer_reassembles_split_event() {
        let full = format!("{}\n\n", delta_line("Paris"));
        let (a, b) = full.as_bytes().split_at(17);

        let mut buf = SseLineBuffer::default();
        assert!(buf.push(a).is_empty());
        let lines = buf.push(b);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            parse_sse_line(&lines[0]),
            SseEvent::Delta("Paris".to_string())
        );
        assert_eq!(lines[1], "");
    }

    #[test]
    fn test_line_buffer_handles_split_multibyte_char() {
        let full = format!("{}\n", delta_line("café"));
        let bytes = full.as_bytes();
        // Split inside the two-byte 'é'
        let split = full.find('é').unwrap() + 1;

        let mut buf = SseLineBuffer::default();
        assert!(buf.push(&bytes[..split]).is_empty());
        let lines = buf.push(&bytes[split..]);
        assert_eq!(
            parse_sse_line(&lines[0]),
            SseEvent::Delta("café".to_string())
        );
    }

    #[test]
    fn test_line_buffer_strips_crlf_and_finishes() {
        let mut buf = SseLineBuffer::default();
        let lines = buf.push(b"data: [DONE]\r\ndata: tail");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
        assert_eq!(buf.finish(), Some("data: tail".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = OpenAiCompletionClient::new(&GenerationConfig::default()).unwrap();
        let err = client.generate("q", "c").await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingApiKey));
    }

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        let config = GenerationConfig {
            endpoint: "http://localhost:8080/v1/".to_string(),
            ..GenerationConfig::default()
        };
        let client = OpenAiCompletionClient::new(&config).unwrap();
        assert_eq!(
            client.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
