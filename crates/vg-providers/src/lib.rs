//! Provider drivers
//!
//! A driver is the uniform capability facade over one upstream LLM: it can
//! send a prompt (streaming or not) and report its identity. Drivers own
//! their HTTP client, so independent instances never serialize against each
//! other — the temporal-mixing dispatcher depends on that.

pub mod anthropic;
pub mod factory;
pub mod google;
pub mod openai_compatible;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;

use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::TokenUsage;

pub use factory::DriverCatalog;

/// Deadline for every provider call.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(180);

/// Normalized non-streaming completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    pub raw: Value,
}

/// Normalized streaming chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = GatewayResult<StreamChunk>> + Send>>;

/// Capability facade over one upstream provider.
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic").
    fn provider(&self) -> &str;

    /// Model tag this driver targets.
    fn model(&self) -> &str;

    /// The secret material, surfaced only so the dispatcher can mint
    /// sibling instances. Never logged.
    fn api_key(&self) -> &str;

    /// Streaming send.
    async fn stream_complete(&self, prompt: &str) -> GatewayResult<ChunkStream>;

    /// Non-streaming send. The default fully consumes the streaming method;
    /// drivers with a native non-streaming call override it.
    async fn complete(&self, prompt: &str) -> GatewayResult<Completion> {
        let mut stream = self.stream_complete(prompt).await?;
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            if let Some(text) = chunk?.content {
                content.push_str(&text);
            }
        }
        Ok(Completion {
            content,
            usage: TokenUsage::default(),
            raw: Value::Null,
        })
    }
}

fn http_client() -> GatewayResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .map_err(|e| GatewayError::Upstream(format!("failed to create HTTP client: {e}")))
}

/// Accumulates SSE bytes and yields complete `data:` payloads.
///
/// Byte chunks from the wire do not align with event boundaries; incomplete
/// lines stay buffered until the next push.
#[derive(Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw text, returning the `data:` payloads completed by it.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);
            if let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                let payload = payload.trim();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_buffer_handles_split_lines() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push("data: {\"a\":").is_empty());
        let payloads = buffer.push("1}\n\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn test_sse_buffer_skips_non_data_lines() {
        let mut buffer = SseLineBuffer::new();
        let payloads = buffer.push("event: message_start\ndata: {\"x\":2}\n: comment\n");
        assert_eq!(payloads, vec!["{\"x\":2}".to_string()]);
    }

    #[test]
    fn test_sse_buffer_strips_carriage_returns() {
        let mut buffer = SseLineBuffer::new();
        let payloads = buffer.push("data: {\"x\":3}\r\n");
        assert_eq!(payloads, vec!["{\"x\":3}".to_string()]);
    }
}
