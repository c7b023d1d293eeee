//! Anthropic (Claude) driver.
//!
//! Uses the Messages API, which differs from OpenAI's chat completions:
//! auth via `x-api-key`, a pinned `anthropic-version`, and event-typed SSE
//! frames on the streaming path.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::TokenUsage;

use crate::{http_client, ChunkStream, Completion, ProviderDriver, SseLineBuffer, StreamChunk};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicDriver {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<MessageParam>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicDriver {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> GatewayResult<Self> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_BASE.to_string(),
            client: http_client()?,
        })
    }

    async fn post(&self, prompt: &str, stream: bool) -> GatewayResult<reqwest::Response> {
        let request = MessagesRequest {
            model: self.model.clone(),
            messages: vec![MessageParam {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens: MAX_TOKENS,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(GatewayError::Upstream(format!(
                "anthropic API error ({status}): {body}"
            )));
        }
        Ok(response)
    }

    fn parse_stream_payload(payload: &str) -> Option<StreamChunk> {
        let event: StreamEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("skipping unparseable anthropic event: {e}");
                return None;
            }
        };
        match event.event_type.as_str() {
            "content_block_delta" => event.delta.and_then(|d| d.text).map(|text| StreamChunk {
                content: Some(text),
                finish_reason: None,
            }),
            "message_stop" => Some(StreamChunk {
                content: None,
                finish_reason: Some("stop".to_string()),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl ProviderDriver for AnthropicDriver {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> &str {
        &self.api_key
    }

    async fn complete(&self, prompt: &str) -> GatewayResult<Completion> {
        let response = self.post(prompt, false).await?;
        let raw: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to parse response: {e}")))?;
        let parsed: MessagesResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Upstream(format!("unexpected response shape: {e}")))?;

        let content = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();
        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            })
            .unwrap_or_default();

        Ok(Completion { content, usage, raw })
    }

    async fn stream_complete(&self, prompt: &str) -> GatewayResult<ChunkStream> {
        let response = self.post(prompt, true).await?;
        let mut buffer = SseLineBuffer::new();

        let stream = response.bytes_stream().flat_map(move |result| {
            let chunks: Vec<GatewayResult<StreamChunk>> = match result {
                Ok(bytes) => buffer
                    .push(&String::from_utf8_lossy(&bytes))
                    .iter()
                    .filter_map(|payload| Self::parse_stream_payload(payload).map(Ok))
                    .collect(),
                Err(e) => vec![Err(GatewayError::Upstream(format!("stream error: {e}")))],
            };
            futures::stream::iter(chunks)
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_block_delta() {
        let payload = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        let chunk = AnthropicDriver::parse_stream_payload(payload).unwrap();
        assert_eq!(chunk.content.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_parse_message_stop() {
        let payload = r#"{"type":"message_stop"}"#;
        let chunk = AnthropicDriver::parse_stream_payload(payload).unwrap();
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_other_events_are_ignored() {
        assert!(AnthropicDriver::parse_stream_payload(r#"{"type":"message_start"}"#).is_none());
        assert!(AnthropicDriver::parse_stream_payload(r#"{"type":"ping"}"#).is_none());
        assert!(AnthropicDriver::parse_stream_payload("not json").is_none());
    }

    #[test]
    fn test_identity() {
        let driver = AnthropicDriver::new("claude-3-haiku-20240307", "sk-ant").unwrap();
        assert_eq!(driver.provider(), "anthropic");
        assert_eq!(driver.model(), "claude-3-haiku-20240307");
    }
}
