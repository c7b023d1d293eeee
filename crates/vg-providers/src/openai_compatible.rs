//! Generic OpenAI-compatible chat-completions driver.
//!
//! Backs OpenAI itself plus the providers that speak its wire format
//! (Together, xAI). Each instance owns its HTTP client.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::{ChatMessage, TokenUsage};

use crate::{http_client, ChunkStream, Completion, ProviderDriver, SseLineBuffer, StreamChunk};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const TOGETHER_API_BASE: &str = "https://api.together.xyz/v1";
pub const XAI_API_BASE: &str = "https://api.x.ai/v1";
pub const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com/v1";

pub struct OpenAiCompatibleDriver {
    provider_name: String,
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    delta: ChatDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleDriver {
    pub fn new(
        provider_name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> GatewayResult<Self> {
        Ok(Self {
            provider_name: provider_name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client: http_client()?,
        })
    }

    fn request_body(&self, prompt: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            stream,
        }
    }

    async fn post(&self, prompt: &str, stream: bool) -> GatewayResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{} request failed: {e}", self.provider_name)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(GatewayError::Upstream(format!(
                "{} API error ({status}): {body}",
                self.provider_name
            )));
        }
        Ok(response)
    }

    /// Parse one SSE data payload into a normalized chunk.
    /// `None` means the payload was the `[DONE]` marker.
    fn parse_stream_payload(payload: &str) -> GatewayResult<Option<StreamChunk>> {
        if payload == "[DONE]" {
            return Ok(None);
        }
        let chunk: ChatStreamChunk = serde_json::from_str(payload)
            .map_err(|e| GatewayError::Upstream(format!("failed to parse stream chunk: {e}")))?;
        let choice = chunk.choices.into_iter().next().unwrap_or(ChatStreamChoice {
            delta: ChatDelta::default(),
            finish_reason: None,
        });
        Ok(Some(StreamChunk {
            content: choice.delta.content,
            finish_reason: choice.finish_reason,
        }))
    }
}

#[async_trait]
impl ProviderDriver for OpenAiCompatibleDriver {
    fn provider(&self) -> &str {
        &self.provider_name
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
        let parsed: ChatResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Upstream(format!("unexpected response shape: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(Completion {
            content,
            usage: parsed.usage.unwrap_or_default(),
            raw,
        })
    }

    async fn stream_complete(&self, prompt: &str) -> GatewayResult<ChunkStream> {
        let response = self.post(prompt, true).await?;
        let mut buffer = SseLineBuffer::new();

        let stream = response.bytes_stream().flat_map(move |result| {
            let chunks: Vec<GatewayResult<StreamChunk>> = match result {
                Ok(bytes) => buffer
                    .push(&String::from_utf8_lossy(&bytes))
                    .iter()
                    .filter_map(|payload| Self::parse_stream_payload(payload).transpose())
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
    fn test_request_body_carries_single_user_message() {
        let driver =
            OpenAiCompatibleDriver::new("openai", OPENAI_API_BASE, "gpt-4o", "sk-test").unwrap();
        let body = driver.request_body("Hi", true);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hi");
    }

    #[test]
    fn test_parse_stream_payload_content() {
        let payload = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let chunk = OpenAiCompatibleDriver::parse_stream_payload(payload)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.content.as_deref(), Some("Hel"));
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn test_parse_stream_payload_finish() {
        let payload = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk = OpenAiCompatibleDriver::parse_stream_payload(payload)
            .unwrap()
            .unwrap();
        assert!(chunk.content.is_none());
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_stream_payload_done_marker() {
        assert!(OpenAiCompatibleDriver::parse_stream_payload("[DONE]")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_stream_payload_garbage_is_upstream_error() {
        assert!(OpenAiCompatibleDriver::parse_stream_payload("not json").is_err());
    }

    #[test]
    fn test_xai_base_url() {
        // xAI speaks the OpenAI wire format from a different origin.
        let driver = OpenAiCompatibleDriver::new("xai", XAI_API_BASE, "grok-beta", "sk").unwrap();
        assert_eq!(driver.base_url, "https://api.x.ai/v1");
        assert_eq!(driver.provider(), "xai");
    }
}
