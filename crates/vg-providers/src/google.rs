//! Google (Gemini) driver.
//!
//! `generateContent` for one-shot sends and `streamGenerateContent` with
//! `alt=sse` for streaming. The API key travels as a query parameter.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::TokenUsage;

use crate::{http_client, ChunkStream, Completion, ProviderDriver, SseLineBuffer, StreamChunk};

const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleDriver {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(default, rename = "promptTokenCount")]
    prompt_token_count: u32,
    #[serde(default, rename = "candidatesTokenCount")]
    candidates_token_count: u32,
    #[serde(default, rename = "totalTokenCount")]
    total_token_count: u32,
}

impl GoogleDriver {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> GatewayResult<Self> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: GOOGLE_API_BASE.to_string(),
            client: http_client()?,
        })
    }

    fn body(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        }
    }

    async fn post(&self, url: String, prompt: &str) -> GatewayResult<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::body(prompt))
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("google request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(GatewayError::Upstream(format!(
                "google API error ({status}): {body}"
            )));
        }
        Ok(response)
    }

    fn extract_chunk(response: GenerateResponse) -> StreamChunk {
        let candidate = response.candidates.into_iter().next();
        let content = candidate.as_ref().and_then(|c| {
            c.content
                .as_ref()
                .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect::<String>())
        });
        let finish_reason = candidate
            .and_then(|c| c.finish_reason)
            .map(|reason| if reason == "STOP" { "stop".to_string() } else { reason });
        StreamChunk {
            content: content.filter(|text| !text.is_empty()),
            finish_reason,
        }
    }

    fn parse_stream_payload(payload: &str) -> Option<StreamChunk> {
        match serde_json::from_str::<GenerateResponse>(payload) {
            Ok(response) => Some(Self::extract_chunk(response)),
            Err(e) => {
                tracing::debug!("skipping unparseable google event: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl ProviderDriver for GoogleDriver {
    fn provider(&self) -> &str {
        "google"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> &str {
        &self.api_key
    }

    async fn complete(&self, prompt: &str) -> GatewayResult<Completion> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self.post(url, prompt).await?;
        let raw: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to parse response: {e}")))?;
        let parsed: GenerateResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Upstream(format!("unexpected response shape: {e}")))?;

        let usage = parsed
            .usage_metadata
            .as_ref()
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();
        let content = Self::extract_chunk(parsed).content.unwrap_or_default();

        Ok(Completion { content, usage, raw })
    }

    async fn stream_complete(&self, prompt: &str) -> GatewayResult<ChunkStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let response = self.post(url, prompt).await?;
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
    fn test_parse_stream_payload_text() {
        let payload = r#"{"candidates":[{"content":{"parts":[{"text":"Bonjour"}]}}]}"#;
        let chunk = GoogleDriver::parse_stream_payload(payload).unwrap();
        assert_eq!(chunk.content.as_deref(), Some("Bonjour"));
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn test_parse_stream_payload_finish() {
        let payload =
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP"}]}"#;
        let chunk = GoogleDriver::parse_stream_payload(payload).unwrap();
        assert!(chunk.content.is_none());
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(GoogleDriver::body("Hi")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
    }
}
