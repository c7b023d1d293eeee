//! SSE framing helpers.
//!
//! The direct API streams OpenAI-shaped `chat.completion.chunk` objects;
//! the web API streams application chunks (content plus typed status
//! updates). Both end with `data: [DONE]`.

use axum::response::sse::Event;
use serde_json::{json, Value};

/// OpenAI-shaped streaming chunk for the direct API.
pub fn completion_chunk(
    chunk_id: &str,
    content: &str,
    provider: &str,
    model: &str,
    finish_reason: Option<&str>,
) -> Value {
    json!({
        "id": chunk_id,
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp(),
        "model": format!("{provider}/{model}"),
        "choices": [{
            "index": 0,
            "delta": if content.is_empty() { json!({}) } else { json!({"content": content}) },
            "finish_reason": finish_reason,
        }],
    })
}

/// Content chunk for the web API stream.
pub fn content_chunk(content: &str, provider: &str, model: &str, chunk_type: &str) -> Value {
    json!({
        "content": content,
        "provider": provider,
        "model": model,
        "type": chunk_type,
    })
}

/// Privacy status update for the web API stream.
pub fn status_chunk(stage: &str, message: &str, status: &str) -> Value {
    json!({
        "type": "privacy_status",
        "stage": stage,
        "message": message,
        "status": status,
    })
}

/// Wrap a JSON value as one SSE event (`data: <json>`).
pub fn event_json(value: &Value) -> Event {
    Event::default().data(value.to_string())
}

/// Terminal `data: [DONE]` event.
pub fn done_event() -> Event {
    Event::default().data("[DONE]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_chunk_shape() {
        let chunk = completion_chunk("chatcmpl-1", "Hi", "openai", "gpt-4o", None);
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["model"], "openai/gpt-4o");
        assert_eq!(chunk["choices"][0]["delta"]["content"], "Hi");
        assert!(chunk["choices"][0]["finish_reason"].is_null());
    }

    #[test]
    fn test_terminal_chunk_has_empty_delta_and_stop() {
        let chunk = completion_chunk("chatcmpl-1", "", "openai", "gpt-4o", Some("stop"));
        assert!(chunk["choices"][0]["delta"].as_object().unwrap().is_empty());
        assert_eq!(chunk["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_status_chunk_shape() {
        let chunk = status_chunk("pii", "scanning", "processing");
        assert_eq!(chunk["type"], "privacy_status");
        assert_eq!(chunk["stage"], "pii");
        assert_eq!(chunk["status"], "processing");
    }
}
