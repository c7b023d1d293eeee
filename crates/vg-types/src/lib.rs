//! Shared types for the Veilgate gateway.
//!
//! Chat message shapes, model references, record types stored in the counter
//! store, and the input validation applied at every external boundary.

pub mod errors;
pub mod records;
pub mod validate;

use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, GatewayResult};

/// Session records, candidate lists, and endpoint records live this long.
pub const SESSION_TTL_SECS: u64 = 3600;
/// Ad-hoc endpoints minted for stateless direct queries.
pub const STATELESS_ENDPOINT_TTL_SECS: u64 = 300;
/// User session history, used to tell "expired" from "never existed".
pub const USER_SESSIONS_TTL_SECS: u64 = 7 * 24 * 3600;
/// Suspicious-access records kept for security review.
pub const SUSPICIOUS_ACTIVITY_TTL_SECS: u64 = 30 * 24 * 3600;
/// Rolling hourly token counter per key.
pub const KEY_USAGE_HOUR_TTL_SECS: u64 = 3600;
/// Rolling lifetime token counter per key.
pub const KEY_USAGE_TOTAL_TTL_SECS: u64 = 30 * 24 * 3600;
/// Last-used timestamp per key.
pub const KEY_LAST_USED_TTL_SECS: u64 = 24 * 3600;

/// A single chat message in OpenAI-compatible shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Total tokens, falling back to the component sum when the provider
    /// omitted the total.
    pub fn total(&self) -> u32 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

/// A `provider/model` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse a `provider/model` string. Exactly one `/`, both halves
    /// non-empty.
    pub fn parse(s: &str) -> GatewayResult<Self> {
        let (provider, model) = s.split_once('/').ok_or_else(|| {
            GatewayError::InvalidInput(format!(
                "invalid model string '{s}', expected 'provider/model'"
            ))
        })?;
        let provider = provider.trim();
        let model = model.trim();
        if provider.is_empty() || model.is_empty() || model.contains('/') {
            return Err(GatewayError::InvalidInput(format!(
                "invalid model string '{s}', expected 'provider/model'"
            )));
        }
        Ok(Self::new(provider, model))
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Flatten a message array into the single prompt string handed to drivers,
/// preserving the conversational context.
pub fn flatten_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| !m.role.is_empty() && !m.content.is_empty())
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_parse() {
        let m = ModelRef::parse("openai/gpt-4o").unwrap();
        assert_eq!(m.provider, "openai");
        assert_eq!(m.model, "gpt-4o");
        assert_eq!(m.to_string(), "openai/gpt-4o");
    }

    #[test]
    fn test_model_ref_parse_rejects_bad_shapes() {
        assert!(ModelRef::parse("gpt-4o").is_err());
        assert!(ModelRef::parse("/gpt-4o").is_err());
        assert!(ModelRef::parse("openai/").is_err());
        assert!(ModelRef::parse("a/b/c").is_err());
        assert!(ModelRef::parse("").is_err());
    }

    #[test]
    fn test_flatten_messages() {
        let messages = vec![
            ChatMessage {
                role: "system".into(),
                content: "You are terse.".into(),
            },
            ChatMessage::user("Hi"),
        ];
        assert_eq!(flatten_messages(&messages), "system: You are terse.\nuser: Hi");
    }

    #[test]
    fn test_flatten_skips_empty_entries() {
        let messages = vec![
            ChatMessage {
                role: String::new(),
                content: "orphan".into(),
            },
            ChatMessage::user("Hi"),
        ];
        assert_eq!(flatten_messages(&messages), "user: Hi");
    }

    #[test]
    fn test_token_usage_total_fallback() {
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 0,
        };
        assert_eq!(usage.total(), 15);

        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 17,
        };
        assert_eq!(usage.total(), 17);
    }
}
