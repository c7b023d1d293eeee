//! Boundary validation.
//!
//! Everything arriving over HTTP passes through here before touching
//! sessions, endpoints, or the router. Ids are restricted to a safe
//! character set, content is length-capped and HTML-escaped for storage and
//! logging.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{GatewayError, GatewayResult};
use crate::{ChatMessage, ModelRef};

pub const MAX_CONTENT_LENGTH: usize = 50_000;
pub const MAX_ID_LENGTH: usize = 64;
pub const MAX_MESSAGES: usize = 100;
pub const MAX_MODELS: usize = 20;
pub const MIN_USER_ID: i64 = 1;
pub const MAX_USER_ID: i64 = 999_999_999;

static SAFE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static MODEL_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

fn validate_id(id: &str, field: &str) -> GatewayResult<()> {
    if id.is_empty() {
        return Err(GatewayError::InvalidInput(format!("{field} cannot be empty")));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(GatewayError::InvalidInput(format!(
            "{field} too long (max {MAX_ID_LENGTH} characters)"
        )));
    }
    if !SAFE_ID.is_match(id) {
        return Err(GatewayError::InvalidInput(format!(
            "{field} contains invalid characters"
        )));
    }
    Ok(())
}

pub fn validate_session_id(session_id: &str) -> GatewayResult<()> {
    validate_id(session_id, "session id")
}

pub fn validate_endpoint_id(endpoint_id: &str) -> GatewayResult<()> {
    validate_id(endpoint_id, "endpoint id")
}

pub fn validate_user_id(user_id: i64) -> GatewayResult<()> {
    if !(MIN_USER_ID..=MAX_USER_ID).contains(&user_id) {
        return Err(GatewayError::InvalidInput(format!(
            "user id must be between {MIN_USER_ID} and {MAX_USER_ID}"
        )));
    }
    Ok(())
}

/// Validate a `provider/model` string with the strict per-half character set.
pub fn validate_model_string(model: &str) -> GatewayResult<ModelRef> {
    if model.len() > 100 {
        return Err(GatewayError::InvalidInput(
            "model string too long (max 100 characters)".to_string(),
        ));
    }
    let parsed = ModelRef::parse(model)?;
    if !MODEL_PART.is_match(&parsed.provider) || !MODEL_PART.is_match(&parsed.model) {
        return Err(GatewayError::InvalidInput(format!(
            "model string '{model}' contains invalid characters"
        )));
    }
    Ok(parsed)
}

pub fn validate_models(models: &[String]) -> GatewayResult<Vec<ModelRef>> {
    if models.len() > MAX_MODELS {
        return Err(GatewayError::InvalidInput(format!(
            "too many models selected (max {MAX_MODELS})"
        )));
    }
    models.iter().map(|m| validate_model_string(m)).collect()
}

/// HTML-escape text so it is safe to log and store.
pub fn escape_text(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for c in content.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Length-check and escape a content field.
pub fn validate_content(content: &str, field: &str) -> GatewayResult<String> {
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(GatewayError::InvalidInput(format!(
            "{field} too long (max {MAX_CONTENT_LENGTH} characters)"
        )));
    }
    Ok(escape_text(content))
}

/// Validate an OpenAI-style messages array: bounded length, known roles,
/// escaped content.
pub fn validate_messages(messages: &[ChatMessage]) -> GatewayResult<Vec<ChatMessage>> {
    if messages.is_empty() {
        return Err(GatewayError::InvalidInput("messages cannot be empty".to_string()));
    }
    if messages.len() > MAX_MESSAGES {
        return Err(GatewayError::InvalidInput(format!(
            "too many messages (max {MAX_MESSAGES})"
        )));
    }
    messages
        .iter()
        .map(|m| {
            match m.role.as_str() {
                "system" | "user" | "assistant" => {}
                other => {
                    return Err(GatewayError::InvalidInput(format!(
                        "invalid message role '{other}'"
                    )))
                }
            }
            Ok(ChatMessage {
                role: m.role.clone(),
                content: validate_content(&m.content, "message content")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_ids() {
        assert!(validate_session_id("abc-123_XYZ").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("has space").is_err());
        assert!(validate_session_id("semi;colon").is_err());
        assert!(validate_session_id(&"a".repeat(65)).is_err());
        assert!(validate_endpoint_id(&"f".repeat(20)).is_ok());
    }

    #[test]
    fn test_user_id_range() {
        assert!(validate_user_id(1).is_ok());
        assert!(validate_user_id(999_999_999).is_ok());
        assert!(validate_user_id(0).is_err());
        assert!(validate_user_id(-5).is_err());
        assert!(validate_user_id(1_000_000_000).is_err());
    }

    #[test]
    fn test_model_string_charset() {
        assert!(validate_model_string("openai/gpt-4o").is_ok());
        assert!(validate_model_string("anthropic/claude-3-haiku-20240307").is_ok());
        assert!(validate_model_string("openai/gpt 4o").is_err());
        assert!(validate_model_string("open ai/gpt-4o").is_err());
        assert!(validate_model_string("openai/gpt/4o").is_err());
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(
            escape_text("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
        );
        assert_eq!(escape_text("a & b"), "a &amp; b");
    }

    #[test]
    fn test_content_length_cap() {
        assert!(validate_content(&"a".repeat(MAX_CONTENT_LENGTH), "content").is_ok());
        assert!(validate_content(&"a".repeat(MAX_CONTENT_LENGTH + 1), "content").is_err());
    }

    #[test]
    fn test_messages_roles_and_bounds() {
        let ok = vec![ChatMessage::user("hi")];
        assert!(validate_messages(&ok).is_ok());

        let bad_role = vec![ChatMessage {
            role: "tool".into(),
            content: "x".into(),
        }];
        assert!(validate_messages(&bad_role).is_err());

        assert!(validate_messages(&[]).is_err());

        let too_many: Vec<_> = (0..MAX_MESSAGES + 1).map(|_| ChatMessage::user("x")).collect();
        assert!(validate_messages(&too_many).is_err());
    }

    #[test]
    fn test_messages_content_is_escaped() {
        let messages = vec![ChatMessage::user("<b>hi</b>")];
        let validated = validate_messages(&messages).unwrap();
        assert_eq!(validated[0].content, "&lt;b&gt;hi&lt;/b&gt;");
    }
}
