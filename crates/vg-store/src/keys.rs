//! Counter-store key layout.
//!
//! Every namespaced key family lives here so the two processes cannot drift
//! apart on naming.

pub fn endpoint(endpoint_id: &str) -> String {
    format!("endpoint:{endpoint_id}")
}

pub fn session_state(session_id: &str) -> String {
    format!("session_state:{session_id}")
}

pub fn session_endpoints(session_id: &str) -> String {
    format!("session_endpoints:{session_id}")
}

pub fn key_pool(provider: &str, model: &str) -> String {
    format!("keys:{provider}:{model}")
}

pub const KEY_POOL_PATTERN: &str = "keys:*";

pub fn key_usage_hour(key_id: &str) -> String {
    format!("key_usage_hour:{key_id}")
}

pub fn key_usage_total(key_id: &str) -> String {
    format!("key_usage_total:{key_id}")
}

pub fn key_last_used(key_id: &str) -> String {
    format!("key_last_used:{key_id}")
}

pub fn session_key_weight(session_id: &str, key_id: &str) -> String {
    format!("session_key_weight:{session_id}:{key_id}")
}

pub fn session_key_weight_pattern(session_id: &str) -> String {
    format!("session_key_weight:{session_id}:*")
}

pub const SESSION_KEY_WEIGHT_PATTERN: &str = "session_key_weight:*";

pub fn user_sessions(user_id: i64) -> String {
    format!("user_sessions:{user_id}")
}

pub fn suspicious_activity(timestamp: &str, user_id: i64) -> String {
    format!("suspicious_activity:{timestamp}:{user_id}")
}

/// Split `keys:<provider>:<model>` back into its halves. Model tags may
/// themselves contain `:` so only the first two separators count.
pub fn parse_pool_key(key: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix("keys:")?;
    let (provider, model) = rest.split_once(':')?;
    if provider.is_empty() || model.is_empty() {
        return None;
    }
    Some((provider.to_string(), model.to_string()))
}

/// Extract the key id from `session_key_weight:<session>:<key>`.
pub fn parse_weight_key(key: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix("session_key_weight:")?;
    let (session_id, key_id) = rest.split_once(':')?;
    if session_id.is_empty() || key_id.is_empty() {
        return None;
    }
    Some((session_id.to_string(), key_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(endpoint("abc"), "endpoint:abc");
        assert_eq!(session_state("s1"), "session_state:s1");
        assert_eq!(key_pool("openai", "gpt-4o"), "keys:openai:gpt-4o");
        assert_eq!(session_key_weight("s1", "k1"), "session_key_weight:s1:k1");
        assert_eq!(user_sessions(42), "user_sessions:42");
    }

    #[test]
    fn test_parse_pool_key() {
        assert_eq!(
            parse_pool_key("keys:openai:gpt-4o"),
            Some(("openai".into(), "gpt-4o".into()))
        );
        // Model tags containing colons keep their tail intact.
        assert_eq!(
            parse_pool_key("keys:together:meta-llama:Llama-3-8b"),
            Some(("together".into(), "meta-llama:Llama-3-8b".into()))
        );
        assert_eq!(parse_pool_key("endpoint:abc"), None);
        assert_eq!(parse_pool_key("keys:broken"), None);
    }

    #[test]
    fn test_parse_weight_key() {
        assert_eq!(
            parse_weight_key("session_key_weight:s1:k1"),
            Some(("s1".into(), "k1".into()))
        );
        assert_eq!(parse_weight_key("session_key_weight:"), None);
        assert_eq!(parse_weight_key("other:s1:k1"), None);
    }
}
