//! Record types persisted in the counter store.
//!
//! Endpoint records carry the retrieved secret and therefore never leave the
//! server; candidate endpoints are the externally visible projection.

use serde::{Deserialize, Serialize};

/// Key status derived from the rolling hourly token counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    Available,
    Standby,
    Active,
    RateLimited,
}

impl KeyStatus {
    pub fn from_hourly_tokens(tokens_hour: u64) -> Self {
        if tokens_hour == 0 {
            KeyStatus::Available
        } else if tokens_hour < 1_000 {
            KeyStatus::Standby
        } else if tokens_hour < 5_000 {
            KeyStatus::Active
        } else {
            KeyStatus::RateLimited
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Available => "Available",
            KeyStatus::Standby => "Standby",
            KeyStatus::Active => "Active",
            KeyStatus::RateLimited => "RateLimited",
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load bucket shown to clients in candidate lists.
pub fn usage_load(tokens_hour: u64) -> &'static str {
    if tokens_hour == 0 {
        "idle"
    } else if tokens_hour < 1_000 {
        "light"
    } else if tokens_hour < 5_000 {
        "moderate"
    } else {
        "heavy"
    }
}

/// A key handed out by the allocator for one selection round.
///
/// Carries the secret; `Debug` redacts it so leases can be traced safely.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyLease {
    pub key_id: String,
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub tokens_hour: u64,
    pub tokens_total: u64,
    pub status: String,
}

impl std::fmt::Debug for KeyLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLease")
            .field("key_id", &self.key_id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("tokens_hour", &self.tokens_hour)
            .field("tokens_total", &self.tokens_total)
            .field("status", &self.status)
            .finish()
    }
}

/// Ephemeral view of a key bound into a session, stored under
/// `endpoint:<id>` with a 1 h TTL.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub tokens_hour: u64,
    pub tokens_total: u64,
    pub status: String,
    pub session_id: String,
    pub created_at: String,
}

impl std::fmt::Debug for EndpointRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRecord")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("status", &self.status)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Candidate endpoint presented to the client. No secret material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEndpoint {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub model_tag: String,
    pub models_accessible: String,
    pub usage_load: String,
    pub status: String,
    pub token_usage_hour: u64,
    pub token_usage_total: u64,
    pub api_key_hash: String,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Ended,
}

/// Session record stored under `session_state:<id>` with a 1 h TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: i64,
    #[serde(default)]
    pub selected_models: Vec<String>,
    #[serde(default)]
    pub current_provider: String,
    #[serde(default)]
    pub current_model: String,
    #[serde(default)]
    pub endpoint_id: Option<String>,
    #[serde(default)]
    pub api_key_hash: Option<String>,
    pub created_at: String,
    #[serde(default = "default_session_status")]
    pub status: SessionStatus,
}

fn default_session_status() -> SessionStatus {
    SessionStatus::Active
}

impl SessionRecord {
    /// Whether the session currently holds an endpoint binding.
    pub fn is_bound(&self) -> bool {
        !self.current_provider.is_empty()
            && !self.current_model.is_empty()
            && self.endpoint_id.is_some()
    }

    /// Drop the endpoint binding (single-turn reset, model change).
    pub fn clear_binding(&mut self) {
        self.current_provider.clear();
        self.current_model.clear();
        self.endpoint_id = None;
        self.api_key_hash = None;
    }
}

/// Rolling usage counters for one key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyUsage {
    pub tokens_hour: u64,
    pub tokens_total: u64,
    pub last_used: Option<i64>,
}

/// Record written when a client references a session id that never existed
/// for that user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousActivity {
    pub timestamp: String,
    pub user_id: i64,
    pub session_id: String,
    pub ip_address: String,
    pub activity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_status_thresholds() {
        assert_eq!(KeyStatus::from_hourly_tokens(0), KeyStatus::Available);
        assert_eq!(KeyStatus::from_hourly_tokens(1), KeyStatus::Standby);
        assert_eq!(KeyStatus::from_hourly_tokens(999), KeyStatus::Standby);
        assert_eq!(KeyStatus::from_hourly_tokens(1_000), KeyStatus::Active);
        assert_eq!(KeyStatus::from_hourly_tokens(4_999), KeyStatus::Active);
        assert_eq!(KeyStatus::from_hourly_tokens(5_000), KeyStatus::RateLimited);
    }

    #[test]
    fn test_usage_load_buckets() {
        assert_eq!(usage_load(0), "idle");
        assert_eq!(usage_load(500), "light");
        assert_eq!(usage_load(2_000), "moderate");
        assert_eq!(usage_load(10_000), "heavy");
    }

    #[test]
    fn test_lease_debug_redacts_secret() {
        let lease = KeyLease {
            key_id: "k1".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: "sk-super-secret".into(),
            tokens_hour: 0,
            tokens_total: 0,
            status: "Available".into(),
        };
        let rendered = format!("{lease:?}");
        assert!(!rendered.contains("sk-super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_endpoint_record_debug_redacts_secret() {
        let record = EndpointRecord {
            id: "abc".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: "sk-super-secret".into(),
            tokens_hour: 0,
            tokens_total: 0,
            status: "Available".into(),
            session_id: "s".into(),
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        assert!(!format!("{record:?}").contains("sk-super-secret"));
    }

    #[test]
    fn test_session_record_binding() {
        let mut record = SessionRecord {
            session_id: "s".into(),
            user_id: 1,
            selected_models: vec!["openai/gpt-4o".into()],
            current_provider: "openai".into(),
            current_model: "gpt-4o".into(),
            endpoint_id: Some("e".into()),
            api_key_hash: Some("h".into()),
            created_at: "2025-01-01T00:00:00Z".into(),
            status: SessionStatus::Active,
        };
        assert!(record.is_bound());
        record.clear_binding();
        assert!(!record.is_bound());
        assert!(record.endpoint_id.is_none());
        assert!(record.api_key_hash.is_none());
    }
}
