//! Request and response bodies for both API families.

use serde::{Deserialize, Serialize};

use vg_router::TemporalMixing;
use vg_types::records::CandidateEndpoint;
use vg_types::{ChatMessage, TokenUsage};

// ==================== DIRECT API ====================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: i64,
    pub models: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub endpoint_id: String,
    pub provider: String,
    pub model: String,
    pub api_key_hash: String,
    pub message: String,
    pub available_endpoints: usize,
}

#[derive(Debug, Deserialize)]
pub struct StatelessQueryRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub pii_removal: bool,
    #[serde(default)]
    pub obfuscate: bool,
    #[serde(default)]
    pub decoy: bool,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatefulQueryRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub pii_removal: bool,
    #[serde(default)]
    pub obfuscate: bool,
    #[serde(default)]
    pub decoy: bool,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TemporalMixingMeta {
    pub active: bool,
    pub total_queries: usize,
}

impl From<TemporalMixing> for TemporalMixingMeta {
    fn from(mixing: TemporalMixing) -> Self {
        Self {
            active: mixing.active,
            total_queries: mixing.total_queries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryMetaData {
    pub endpoint_id: String,
    /// "provider/model".
    pub model: String,
    pub token_usage: TokenUsage,
    pub total_token_used: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_privacy_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_mixing: Option<TemporalMixingMeta>,
}

#[derive(Debug, Serialize)]
pub struct QueryChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub turn_id: String,
    pub choices: Vec<QueryChoice>,
    pub meta_data: QueryMetaData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// ==================== WEB API ====================

#[derive(Debug, Deserialize)]
pub struct InitializeSessionRequest {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct InitializeSessionResponse {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionModelsRequest {
    pub session_id: String,
    pub selected_models: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateSessionModelsResponse {
    pub session_id: String,
    pub needs_disconnection: bool,
    pub message: String,
    pub available_endpoints: usize,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct EndpointsResponse {
    pub endpoints: Vec<CandidateEndpoint>,
    pub total_count: usize,
    pub active_count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChooseEndpointRequest {
    #[serde(default)]
    pub endpoint_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChooseEndpointResponse {
    pub session_id: String,
    pub selected_provider: String,
    pub selected_model: String,
    pub endpoint_id: String,
    pub api_key_hash: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub session_id: String,
    pub connected: bool,
    pub endpoint_id: String,
    pub provider: String,
    pub model: String,
    pub api_key_hash: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_info: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub session_id: String,
    pub prompt: String,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub stateless: bool,
    #[serde(default)]
    pub endpoint_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub pii_removal: bool,
    #[serde(default)]
    pub obfuscate: bool,
    #[serde(default)]
    pub decoy: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_endpoints: Option<Vec<CandidateEndpoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_disconnected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_mixing: Option<TemporalMixingMeta>,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub counter_store: bool,
    pub key_server: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stateless_request_defaults() {
        let body: StatelessQueryRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"Hi"}],"models":["openai/gpt-4o"]}"#,
        )
        .unwrap();
        assert!(!body.pii_removal);
        assert!(!body.obfuscate);
        assert!(!body.decoy);
        assert!(!body.stream);
    }

    #[test]
    fn test_query_response_shape() {
        let response = QueryResponse {
            turn_id: "turn_abc".into(),
            choices: vec![QueryChoice {
                index: 0,
                message: ChatMessage::assistant("hello"),
                finish_reason: "stop".into(),
            }],
            meta_data: QueryMetaData {
                endpoint_id: "e".repeat(20),
                model: "openai/gpt-4o".into(),
                token_usage: TokenUsage::default(),
                total_token_used: 0,
                session_privacy_score: None,
                temporal_mixing: Some(TemporalMixingMeta {
                    active: true,
                    total_queries: 3,
                }),
            },
            session_id: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["meta_data"]["temporal_mixing"]["total_queries"], 3);
        // The mixing metadata must never expose a position.
        assert!(json["meta_data"]["temporal_mixing"].get("position").is_none());
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_generate_request_defaults() {
        let body: GenerateRequest =
            serde_json::from_str(r#"{"session_id":"s1","prompt":"Hi"}"#).unwrap();
        assert!(!body.streaming);
        assert!(!body.stateless);
        assert!(body.endpoint_id.is_none());
        assert!(body.user_id.is_none());
    }
}
