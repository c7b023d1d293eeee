//! Shared query pipeline for both API families: privacy rewrite, decoy
//! minting, routing, and response shaping.

use futures::StreamExt;
use uuid::Uuid;

use vg_providers::Completion;
use vg_router::{RouteRequest, RouteResult, SendOutcome};
use vg_types::errors::GatewayResult;
use vg_types::{flatten_messages, ChatMessage, SESSION_TTL_SECS, STATELESS_ENDPOINT_TTL_SECS};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{QueryChoice, QueryMetaData, QueryResponse};

/// Number of decoys minted per mixed query.
pub const DECOY_COUNT: usize = 2;

pub struct CoreQuery {
    pub turn_id: String,
    pub result: RouteResult,
    pub obfuscate: bool,
    pub pii_removal: bool,
    pub session_id: Option<String>,
    pub is_stateless: bool,
}

pub fn new_turn_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("turn_{}", &id[..12])
}

/// Run one query end to end: privacy rewrite, optional decoy generation,
/// then routing.
pub async fn run_query_core(
    state: &AppState,
    user_id: i64,
    messages: &[ChatMessage],
    models: Option<Vec<String>>,
    pii_removal: bool,
    obfuscate: bool,
    decoy: bool,
    is_stateless: bool,
    session_id: Option<String>,
    endpoint_id: Option<String>,
    streaming: bool,
) -> ApiResult<CoreQuery> {
    let turn_id = new_turn_id();
    tracing::info!(
        turn_id,
        user_id,
        stateless = is_stateless,
        streaming,
        "processing query"
    );

    let (processed, metadata) = state
        .privacy
        .process_request(
            messages,
            pii_removal,
            obfuscate,
            decoy,
            is_stateless,
            session_id.as_deref(),
        )
        .await;

    let decoy_prompts = if state
        .privacy
        .should_generate_decoys(&metadata.original_messages, metadata.decoy_requested, is_stateless)
    {
        let decoys = state
            .privacy
            .generate_decoy_queries(&metadata.original_messages, DECOY_COUNT);
        tracing::info!(turn_id, count = decoys.len(), "generated decoys for temporal mixing");
        decoys
    } else {
        Vec::new()
    };

    let request = RouteRequest {
        user_id,
        prompt: flatten_messages(&processed),
        streaming,
        stateless: is_stateless,
        endpoint_id,
        models: models.unwrap_or_default(),
        ttl_secs: if is_stateless {
            STATELESS_ENDPOINT_TTL_SECS
        } else {
            SESSION_TTL_SECS
        },
        decoy_prompts,
    };

    let result = state.router.route_query(request).await?;
    Ok(CoreQuery {
        turn_id,
        result,
        obfuscate,
        pii_removal,
        session_id,
        is_stateless,
    })
}

/// Fully drain a streaming outcome into a completion. Used when a caller
/// asked for a non-streaming answer but only a stream is at hand.
pub async fn drain_outcome(outcome: SendOutcome) -> GatewayResult<Completion> {
    match outcome {
        SendOutcome::Complete(completion) => Ok(completion),
        SendOutcome::Streaming(mut stream) => {
            let mut content = String::new();
            while let Some(chunk) = stream.next().await {
                if let Some(text) = chunk?.content {
                    content.push_str(&text);
                }
            }
            Ok(Completion {
                content,
                usage: Default::default(),
                raw: serde_json::Value::Null,
            })
        }
    }
}

/// Shape a finished core query as a direct-API response.
pub async fn format_query_response(state: &AppState, core: CoreQuery) -> ApiResult<QueryResponse> {
    let CoreQuery {
        turn_id,
        result,
        obfuscate,
        pii_removal,
        session_id,
        is_stateless,
    } = core;

    let completion = drain_outcome(result.outcome).await?;
    let content = state
        .privacy
        .process_response(&completion.content, obfuscate, session_id.as_deref());

    let session_privacy_score = (!is_stateless)
        .then(|| state.privacy.calculate_privacy_score(pii_removal, obfuscate, 1));

    Ok(QueryResponse {
        turn_id,
        choices: vec![QueryChoice {
            index: 0,
            message: ChatMessage::assistant(content),
            finish_reason: "stop".to_string(),
        }],
        meta_data: QueryMetaData {
            endpoint_id: result.endpoint.endpoint_id,
            model: format!("{}/{}", result.endpoint.provider, result.endpoint.model),
            total_token_used: completion.usage.total(),
            token_usage: completion.usage,
            session_privacy_score,
            temporal_mixing: result.temporal_mixing.map(Into::into),
        },
        session_id: (!is_stateless).then_some(session_id).flatten(),
    })
}
