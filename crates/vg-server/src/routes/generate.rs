//! Web API generation endpoint.
//!
//! Drives the full privacy pipeline against the session's bound endpoint.
//! Streaming mode narrates each privacy stage to the UI with typed status
//! chunks; stateless turns finish with single-turn completion and an
//! `endpoints_refreshed` (or `session_disconnected`) notice.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::json;

use vg_router::{RouteRequest, SendOutcome};
use vg_session::SessionCheck;
use vg_types::errors::GatewayError;
use vg_types::records::SessionRecord;
use vg_types::validate::{
    validate_content, validate_endpoint_id, validate_session_id, validate_user_id,
};
use vg_types::{ChatMessage, SESSION_TTL_SECS};

use crate::error::ApiResult;
use crate::routes::core::DECOY_COUNT;
use crate::routes::helpers::{content_chunk, done_event, event_json, status_chunk};
use crate::state::AppState;
use crate::types::{GenerateRequest, GenerateResponse};

/// POST /api/generate
pub async fn generate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(mut request): Json<GenerateRequest>,
) -> ApiResult<Response> {
    validate_session_id(&request.session_id)?;
    request.prompt = validate_content(&request.prompt, "prompt")?;
    if let Some(endpoint_id) = &request.endpoint_id {
        validate_endpoint_id(endpoint_id)?;
    }
    if let Some(user_id) = request.user_id {
        validate_user_id(user_id)?;
    }

    tracing::info!(
        session_id = %request.session_id,
        stateless = request.stateless,
        pii = request.pii_removal,
        obfuscate = request.obfuscate,
        decoy = request.decoy,
        "web generate request"
    );

    let session = validate_session(&state, &request, &addr.ip().to_string()).await?;
    let Some(endpoint_id) = session.endpoint_id.clone() else {
        return Err(GatewayError::InvalidInput(
            "No endpoint connected. Please connect to an endpoint first.".to_string(),
        )
        .into());
    };

    if request.streaming {
        Ok(streaming_response(state, request, endpoint_id).into_response())
    } else {
        Ok(Json(non_streaming_response(state, request, endpoint_id).await?).into_response())
    }
}

/// Resolve the session, telling expired from never-existed when the caller
/// supplied its user id.
async fn validate_session(
    state: &AppState,
    request: &GenerateRequest,
    client_ip: &str,
) -> ApiResult<SessionRecord> {
    if let Some(record) = state.sessions.get_session(&request.session_id).await? {
        return Ok(record);
    }

    match request.user_id {
        Some(user_id) => {
            match state
                .sessions
                .check_session_status(&request.session_id, user_id, client_ip)
                .await?
            {
                SessionCheck::Active(record) => Ok(record),
                SessionCheck::Expired => Err(GatewayError::SessionExpired.into()),
                SessionCheck::Invalid => {
                    Err(GatewayError::SessionNotFound(request.session_id.clone()).into())
                }
            }
        }
        // Without a user id the history check is impossible; report expired
        // for the friendlier recovery path.
        None => Err(GatewayError::SessionExpired.into()),
    }
}

async fn non_streaming_response(
    state: AppState,
    request: GenerateRequest,
    endpoint_id: String,
) -> ApiResult<GenerateResponse> {
    let messages = vec![ChatMessage::user(request.prompt.clone())];
    let (processed, metadata) = state
        .privacy
        .process_request(
            &messages,
            request.pii_removal,
            request.obfuscate,
            request.decoy,
            request.stateless,
            Some(&request.session_id),
        )
        .await;

    let decoy_prompts = if state.privacy.should_generate_decoys(
        &metadata.original_messages,
        metadata.decoy_requested,
        request.stateless,
    ) {
        state
            .privacy
            .generate_decoy_queries(&metadata.original_messages, DECOY_COUNT)
    } else {
        Vec::new()
    };

    let result = state
        .router
        .route_query(RouteRequest {
            user_id: request.user_id.unwrap_or(0),
            prompt: vg_types::flatten_messages(&processed),
            streaming: false,
            stateless: request.stateless,
            endpoint_id: Some(endpoint_id),
            models: Vec::new(),
            ttl_secs: SESSION_TTL_SECS,
            decoy_prompts,
        })
        .await?;

    let completion = crate::routes::core::drain_outcome(result.outcome).await?;
    let content = state.privacy.process_response(
        &completion.content,
        request.obfuscate,
        Some(&request.session_id),
    );

    let mut response = GenerateResponse {
        content,
        provider: result.endpoint.provider,
        model: result.endpoint.model,
        usage: Some(completion.usage),
        new_endpoints: None,
        session_disconnected: None,
        message: None,
        temporal_mixing: result.temporal_mixing.map(Into::into),
    };

    if request.stateless {
        match state.turns.complete_single_turn(&request.session_id).await {
            Ok(outcome) => {
                response.new_endpoints = Some(outcome.new_endpoints);
                response.message = Some(outcome.message);
            }
            Err(e) => {
                tracing::warn!(session_id = %request.session_id, "single-turn completion failed: {e}");
                response.message = Some(format!("Single-turn completion failed: {e}"));
            }
        }
        response.session_disconnected = Some(true);
    }

    Ok(response)
}

/// Streaming mode: privacy stages narrate as status chunks, content flows
/// as it arrives, and stateless turns end with an endpoint refresh notice.
fn streaming_response(state: AppState, request: GenerateRequest, endpoint_id: String) -> Response {
    let stream = async_stream::stream! {
        let session_id = request.session_id.clone();
        let messages = vec![ChatMessage::user(request.prompt.clone())];

        // Privacy pipeline, narrated stage by stage.
        if request.pii_removal {
            yield Ok::<_, std::convert::Infallible>(event_json(&status_chunk(
                "pii", "Analyzing query for personal information...", "processing")));
        }
        let (processed, metadata) = state.privacy.process_request(
            &messages,
            request.pii_removal,
            request.obfuscate,
            request.decoy,
            request.stateless,
            Some(&session_id),
        ).await;
        if request.pii_removal {
            let message = if metadata.pii_detected {
                "Personal information removed from query"
            } else {
                "No personal information detected"
            };
            yield Ok(event_json(&status_chunk("pii", message, "completed")));
        }
        if request.obfuscate {
            yield Ok(event_json(&status_chunk(
                "obfuscation", "Query obfuscated for privacy", "completed")));
        }

        let mut decoy_prompts = Vec::new();
        if request.decoy && request.stateless {
            yield Ok(event_json(&status_chunk(
                "decoy", "Generating decoy queries for temporal mixing...", "processing")));
            if state.privacy.should_generate_decoys(
                &metadata.original_messages, metadata.decoy_requested, request.stateless)
            {
                decoy_prompts = state
                    .privacy
                    .generate_decoy_queries(&metadata.original_messages, DECOY_COUNT);
                yield Ok(event_json(&status_chunk(
                    "decoy",
                    &format!("Generated {} decoy queries", decoy_prompts.len()),
                    "completed",
                )));
            } else {
                yield Ok(event_json(&status_chunk(
                    "decoy", "Skipping decoy generation (not beneficial)", "completed")));
            }
        }

        if !decoy_prompts.is_empty() {
            yield Ok(event_json(&status_chunk(
                "temporal_mixing",
                &format!("Executing {} decoy queries in parallel...", decoy_prompts.len()),
                "processing",
            )));
        }
        yield Ok(event_json(&status_chunk("processing", "Executing query...", "processing")));

        let result = state.router.route_query(RouteRequest {
            user_id: request.user_id.unwrap_or(0),
            prompt: vg_types::flatten_messages(&processed),
            streaming: true,
            stateless: request.stateless,
            endpoint_id: Some(endpoint_id),
            models: Vec::new(),
            ttl_secs: SESSION_TTL_SECS,
            decoy_prompts,
        }).await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                yield Ok(event_json(&json!({"error": e.to_string(), "type": "error"})));
                yield Ok(done_event());
                return;
            }
        };

        if result.temporal_mixing.is_some() {
            yield Ok(event_json(&status_chunk(
                "temporal_mixing", "Decoy queries running in background...", "completed")));
        }
        yield Ok(event_json(&json!({
            "type": "response_starting",
            "message": "Response incoming...",
        })));

        let provider = result.endpoint.provider.clone();
        let model = result.endpoint.model.clone();

        match result.outcome {
            SendOutcome::Streaming(mut chunks) => {
                if request.obfuscate {
                    // Thinking mode: raw chunks first, then the clean
                    // deobfuscated response in one piece.
                    yield Ok(event_json(&json!({
                        "type": "thinking", "stage": "start",
                        "message": "Processing raw response:",
                    })));
                    let mut raw = String::new();
                    while let Some(chunk) = chunks.next().await {
                        match chunk {
                            Ok(chunk) => {
                                if let Some(text) = chunk.content {
                                    raw.push_str(&text);
                                    yield Ok(event_json(&content_chunk(&text, &provider, &model, "thinking_chunk")));
                                }
                            }
                            Err(e) => {
                                yield Ok(event_json(&json!({
                                    "error": format!("Stream processing error: {e}"),
                                    "type": "error",
                                })));
                                break;
                            }
                        }
                    }
                    yield Ok(event_json(&json!({
                        "type": "thinking", "stage": "deobfuscating",
                        "message": "Deobfuscating response for clarity...",
                    })));
                    let clean = state.privacy.process_response(&raw, true, Some(&session_id));
                    yield Ok(event_json(&content_chunk(&clean, &provider, &model, "response")));
                } else {
                    while let Some(chunk) = chunks.next().await {
                        match chunk {
                            Ok(chunk) => {
                                if let Some(text) = chunk.content {
                                    yield Ok(event_json(&content_chunk(&text, &provider, &model, "response_chunk")));
                                }
                            }
                            Err(e) => {
                                yield Ok(event_json(&json!({
                                    "error": format!("Stream processing error: {e}"),
                                    "type": "error",
                                })));
                                break;
                            }
                        }
                    }
                }
            }
            SendOutcome::Complete(completion) => {
                let content = state.privacy.process_response(
                    &completion.content, request.obfuscate, Some(&session_id));
                yield Ok(event_json(&content_chunk(&content, &provider, &model, "response")));
            }
        }

        // Single-turn reset: the endpoint just used must never serve again.
        if request.stateless {
            match state.turns.complete_single_turn(&session_id).await {
                Ok(outcome) => {
                    if outcome.new_endpoints.is_empty() && outcome.auto_selected.is_none() {
                        yield Ok(event_json(&json!({
                            "type": "session_disconnected",
                            "message": outcome.message,
                        })));
                    } else {
                        yield Ok(event_json(&json!({
                            "type": "endpoints_refreshed",
                            "new_endpoints": outcome.new_endpoints,
                            "auto_selected": outcome.auto_selected.map(|chosen| json!({
                                "provider": chosen.provider,
                                "model": chosen.model,
                                "endpoint_id": chosen.endpoint_id,
                                "api_key_hash": chosen.api_key_hash,
                            })),
                            "message": outcome.message,
                        })));
                    }
                }
                Err(e) => {
                    yield Ok(event_json(&json!({
                        "type": "endpoints_refresh_error",
                        "message": e.to_string(),
                    })));
                }
            }
        }

        yield Ok(done_event());
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
