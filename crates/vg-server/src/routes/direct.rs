//! Direct API v1: stateless and stateful queries plus one-shot session
//! creation. All endpoints sit behind bearer-JWT auth.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use vg_session::SessionCheck;
use vg_types::errors::GatewayError;
use vg_types::validate::{validate_messages, validate_models, validate_session_id, validate_user_id};

use crate::error::ApiResult;
use crate::middleware::auth::AuthContext;
use crate::routes::core::{format_query_response, run_query_core, CoreQuery};
use crate::routes::helpers::{completion_chunk, done_event, event_json};
use crate::state::AppState;
use crate::types::{
    CreateSessionRequest, CreateSessionResponse, StatefulQueryRequest, StatelessQueryRequest,
};

/// Model used when a stateful query auto-creates its session.
const DEFAULT_SESSION_MODEL: &str = "OpenAI/gpt-4o-mini";

/// POST /api/v1/create-session
///
/// Initialize, set models, verify candidates, and auto-select one endpoint
/// in a single call. The chosen model cannot be changed later.
pub async fn create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    validate_user_id(request.user_id)?;
    if request.models.is_empty() {
        return Err(GatewayError::InvalidInput("at least one model must be specified".into()).into());
    }
    validate_models(&request.models)?;

    let session_id = state.sessions.initialize_session(auth.user_id).await?;
    state
        .sessions
        .update_session_models(&session_id, request.models.clone())
        .await?;

    let endpoints = state.sessions.get_session_endpoints(&session_id).await?;
    if endpoints.is_empty() {
        // Nothing selectable: don't leave a dead session behind.
        state.sessions.end_session(&session_id).await?;
        return Err(GatewayError::InvalidInput(format!(
            "no endpoints available for the selected models: {:?}",
            request.models
        ))
        .into());
    }

    let chosen = state.sessions.choose_endpoint(&session_id, None).await?;
    tracing::info!(
        session_id,
        endpoint_id = %chosen.endpoint_id,
        "session created via direct API"
    );

    Ok(Json(CreateSessionResponse {
        session_id,
        endpoint_id: chosen.endpoint_id,
        message: format!(
            "Session created with {}/{} (randomly selected)",
            chosen.provider, chosen.model
        ),
        provider: chosen.provider,
        model: chosen.model,
        api_key_hash: chosen.api_key_hash,
        available_endpoints: endpoints.len(),
    }))
}

/// POST /api/v1/stateless-query
pub async fn stateless_query(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<StatelessQueryRequest>,
) -> ApiResult<Response> {
    let messages = validate_messages(&request.messages)?;
    let models = request.models.unwrap_or_default();
    if models.is_empty() {
        return Err(
            GatewayError::InvalidInput("models are required for stateless queries".into()).into(),
        );
    }
    validate_models(&models)?;

    let core = run_query_core(
        &state,
        auth.user_id,
        &messages,
        Some(models),
        request.pii_removal,
        request.obfuscate,
        request.decoy,
        true,
        None,
        None,
        request.stream,
    )
    .await?;

    if request.stream {
        Ok(query_sse_response(state, core).into_response())
    } else {
        Ok(Json(format_query_response(&state, core).await?).into_response())
    }
}

/// POST /api/v1/stateful-query
pub async fn stateful_query(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<StatefulQueryRequest>,
) -> ApiResult<Response> {
    let messages = validate_messages(&request.messages)?;
    if let Some(models) = &request.models {
        validate_models(models)?;
    }

    let session_id = match &request.session_id {
        Some(session_id) => {
            validate_session_id(session_id)?;
            match state
                .sessions
                .check_session_status(session_id, auth.user_id, &addr.ip().to_string())
                .await?
            {
                SessionCheck::Active(_) => session_id.clone(),
                SessionCheck::Expired => return Err(GatewayError::SessionExpired.into()),
                SessionCheck::Invalid => {
                    return Err(GatewayError::SessionNotFound(session_id.clone()).into())
                }
            }
        }
        None => auto_create_session(&state, auth.user_id, request.models.clone()).await?,
    };

    let endpoint_id = state
        .sessions
        .get_session(&session_id)
        .await?
        .and_then(|record| record.endpoint_id);

    let core = run_query_core(
        &state,
        auth.user_id,
        &messages,
        request.models,
        request.pii_removal,
        request.obfuscate,
        request.decoy,
        false,
        Some(session_id),
        endpoint_id,
        request.stream,
    )
    .await?;

    if request.stream {
        Ok(query_sse_response(state, core).into_response())
    } else {
        Ok(Json(format_query_response(&state, core).await?).into_response())
    }
}

/// Auto-create a session with a default model for session-less stateful
/// queries.
async fn auto_create_session(
    state: &AppState,
    user_id: i64,
    models: Option<Vec<String>>,
) -> ApiResult<String> {
    tracing::info!(user_id, "auto-creating session for stateful query");
    let session_id = state.sessions.initialize_session(user_id).await?;
    let models = models.unwrap_or_else(|| vec![DEFAULT_SESSION_MODEL.to_string()]);

    state
        .sessions
        .update_session_models(&session_id, models.clone())
        .await?;

    let endpoints = state.sessions.get_session_endpoints(&session_id).await?;
    if endpoints.is_empty() {
        state.sessions.end_session(&session_id).await?;
        return Err(GatewayError::InvalidInput(format!(
            "no endpoints available for default models: {models:?}"
        ))
        .into());
    }

    let chosen = state.sessions.choose_endpoint(&session_id, None).await?;
    tracing::info!(
        session_id,
        provider = %chosen.provider,
        model = %chosen.model,
        "auto-created session"
    );
    Ok(session_id)
}

/// Stream a finished core query as OpenAI-shaped SSE chunks.
fn query_sse_response(state: AppState, core: CoreQuery) -> Response {
    let CoreQuery {
        turn_id,
        result,
        obfuscate,
        session_id,
        ..
    } = core;
    let provider = result.endpoint.provider.clone();
    let model = result.endpoint.model.clone();
    let chunk_id = format!("chatcmpl-{turn_id}");

    let stream = async_stream::stream! {
        match drain_or_stream(result.outcome) {
            Ok(mut chunks) => {
                use futures::StreamExt;
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(chunk) => {
                            if let Some(text) = chunk.content {
                                let content = state.privacy.process_response(
                                    &text,
                                    obfuscate,
                                    session_id.as_deref(),
                                );
                                yield Ok::<_, std::convert::Infallible>(event_json(
                                    &completion_chunk(&chunk_id, &content, &provider, &model, None),
                                ));
                            }
                        }
                        Err(e) => {
                            tracing::error!("stream error: {e}");
                            yield Ok(event_json(&serde_json::json!({
                                "error": e.to_string(),
                                "type": "error",
                            })));
                            break;
                        }
                    }
                }
            }
            Err(completion) => {
                // The dispatcher produced a whole response; emit it as one
                // chunk so the framing stays identical.
                let content = state.privacy.process_response(
                    &completion.content,
                    obfuscate,
                    session_id.as_deref(),
                );
                yield Ok(event_json(&completion_chunk(&chunk_id, &content, &provider, &model, None)));
            }
        }

        yield Ok(event_json(&completion_chunk(&chunk_id, "", &provider, &model, Some("stop"))));
        yield Ok(done_event());
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn drain_or_stream(
    outcome: vg_router::SendOutcome,
) -> Result<vg_providers::ChunkStream, vg_providers::Completion> {
    match outcome {
        vg_router::SendOutcome::Streaming(stream) => Ok(stream),
        vg_router::SendOutcome::Complete(completion) => Err(completion),
    }
}
