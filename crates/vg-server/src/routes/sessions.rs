//! Web API session lifecycle endpoints.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use vg_session::SessionCheck;
use vg_types::errors::GatewayError;
use vg_types::records::SessionRecord;
use vg_types::validate::{validate_endpoint_id, validate_models, validate_session_id, validate_user_id};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{
    ChooseEndpointRequest, ChooseEndpointResponse, ConnectResponse, EndpointsResponse,
    InitializeSessionRequest, InitializeSessionResponse, SessionInfoResponse, SessionRequest,
    UpdateSessionModelsRequest, UpdateSessionModelsResponse,
};

/// Active endpoint statuses counted for the endpoint list summary.
const ACTIVE_STATUSES: [&str; 3] = ["Available", "Standby", "Active"];

/// A missing session surfaces as expired: the record TTL is the common
/// cause and the client's recovery path is the same.
async fn session_or_expired(state: &AppState, session_id: &str) -> ApiResult<SessionRecord> {
    state
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(|| GatewayError::SessionExpired.into())
}

/// POST /api/initialize-session
pub async fn initialize_session(
    State(state): State<AppState>,
    Json(request): Json<InitializeSessionRequest>,
) -> ApiResult<(StatusCode, Json<InitializeSessionResponse>)> {
    validate_user_id(request.user_id)?;
    let session_id = state.sessions.initialize_session(request.user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(InitializeSessionResponse {
            session_id,
            message: "Session initialized successfully".to_string(),
        }),
    ))
}

/// PUT /api/session/models
pub async fn update_session_models(
    State(state): State<AppState>,
    Json(request): Json<UpdateSessionModelsRequest>,
) -> ApiResult<Json<UpdateSessionModelsResponse>> {
    validate_session_id(&request.session_id)?;
    if request.selected_models.is_empty() {
        return Err(GatewayError::InvalidInput("at least one model must be selected".into()).into());
    }
    validate_models(&request.selected_models)?;
    session_or_expired(&state, &request.session_id).await?;

    let (needs_disconnection, message) = state
        .sessions
        .update_session_models(&request.session_id, request.selected_models)
        .await?;
    let endpoints = state.sessions.get_session_endpoints(&request.session_id).await?;

    Ok(Json(UpdateSessionModelsResponse {
        session_id: request.session_id,
        needs_disconnection,
        message,
        available_endpoints: endpoints.len(),
    }))
}

/// GET /api/session/{session_id}/endpoints
pub async fn get_session_endpoints(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<EndpointsResponse>> {
    validate_session_id(&session_id)?;
    session_or_expired(&state, &session_id).await?;

    let endpoints = state.sessions.get_session_endpoints(&session_id).await?;
    let total_count = endpoints.len();
    let active_count = endpoints
        .iter()
        .filter(|endpoint| ACTIVE_STATUSES.contains(&endpoint.status.as_str()))
        .count();

    Ok(Json(EndpointsResponse {
        endpoints,
        total_count,
        active_count,
    }))
}

/// POST /api/session/{session_id}/choose-endpoint
///
/// Empty body picks a random candidate; `{"endpoint_id": "..."}` picks a
/// specific one.
pub async fn choose_endpoint(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    request: Option<Json<ChooseEndpointRequest>>,
) -> ApiResult<Json<ChooseEndpointResponse>> {
    validate_session_id(&session_id)?;
    session_or_expired(&state, &session_id).await?;

    let endpoint_id = request.and_then(|Json(body)| body.endpoint_id);
    if let Some(id) = &endpoint_id {
        validate_endpoint_id(id)?;
    }

    let chosen = state
        .sessions
        .choose_endpoint(&session_id, endpoint_id.as_deref())
        .await?;

    let mode = if endpoint_id.is_some() { "specific" } else { "random" };
    Ok(Json(ChooseEndpointResponse {
        session_id,
        message: format!("Selected {}:{} ({mode})", chosen.provider, chosen.model),
        selected_provider: chosen.provider,
        selected_model: chosen.model,
        endpoint_id: chosen.endpoint_id,
        api_key_hash: chosen.api_key_hash,
    }))
}

/// POST /api/connect
///
/// Connect the session to a random candidate, for clients that don't care
/// which endpoint they get.
pub async fn connect(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    validate_session_id(&request.session_id)?;
    session_or_expired(&state, &request.session_id).await?;

    let chosen = state.sessions.choose_endpoint(&request.session_id, None).await?;
    Ok(Json(ConnectResponse {
        session_id: request.session_id,
        connected: true,
        message: format!("Connected to random endpoint: {}/{}", chosen.provider, chosen.model),
        endpoint_id: chosen.endpoint_id,
        provider: chosen.provider,
        model: chosen.model,
        api_key_hash: chosen.api_key_hash,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionInfoQuery {
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// GET /api/session/{session_id}
///
/// With a `user_id` query parameter the 7-day history distinguishes an
/// expired session (410) from one that never existed for that user (404,
/// recorded as suspicious).
pub async fn session_info(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(session_id): Path<String>,
    Query(query): Query<SessionInfoQuery>,
) -> ApiResult<Json<SessionInfoResponse>> {
    validate_session_id(&session_id)?;

    let record = match state.sessions.get_session(&session_id).await? {
        Some(record) => record,
        None => match query.user_id {
            Some(user_id) => {
                validate_user_id(user_id)?;
                match state
                    .sessions
                    .check_session_status(&session_id, user_id, &addr.ip().to_string())
                    .await?
                {
                    SessionCheck::Active(record) => record,
                    SessionCheck::Expired => return Err(GatewayError::SessionExpired.into()),
                    SessionCheck::Invalid => {
                        return Err(GatewayError::SessionNotFound(session_id).into())
                    }
                }
            }
            None => return Err(GatewayError::SessionExpired.into()),
        },
    };

    let endpoint_info = match &record.endpoint_id {
        Some(endpoint_id) => state.store.get_endpoint(endpoint_id).await?.map(|endpoint| {
            json!({
                "endpoint_id": endpoint_id,
                "api_key_hash": record.api_key_hash,
                "status": endpoint.status,
                "usage_load": vg_types::records::usage_load(endpoint.tokens_hour),
            })
        }),
        None => None,
    };

    Ok(Json(SessionInfoResponse {
        session_id,
        provider: record.current_provider,
        model: record.current_model,
        endpoint_info,
    }))
}

/// POST /api/end-session
pub async fn end_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> ApiResult<StatusCode> {
    validate_session_id(&request.session_id)?;
    state.sessions.end_session(&request.session_id).await?;
    state.privacy.clear_session(&request.session_id);
    Ok(StatusCode::NO_CONTENT)
}
