//! Health and provider-catalog endpoints.

use axum::extract::State;
use axum::Json;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{HealthResponse, ProvidersResponse};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let counter_store = state.store.ping().await.is_ok();
    let key_server = state.keys.health().await;
    let status = if counter_store && key_server {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        counter_store,
        key_server,
    })
}

/// GET /api/providers
pub async fn providers(State(state): State<AppState>) -> ApiResult<Json<ProvidersResponse>> {
    Ok(Json(ProvidersResponse {
        providers: state.providers.providers().clone(),
    }))
}
