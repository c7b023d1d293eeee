//! HTTP error mapping.
//!
//! Every gateway error carries its own default status; expired sessions
//! and endpoints share the retryable `session_expired` payload the
//! first-party client acts on. Internal details are logged, never
//! surfaced.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use vg_types::errors::GatewayError;

pub struct ApiError(pub GatewayError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self.0 {
            GatewayError::SessionExpired | GatewayError::EndpointExpired(_) => json!({
                "error": "session_expired",
                "message": "Session has expired. Please create a new session for better privacy.",
                "action": "create_new_session",
            }),
            GatewayError::SessionNotFound(_) => json!({
                "error": self.0.code(),
                "message": "Session not found",
            }),
            err if status.is_server_error() => {
                tracing::error!("request failed: {err}");
                json!({
                    "error": self.0.code(),
                    "message": match &self.0 {
                        GatewayError::NoKeys(_) => "No keys available for the requested models".to_string(),
                        GatewayError::Upstream(message) => message.clone(),
                        GatewayError::Unavailable(message) => message.clone(),
                        _ => "Internal server error".to_string(),
                    },
                })
            }
            err => json!({
                "error": self.0.code(),
                "message": err.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_session_payload() {
        let response = ApiError(GatewayError::SessionExpired).into_response();
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[test]
    fn test_invalid_input_is_400() {
        let response = ApiError(GatewayError::InvalidInput("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_no_keys_is_503() {
        let response = ApiError(GatewayError::NoKeys("m".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_upstream_is_502() {
        let response = ApiError(GatewayError::Upstream("provider said no".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
