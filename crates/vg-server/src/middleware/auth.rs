//! Bearer JWT authentication for the direct API.
//!
//! HS256 with the configured secret, `exp` enforced, `sub` coerced to an
//! integer user id. Missing or invalid tokens fail with 401; expiry is
//! distinguished so clients can refresh.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use vg_types::errors::GatewayError;
use vg_types::validate::validate_user_id;

use crate::error::ApiError;
use crate::state::AppState;

/// Identity extracted from a verified token, inserted into request
/// extensions for the handlers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: serde_json::Value,
    #[allow(dead_code)]
    exp: i64,
}

/// Verify a bearer token and extract the user id from its `sub` claim.
pub fn verify_token(token: &str, secret: &str) -> Result<i64, GatewayError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => GatewayError::TokenExpired,
            _ => GatewayError::Unauthenticated(format!("invalid token: {e}")),
        })?;

    // `sub` may arrive as a JSON number or a numeric string.
    let user_id = match &data.claims.sub {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        GatewayError::Unauthenticated("invalid token claims: user id must be a number".to_string())
    })?;

    validate_user_id(user_id)
        .map_err(|_| GatewayError::Unauthenticated("invalid token claims: user id out of range".to_string()))?;
    Ok(user_id)
}

pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok());

    let token = match header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return ApiError(GatewayError::Unauthenticated(
                "missing or malformed Authorization header".to_string(),
            ))
            .into_response()
        }
    };

    match verify_token(token, &state.settings.jwt_secret) {
        Ok(user_id) => {
            request.extensions_mut().insert(AuthContext { user_id });
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token_for(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_valid_token_with_numeric_sub() {
        let token = token_for(json!({"sub": 123, "exp": future_exp()}));
        assert_eq!(verify_token(&token, SECRET).unwrap(), 123);
    }

    #[test]
    fn test_valid_token_with_string_sub() {
        let token = token_for(json!({"sub": "456", "exp": future_exp()}));
        assert_eq!(verify_token(&token, SECRET).unwrap(), 456);
    }

    #[test]
    fn test_expired_token() {
        let token = token_for(json!({"sub": 123, "exp": chrono::Utc::now().timestamp() - 3600}));
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(GatewayError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = token_for(json!({"sub": 123, "exp": future_exp()}));
        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(GatewayError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_non_numeric_sub_rejected() {
        let token = token_for(json!({"sub": "alice", "exp": future_exp()}));
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(GatewayError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_out_of_range_sub_rejected() {
        let token = token_for(json!({"sub": 0, "exp": future_exp()}));
        assert!(verify_token(&token, SECRET).is_err());
        let token = token_for(json!({"sub": 1_000_000_000i64, "exp": future_exp()}));
        assert!(verify_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_token_without_exp_rejected() {
        let token = token_for(json!({"sub": 123}));
        assert!(verify_token(&token, SECRET).is_err());
    }
}
