//! Error types and conversions

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication failed: {0}")]
    Unauthenticated(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session has expired")]
    SessionExpired,

    #[error("Endpoint {0} has expired")]
    EndpointExpired(String),

    #[error("No keys available for {0}")]
    NoKeys(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Secret store error: {0}")]
    Secret(String),

    #[error("Key server error: {0}")]
    Rpc(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Default HTTP status for each error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidInput(_) => 400,
            GatewayError::Unauthenticated(_) | GatewayError::TokenExpired => 401,
            GatewayError::SessionNotFound(_) => 404,
            GatewayError::SessionExpired | GatewayError::EndpointExpired(_) => 410,
            GatewayError::RateLimited => 429,
            GatewayError::Upstream(_) => 502,
            GatewayError::NoKeys(_) | GatewayError::Unavailable(_) => 503,
            _ => 500,
        }
    }

    /// Stable machine-readable code used in error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidInput(_) => "invalid_input",
            GatewayError::Unauthenticated(_) => "unauthenticated",
            GatewayError::TokenExpired => "token_expired",
            GatewayError::SessionNotFound(_) => "session_not_found",
            GatewayError::SessionExpired => "session_expired",
            GatewayError::EndpointExpired(_) => "session_expired",
            GatewayError::NoKeys(_) => "no_keys",
            GatewayError::Upstream(_) => "upstream_failure",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Unavailable(_) => "service_unavailable",
            _ => "internal_error",
        }
    }
}

impl From<GatewayError> for String {
    fn from(err: GatewayError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(GatewayError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(GatewayError::Unauthenticated("x".into()).status_code(), 401);
        assert_eq!(GatewayError::TokenExpired.status_code(), 401);
        assert_eq!(GatewayError::SessionNotFound("s".into()).status_code(), 404);
        assert_eq!(GatewayError::SessionExpired.status_code(), 410);
        assert_eq!(GatewayError::EndpointExpired("e".into()).status_code(), 410);
        assert_eq!(GatewayError::RateLimited.status_code(), 429);
        assert_eq!(GatewayError::Upstream("x".into()).status_code(), 502);
        assert_eq!(GatewayError::NoKeys("m".into()).status_code(), 503);
        assert_eq!(GatewayError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_expired_variants_share_session_expired_code() {
        // Both map to the payload the client retries on.
        assert_eq!(GatewayError::SessionExpired.code(), "session_expired");
        assert_eq!(GatewayError::EndpointExpired("e".into()).code(), "session_expired");
    }
}
