//! Process settings loaded from the environment.

use std::env;

/// Development-only JWT secret. Production deployments must set
/// `WEB_SERVER_JWT_SECRET`; startup logs a warning when they have not.
pub const DEV_JWT_SECRET: &str = "your-secret-key-change-in-production";

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Settings for the web-facing gateway process.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub redis_url: String,
    pub key_server_socket: String,
    pub provider_config_file: String,
    pub jwt_secret: String,
    pub cors_origins: String,
    pub session_ttl_secs: u64,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let jwt_secret = env_or("WEB_SERVER_JWT_SECRET", DEV_JWT_SECRET);
        if jwt_secret == DEV_JWT_SECRET {
            tracing::warn!("WEB_SERVER_JWT_SECRET not set, using the development secret");
        }
        Self {
            host: env_or("WEB_SERVER_HOST", "0.0.0.0"),
            port: env_or("WEB_SERVER_PORT", "8000").parse().unwrap_or(8000),
            workers: env_or("WORKERS", "1").parse().unwrap_or(1),
            redis_url: env_or("WEB_SERVER_REDIS_URL", "redis://localhost:6379/0"),
            key_server_socket: env_or("KEY_SERVER_SOCKET", "/tmp/keyserver.sock"),
            provider_config_file: env_or("PROVIDER_CONFIG_FILE", "providers.yaml"),
            jwt_secret,
            cors_origins: env_or("CORS_ORIGINS", "*"),
            session_ttl_secs: vg_types::SESSION_TTL_SECS,
        }
    }

    /// CORS origins as a list; `*` means any.
    pub fn cors_origins(&self) -> Vec<String> {
        if self.cors_origins == "*" {
            vec!["*".to_string()]
        } else {
            self.cors_origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect()
        }
    }
}

/// Settings for the key allocator process.
#[derive(Debug, Clone)]
pub struct KeyServerSettings {
    pub socket_path: String,
    pub redis_url: String,
    pub key_config_file: String,
    pub vault_addr: String,
    pub vault_token: Option<String>,
}

impl KeyServerSettings {
    pub fn from_env() -> Self {
        Self {
            socket_path: env_or("KEY_SERVER_SOCKET", "/tmp/keyserver.sock"),
            redis_url: env_or("KEY_SERVER_REDIS_URL", "redis://localhost:6379/1"),
            key_config_file: env_or("KEY_CONFIG_FILE", "api_keys.csv"),
            vault_addr: env_or("VAULT_ADDR", "http://localhost:8200"),
            vault_token: env::var("VAULT_TOKEN").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_server_settings_defaults() {
        std::env::remove_var("WEB_SERVER_PORT");
        std::env::remove_var("WEB_SERVER_REDIS_URL");
        std::env::remove_var("CORS_ORIGINS");
        let settings = ServerSettings::from_env();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.redis_url, "redis://localhost:6379/0");
        assert_eq!(settings.cors_origins(), vec!["*"]);
    }

    #[test]
    #[serial]
    fn test_server_settings_overrides() {
        std::env::set_var("WEB_SERVER_PORT", "9001");
        std::env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        let settings = ServerSettings::from_env();
        assert_eq!(settings.port, 9001);
        assert_eq!(
            settings.cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        std::env::remove_var("WEB_SERVER_PORT");
        std::env::remove_var("CORS_ORIGINS");
    }

    #[test]
    #[serial]
    fn test_key_server_settings_defaults() {
        std::env::remove_var("KEY_SERVER_SOCKET");
        std::env::remove_var("KEY_SERVER_REDIS_URL");
        let settings = KeyServerSettings::from_env();
        assert_eq!(settings.socket_path, "/tmp/keyserver.sock");
        assert_eq!(settings.redis_url, "redis://localhost:6379/1");
        assert_eq!(settings.key_config_file, "api_keys.csv");
    }
}
