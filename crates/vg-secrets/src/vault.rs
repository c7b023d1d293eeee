//! Vault KV v2 client.
//!
//! Talks to the `secret/` mount over HTTP: `GET /v1/secret/data/<path>` to
//! read, `POST` the same path to write, `DELETE /v1/secret/metadata/<path>`
//! to remove a secret and its versions. Secret-store calls carry a 30 s
//! deadline.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use vg_types::errors::{GatewayError, GatewayResult};

use crate::SecretStore;

const SECRET_FIELD: &str = "api_key";
const VAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct VaultKv2Store {
    http: reqwest::Client,
    addr: String,
    token: String,
    mount: String,
}

#[derive(Deserialize)]
struct VaultReadResponse {
    data: VaultReadOuter,
}

#[derive(Deserialize)]
struct VaultReadOuter {
    data: serde_json::Map<String, serde_json::Value>,
}

impl VaultKv2Store {
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(VAULT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Secret(format!("failed to build vault client: {e}")))?;
        Ok(Self {
            http,
            addr: addr.into().trim_end_matches('/').to_string(),
            token: token.into(),
            mount: "secret".to_string(),
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/v1/{}/data/{}", self.addr, self.mount, path)
    }

    fn metadata_url(&self, path: &str) -> String {
        format!("{}/v1/{}/metadata/{}", self.addr, self.mount, path)
    }
}

#[async_trait]
impl SecretStore for VaultKv2Store {
    async fn read(&self, path: &str) -> GatewayResult<String> {
        let response = self
            .http
            .get(self.data_url(path))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| GatewayError::Secret(format!("vault read failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::Secret(format!("secret not found at {path}")));
        }
        if !response.status().is_success() {
            return Err(GatewayError::Secret(format!(
                "vault read returned status {}",
                response.status()
            )));
        }

        let body: VaultReadResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Secret(format!("invalid vault response: {e}")))?;
        body.data
            .data
            .get(SECRET_FIELD)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| GatewayError::Secret(format!("field '{SECRET_FIELD}' missing at {path}")))
    }

    async fn write(&self, path: &str, api_key: &str) -> GatewayResult<()> {
        let response = self
            .http
            .post(self.data_url(path))
            .header("X-Vault-Token", &self.token)
            .json(&json!({ "data": { SECRET_FIELD: api_key } }))
            .send()
            .await
            .map_err(|e| GatewayError::Secret(format!("vault write failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Secret(format!(
                "vault write returned status {}",
                response.status()
            )));
        }
        tracing::debug!(path, "wrote secret to vault");
        Ok(())
    }

    async fn delete(&self, path: &str) -> GatewayResult<()> {
        let response = self
            .http
            .delete(self.metadata_url(path))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| GatewayError::Secret(format!("vault delete failed: {e}")))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::Secret(format!(
                "vault delete returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let store = VaultKv2Store::new("http://localhost:8200/", "tok").unwrap();
        assert_eq!(
            store.data_url("llm/OpenAI/gpt-4o/k1"),
            "http://localhost:8200/v1/secret/data/llm/OpenAI/gpt-4o/k1"
        );
        assert_eq!(
            store.metadata_url("llm/OpenAI/gpt-4o/k1"),
            "http://localhost:8200/v1/secret/metadata/llm/OpenAI/gpt-4o/k1"
        );
    }
}
