//! Secret store access.
//!
//! Key material lives only behind the [`SecretStore`] trait: the allocator
//! writes secrets on ingestion and reads them at selection time, and nothing
//! else in the system ever sees them at rest. The production backend is
//! Vault KV v2; the in-memory store backs tests and single-node development.

pub mod memory;
pub mod vault;

use async_trait::async_trait;

use vg_types::errors::GatewayResult;

pub use memory::MemorySecretStore;
pub use vault::VaultKv2Store;

/// Opaque key-value secret retrieval. Paths are slash-separated, the stored
/// value is the provider API key.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read(&self, path: &str) -> GatewayResult<String>;
    async fn write(&self, path: &str, api_key: &str) -> GatewayResult<()>;
    async fn delete(&self, path: &str) -> GatewayResult<()>;
}

/// Canonical secret path for a pool key: `llm/<provider>/<model>/<key_id>`.
pub fn key_secret_path(provider: &str, model: &str, key_id: &str) -> String {
    format!("llm/{provider}/{model}/{key_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_secret_path() {
        assert_eq!(
            key_secret_path("OpenAI", "gpt-4o", "1234"),
            "llm/OpenAI/gpt-4o/1234"
        );
    }
}
