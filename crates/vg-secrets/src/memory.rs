//! In-memory secret store for tests and single-node development.

use async_trait::async_trait;
use dashmap::DashMap;

use vg_types::errors::{GatewayError, GatewayResult};

use crate::SecretStore;

#[derive(Default)]
pub struct MemorySecretStore {
    entries: DashMap<String, String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn read(&self, path: &str) -> GatewayResult<String> {
        self.entries
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::Secret(format!("secret not found at {path}")))
    }

    async fn write(&self, path: &str, api_key: &str) -> GatewayResult<()> {
        self.entries.insert(path.to_string(), api_key.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> GatewayResult<()> {
        self.entries.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemorySecretStore::new();
        store.write("llm/OpenAI/gpt-4o/k1", "sk-test").await.unwrap();
        assert_eq!(store.read("llm/OpenAI/gpt-4o/k1").await.unwrap(), "sk-test");
        store.delete("llm/OpenAI/gpt-4o/k1").await.unwrap();
        assert!(store.read("llm/OpenAI/gpt-4o/k1").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_secret_is_an_error() {
        let store = MemorySecretStore::new();
        let err = store.read("llm/none").await.unwrap_err();
        assert!(matches!(err, GatewayError::Secret(_)));
    }
}
