//! Driver catalog: the explicit provider → constructor map.
//!
//! Application startup builds the catalog and hands it to the router and
//! session manager; drivers never reach into shared state to register
//! themselves.

use std::collections::HashMap;
use std::sync::Arc;

use vg_types::errors::{GatewayError, GatewayResult};

use crate::anthropic::AnthropicDriver;
use crate::google::GoogleDriver;
use crate::openai_compatible::{
    OpenAiCompatibleDriver, DEEPSEEK_API_BASE, OPENAI_API_BASE, TOGETHER_API_BASE, XAI_API_BASE,
};
use crate::ProviderDriver;

type DriverCtor =
    Arc<dyn Fn(&str, &str) -> GatewayResult<Arc<dyn ProviderDriver>> + Send + Sync>;

/// Catalog of constructable drivers, keyed by lowercase provider name.
#[derive(Clone, Default)]
pub struct DriverCatalog {
    ctors: HashMap<String, DriverCtor>,
    aliases: HashMap<String, String>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in driver registered.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("openai", |model, api_key| {
            Ok(Arc::new(OpenAiCompatibleDriver::new("openai", OPENAI_API_BASE, model, api_key)?))
        });
        catalog.register("together", |model, api_key| {
            Ok(Arc::new(OpenAiCompatibleDriver::new("together", TOGETHER_API_BASE, model, api_key)?))
        });
        catalog.register("xai", |model, api_key| {
            Ok(Arc::new(OpenAiCompatibleDriver::new("xai", XAI_API_BASE, model, api_key)?))
        });
        catalog.register("deepseek", |model, api_key| {
            Ok(Arc::new(OpenAiCompatibleDriver::new("deepseek", DEEPSEEK_API_BASE, model, api_key)?))
        });
        catalog.register("anthropic", |model, api_key| {
            Ok(Arc::new(AnthropicDriver::new(model, api_key)?))
        });
        catalog.register("google", |model, api_key| {
            Ok(Arc::new(GoogleDriver::new(model, api_key)?))
        });
        catalog.register_alias("togetherai", "together");
        catalog.register_alias("gemini", "google");
        catalog
    }

    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&str, &str) -> GatewayResult<Arc<dyn ProviderDriver>> + Send + Sync + 'static,
    {
        self.ctors.insert(name.to_lowercase(), Arc::new(ctor));
    }

    pub fn register_alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_lowercase(), target.to_lowercase());
    }

    fn resolve(&self, provider: &str) -> Option<&DriverCtor> {
        let name = provider.to_lowercase();
        self.ctors
            .get(&name)
            .or_else(|| self.aliases.get(&name).and_then(|target| self.ctors.get(target)))
    }

    /// Instantiate a driver over `(provider, model, secret)`.
    pub fn create(
        &self,
        provider: &str,
        model: &str,
        api_key: &str,
    ) -> GatewayResult<Arc<dyn ProviderDriver>> {
        let ctor = self.resolve(provider).ok_or_else(|| {
            GatewayError::InvalidInput(format!(
                "unsupported provider '{provider}' (available: {})",
                self.provider_names().join(", ")
            ))
        })?;
        ctor(model, api_key)
    }

    pub fn is_supported(&self, provider: &str) -> bool {
        self.resolve(provider).is_some()
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ctors.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_creates_known_providers() {
        let catalog = DriverCatalog::builtin();
        for provider in ["openai", "anthropic", "google", "together", "xai", "deepseek"] {
            let driver = catalog.create(provider, "some-model", "sk-test").unwrap();
            assert_eq!(driver.provider(), provider);
            assert_eq!(driver.model(), "some-model");
            assert_eq!(driver.api_key(), "sk-test");
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = DriverCatalog::builtin();
        assert!(catalog.is_supported("OpenAI"));
        assert!(catalog.is_supported("ANTHROPIC"));
        let driver = catalog.create("OpenAI", "gpt-4o", "sk").unwrap();
        assert_eq!(driver.provider(), "openai");
    }

    #[test]
    fn test_aliases() {
        let catalog = DriverCatalog::builtin();
        assert_eq!(catalog.create("gemini", "gemini-1.5-pro", "k").unwrap().provider(), "google");
        assert_eq!(catalog.create("TogetherAI", "llama-3-8b", "k").unwrap().provider(), "together");
    }

    #[test]
    fn test_unknown_provider_is_invalid_input() {
        let catalog = DriverCatalog::builtin();
        let err = match catalog.create("mystery", "m", "k") {
            Err(e) => e,
            Ok(_) => panic!("expected create to fail for unknown provider"),
        };
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[test]
    fn test_instances_are_independent() {
        let catalog = DriverCatalog::builtin();
        let a = catalog.create("openai", "gpt-4o", "sk").unwrap();
        let b = catalog.create("openai", "gpt-4o", "sk").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
