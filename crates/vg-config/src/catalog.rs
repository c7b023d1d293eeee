//! Provider catalog loaded from `providers.yaml`.
//!
//! Format: a map of provider name to a list of models; each list entry is
//! either a bare model id or `{tag: "model-id"}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use vg_types::errors::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ModelEntry {
    Tagged { tag: String },
    Bare(String),
}

impl ModelEntry {
    fn tag(&self) -> &str {
        match self {
            ModelEntry::Tagged { tag } => tag,
            ModelEntry::Bare(tag) => tag,
        }
    }
}

/// The set of (provider, model) pairs this deployment serves.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    providers: BTreeMap<String, Vec<String>>,
}

impl ProviderCatalog {
    pub fn from_yaml(yaml: &str) -> GatewayResult<Self> {
        let raw: BTreeMap<String, Vec<ModelEntry>> = serde_yaml::from_str(yaml)
            .map_err(|e| GatewayError::Config(format!("invalid provider catalog: {e}")))?;
        let providers = raw
            .into_iter()
            .map(|(provider, entries)| {
                let models = entries.iter().map(|entry| entry.tag().to_string()).collect();
                (provider, models)
            })
            .collect();
        Ok(Self { providers })
    }

    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let yaml = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "cannot read provider catalog {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn providers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.providers
    }

    /// Case-insensitive provider lookup; model tags are matched exactly.
    pub fn supports(&self, provider: &str, model: &str) -> bool {
        self.providers
            .iter()
            .any(|(name, models)| name.eq_ignore_ascii_case(provider) && models.iter().any(|m| m == model))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
OpenAI:
  - gpt-4o
  - tag: gpt-4o-mini
Anthropic:
  - claude-3-haiku-20240307
"#;

    #[test]
    fn test_parse_mixed_entry_shapes() {
        let catalog = ProviderCatalog::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            catalog.providers()["OpenAI"],
            vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]
        );
        assert_eq!(catalog.providers()["Anthropic"], vec!["claude-3-haiku-20240307"]);
    }

    #[test]
    fn test_supports_is_provider_case_insensitive() {
        let catalog = ProviderCatalog::from_yaml(SAMPLE).unwrap();
        assert!(catalog.supports("openai", "gpt-4o"));
        assert!(catalog.supports("OpenAI", "gpt-4o-mini"));
        assert!(!catalog.supports("openai", "gpt-4"));
        assert!(!catalog.supports("mistral", "large"));
    }

    #[test]
    fn test_invalid_yaml_is_a_config_error() {
        let err = ProviderCatalog::from_yaml(": not yaml [").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
