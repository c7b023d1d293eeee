//! API-key file ingestion.
//!
//! Two formats: CSV with a `provider,model,api_key` header, or YAML
//! `keys: [{provider, model, api_key}, ...]`. Rows with any empty field are
//! skipped, matching the tolerant ingestion the allocator exposes over
//! `ReloadKeys`.

use std::path::Path;

use serde::Deserialize;

use vg_types::errors::{GatewayError, GatewayResult};

/// One `(provider, model, secret)` triple from a key file.
///
/// `Debug` redacts the secret so ingestion can be traced safely.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct KeyFileEntry {
    pub provider: String,
    pub model: String,
    pub api_key: String,
}

impl std::fmt::Debug for KeyFileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFileEntry")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct YamlKeyFile {
    #[serde(default)]
    keys: Vec<KeyFileEntry>,
}

fn clean(entry: KeyFileEntry) -> Option<KeyFileEntry> {
    let provider = entry.provider.trim();
    let model = entry.model.trim();
    let api_key = entry.api_key.trim();
    if provider.is_empty() || model.is_empty() || api_key.is_empty() {
        return None;
    }
    Some(KeyFileEntry {
        provider: provider.to_string(),
        model: model.to_string(),
        api_key: api_key.to_string(),
    })
}

pub fn parse_csv_keys(data: &str) -> GatewayResult<Vec<KeyFileEntry>> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let mut entries = Vec::new();
    for row in reader.deserialize::<KeyFileEntry>() {
        let entry = row.map_err(|e| GatewayError::Config(format!("invalid key CSV: {e}")))?;
        if let Some(entry) = clean(entry) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

pub fn parse_yaml_keys(data: &str) -> GatewayResult<Vec<KeyFileEntry>> {
    let file: YamlKeyFile = serde_yaml::from_str(data)
        .map_err(|e| GatewayError::Config(format!("invalid key YAML: {e}")))?;
    Ok(file.keys.into_iter().filter_map(clean).collect())
}

/// Parse a key file, dispatching on the extension.
pub fn parse_key_file(path: impl AsRef<Path>) -> GatewayResult<Vec<KeyFileEntry>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("cannot read key file {}: {e}", path.display())))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => parse_csv_keys(&data),
        Some("yaml") | Some("yml") => parse_yaml_keys(&data),
        other => Err(GatewayError::Config(format!(
            "unsupported key file format: {:?}",
            other.unwrap_or("<none>")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let data = "provider,model,api_key\nOpenAI,gpt-4o,sk-one\nAnthropic,claude-3-haiku-20240307,sk-two\n";
        let entries = parse_csv_keys(data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].provider, "OpenAI");
        assert_eq!(entries[1].api_key, "sk-two");
    }

    #[test]
    fn test_parse_csv_skips_incomplete_rows() {
        let data = "provider,model,api_key\nOpenAI,,sk-one\nOpenAI,gpt-4o,sk-two\n";
        let entries = parse_csv_keys(data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].api_key, "sk-two");
    }

    #[test]
    fn test_parse_yaml() {
        let data = r#"
keys:
  - provider: OpenAI
    model: gpt-4o
    api_key: sk-one
  - provider: XAI
    model: grok-beta
    api_key: "  sk-two  "
"#;
        let entries = parse_yaml_keys(data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].api_key, "sk-two");
    }

    #[test]
    fn test_parse_yaml_without_keys_section() {
        let entries = parse_yaml_keys("{}").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_entry_debug_redacts_secret() {
        let entry = KeyFileEntry {
            provider: "OpenAI".into(),
            model: "gpt-4o".into(),
            api_key: "sk-very-secret".into(),
        };
        assert!(!format!("{entry:?}").contains("sk-very-secret"));
    }
}
