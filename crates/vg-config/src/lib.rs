//! Configuration for both Veilgate processes.
//!
//! Environment-variable settings, the provider catalog (`providers.yaml`),
//! and API-key file ingestion (CSV or YAML).

pub mod catalog;
pub mod keys;
pub mod settings;

pub use catalog::ProviderCatalog;
pub use keys::{parse_key_file, KeyFileEntry};
pub use settings::{KeyServerSettings, ServerSettings};
