//! Key allocator process entry point.

use std::path::Path;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

use vg_config::KeyServerSettings;
use vg_keyrpc::pb::key_server_server::KeyServerServer;
use vg_keyserver::{KeyManager, KeyServerService};
use vg_secrets::{MemorySecretStore, SecretStore, VaultKv2Store};
use vg_store::CounterStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = KeyServerSettings::from_env();
    tracing::info!(socket = %settings.socket_path, "starting key allocator");

    let store = CounterStore::connect(&settings.redis_url).await?;

    let secrets: Arc<dyn SecretStore> = match &settings.vault_token {
        Some(token) => Arc::new(VaultKv2Store::new(settings.vault_addr.clone(), token.clone())?),
        None => {
            tracing::warn!("VAULT_TOKEN not set, falling back to the in-memory secret store");
            Arc::new(MemorySecretStore::new())
        }
    };

    let manager = Arc::new(KeyManager::new(store, secrets));

    if Path::new(&settings.key_config_file).exists() {
        let pools = manager.ingest_keys_from_file(&settings.key_config_file).await?;
        tracing::info!(file = %settings.key_config_file, pools = pools.len(), "loaded key config");
    } else {
        tracing::warn!(file = %settings.key_config_file, "key config file not found, starting with empty pools");
    }

    // A stale socket from a previous run would fail the bind.
    if Path::new(&settings.socket_path).exists() {
        std::fs::remove_file(&settings.socket_path)?;
    }
    let listener = UnixListener::bind(&settings.socket_path)?;
    tracing::info!(socket = %settings.socket_path, "key allocator listening");

    let service = KeyServerService::new(manager);
    let socket_path = settings.socket_path.clone();

    Server::builder()
        .add_service(KeyServerServer::new(service))
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}
