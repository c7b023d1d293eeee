//! Web server process entry point.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use vg_config::{ProviderCatalog, ServerSettings};
use vg_keyrpc::KeyClient;
use vg_privacy::PrivacyProcessor;
use vg_providers::DriverCatalog;
use vg_router::QueryRouter;
use vg_server::state::AppState;
use vg_session::{SessionManager, TurnCompletionService};
use vg_store::CounterStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Arc::new(ServerSettings::from_env());
    tracing::info!(port = settings.port, "starting veilgate web server");

    let store = CounterStore::connect(&settings.redis_url).await?;
    let keys = Arc::new(KeyClient::new(settings.key_server_socket.clone()));
    let drivers = Arc::new(DriverCatalog::builtin());

    let providers = match ProviderCatalog::load(&settings.provider_config_file) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            tracing::warn!("provider catalog unavailable ({e}), continuing without one");
            Arc::new(ProviderCatalog::default())
        }
    };

    let sessions = Arc::new(SessionManager::new(store.clone(), keys.clone(), drivers.clone()));
    let router = Arc::new(QueryRouter::new(store.clone(), keys.clone(), drivers));
    let privacy = Arc::new(PrivacyProcessor::baseline());
    let turns = Arc::new(TurnCompletionService::new(sessions.clone()));

    let state = AppState {
        settings,
        store,
        keys,
        sessions,
        router,
        privacy,
        turns,
        providers,
    };

    vg_server::serve(state).await
}
