//! Shared application state.
//!
//! Request-scoped controllers receive their collaborators through this
//! state; process-wide mutability is confined to the connection pools the
//! individual clients manage internally.

use std::sync::Arc;

use vg_config::{ProviderCatalog, ServerSettings};
use vg_keyrpc::KeyClient;
use vg_privacy::PrivacyProcessor;
use vg_router::QueryRouter;
use vg_session::{SessionManager, TurnCompletionService};
use vg_store::CounterStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ServerSettings>,
    pub store: CounterStore,
    pub keys: Arc<KeyClient>,
    pub sessions: Arc<SessionManager>,
    pub router: Arc<QueryRouter>,
    pub privacy: Arc<PrivacyProcessor>,
    pub turns: Arc<TurnCompletionService>,
    pub providers: Arc<ProviderCatalog>,
}
