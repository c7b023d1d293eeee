//! Query router
//!
//! The only component that contacts providers. Stateful requests resolve a
//! bound endpoint record; stateless requests select a key ad hoc through
//! the allocator, persist an ephemeral endpoint, and report the remaining
//! candidates back to the client. Dispatch itself — including temporal
//! mixing — lives in [`dispatch`].

pub mod dispatch;

use std::sync::Arc;

use vg_keyrpc::KeyClient;
use vg_providers::DriverCatalog;
use vg_store::CounterStore;
use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::records::{EndpointRecord, KeyLease, KeyStatus};
use vg_types::STATELESS_ENDPOINT_TTL_SECS;
use vg_utils::{generate_endpoint_id, secure_choice, unix_now};

pub use dispatch::{Dispatcher, SendOutcome, TemporalMixing};

/// A routing request, assembled by the edge after privacy processing.
pub struct RouteRequest {
    pub user_id: i64,
    pub prompt: String,
    pub streaming: bool,
    pub stateless: bool,
    /// Bound endpoint for stateful continuity; absent means ad-hoc
    /// selection from `models`.
    pub endpoint_id: Option<String>,
    pub models: Vec<String>,
    /// Lifetime of an ad-hoc endpoint record.
    pub ttl_secs: u64,
    pub decoy_prompts: Vec<String>,
}

impl RouteRequest {
    pub fn stateless(user_id: i64, prompt: String, models: Vec<String>) -> Self {
        Self {
            user_id,
            prompt,
            streaming: false,
            stateless: true,
            endpoint_id: None,
            models,
            ttl_secs: STATELESS_ENDPOINT_TTL_SECS,
            decoy_prompts: Vec::new(),
        }
    }
}

/// Identity of the endpoint a request went through.
#[derive(Debug, Clone)]
pub struct EndpointSummary {
    pub endpoint_id: String,
    pub provider: String,
    pub model: String,
    pub stateless: bool,
}

/// Alternative endpoint offered alongside an ad-hoc selection so the client
/// can update its picker.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlternativeEndpoint {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub status: String,
    pub tokens_hour: u64,
    pub tokens_total: u64,
}

pub struct RouteResult {
    pub outcome: SendOutcome,
    pub endpoint: EndpointSummary,
    pub alternatives: Option<Vec<AlternativeEndpoint>>,
    pub temporal_mixing: Option<TemporalMixing>,
}

pub struct QueryRouter {
    store: CounterStore,
    keys: Arc<KeyClient>,
    catalog: Arc<DriverCatalog>,
    dispatcher: Dispatcher,
}

impl QueryRouter {
    pub fn new(store: CounterStore, keys: Arc<KeyClient>, catalog: Arc<DriverCatalog>) -> Self {
        tracing::info!("query router initialized");
        let dispatcher = Dispatcher::new(catalog.clone());
        Self {
            store,
            keys,
            catalog,
            dispatcher,
        }
    }

    pub async fn route_query(&self, request: RouteRequest) -> GatewayResult<RouteResult> {
        match request.endpoint_id.clone() {
            Some(endpoint_id) => {
                tracing::info!(
                    user_id = request.user_id,
                    endpoint_id,
                    "routing query over bound endpoint"
                );
                self.route_with_endpoint(&endpoint_id, request).await
            }
            None => {
                if request.models.is_empty() {
                    return Err(GatewayError::InvalidInput(
                        "models list is required when no endpoint is given".to_string(),
                    ));
                }
                tracing::info!(
                    user_id = request.user_id,
                    models = ?request.models,
                    "routing query with auto-selection"
                );
                self.route_with_auto_selection(request).await
            }
        }
    }

    async fn route_with_endpoint(
        &self,
        endpoint_id: &str,
        request: RouteRequest,
    ) -> GatewayResult<RouteResult> {
        let endpoint = self
            .store
            .get_endpoint(endpoint_id)
            .await?
            .ok_or_else(|| GatewayError::EndpointExpired(endpoint_id.to_string()))?;

        let driver = self
            .catalog
            .create(&endpoint.provider, &endpoint.model, &endpoint.api_key)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let (outcome, temporal_mixing) = self
            .dispatcher
            .send(driver, &request.prompt, request.streaming, &request.decoy_prompts)
            .await?;

        Ok(RouteResult {
            outcome,
            endpoint: EndpointSummary {
                endpoint_id: endpoint_id.to_string(),
                provider: endpoint.provider,
                model: endpoint.model,
                stateless: request.stateless,
            },
            alternatives: None,
            temporal_mixing,
        })
    }

    async fn route_with_auto_selection(&self, request: RouteRequest) -> GatewayResult<RouteResult> {
        // Temporary session scope for the selection round; its weights
        // expire with the session TTL.
        let temp_session_id = format!("temp_{}_{}", request.user_id, unix_now());

        let leases = self
            .keys
            .select_keys_for_session(&temp_session_id, request.user_id, &request.models, 1)
            .await?;
        if leases.is_empty() {
            return Err(GatewayError::NoKeys(format!(
                "no endpoints available for models {:?}",
                request.models
            )));
        }

        let chosen = secure_choice(&leases).clone();
        let now = unix_now();
        let endpoint_id = generate_endpoint_id(
            &chosen.provider,
            &chosen.model,
            &chosen.key_id,
            Some(&temp_session_id),
            now,
            20,
        );

        let record = EndpointRecord {
            id: endpoint_id.clone(),
            provider: chosen.provider.clone(),
            model: chosen.model.clone(),
            api_key: chosen.api_key.clone(),
            tokens_hour: chosen.tokens_hour,
            tokens_total: chosen.tokens_total,
            status: chosen.status.clone(),
            session_id: temp_session_id.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.set_endpoint(&record, request.ttl_secs).await?;

        let driver = self
            .catalog
            .create(&chosen.provider, &chosen.model, &chosen.api_key)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let (outcome, temporal_mixing) = self
            .dispatcher
            .send(driver, &request.prompt, request.streaming, &request.decoy_prompts)
            .await?;

        let alternatives = leases
            .iter()
            .map(|lease| self.alternative_from_lease(lease, &temp_session_id, now))
            .collect();

        Ok(RouteResult {
            outcome,
            endpoint: EndpointSummary {
                endpoint_id,
                provider: chosen.provider,
                model: chosen.model,
                stateless: request.stateless,
            },
            alternatives: Some(alternatives),
            temporal_mixing,
        })
    }

    fn alternative_from_lease(
        &self,
        lease: &KeyLease,
        temp_session_id: &str,
        now: i64,
    ) -> AlternativeEndpoint {
        let id = generate_endpoint_id(
            &lease.provider,
            &lease.model,
            &lease.key_id,
            Some(temp_session_id),
            now,
            20,
        );
        AlternativeEndpoint {
            id,
            provider: lease.provider.clone(),
            model: lease.model.clone(),
            status: KeyStatus::from_hourly_tokens(lease.tokens_hour).to_string(),
            tokens_hour: lease.tokens_hour,
            tokens_total: lease.tokens_total,
        }
    }

    /// Shutdown: cancel background decoys and wait for them.
    pub async fn close(&self) {
        self.dispatcher.close().await;
        tracing::info!("query router closed");
    }
}
