//! Session & endpoint management
//!
//! Sessions bind users to endpoints: model updates regenerate the candidate
//! list through the key allocator, choosing binds one endpoint into the
//! session, and single-turn completion tears the binding down and rebuilds
//! it so consecutive stateless turns never reuse an endpoint id.

pub mod turn;

use std::sync::Arc;

use uuid::Uuid;

use vg_keyrpc::KeyClient;
use vg_providers::{DriverCatalog, ProviderDriver};
use vg_store::CounterStore;
use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::records::{
    usage_load, CandidateEndpoint, EndpointRecord, KeyLease, SessionRecord, SessionStatus,
    SuspiciousActivity,
};
use vg_types::SESSION_TTL_SECS;
use vg_utils::{generate_endpoint_id, hour_bucket, secure_choice, session_key_hash, unix_now};

pub use turn::{TurnCompletionService, TurnOutcome};

/// Keys requested per model on a session model update; two gives the user
/// a choice without over-allocating.
const CANDIDATES_PER_MODEL: u32 = 2;

/// The endpoint a session ended up bound to.
#[derive(Debug, Clone)]
pub struct ChosenEndpoint {
    pub provider: String,
    pub model: String,
    pub endpoint_id: String,
    pub api_key_hash: String,
}

/// Outcome of a session status check.
#[derive(Debug)]
pub enum SessionCheck {
    Active(SessionRecord),
    /// The session existed for this user but its record is gone.
    Expired,
    /// The session id was never this user's — a security event.
    Invalid,
}

/// Whether a model update invalidates the current binding.
fn binding_invalidated(record: &SessionRecord, new_models: &[String]) -> bool {
    if !record.is_bound() {
        return false;
    }
    let current = format!("{}/{}", record.current_provider, record.current_model);
    !new_models.iter().any(|m| m == &current)
}

/// Externally visible candidate built from a key lease.
fn candidate_from_lease(lease: &KeyLease, endpoint_id: &str, api_key_hash: String) -> CandidateEndpoint {
    let short = &endpoint_id[..endpoint_id.len().min(8)];
    CandidateEndpoint {
        id: endpoint_id.to_string(),
        name: format!("endpoint-{short}"),
        provider: lease.provider.clone(),
        model_tag: lease.model.clone(),
        models_accessible: lease.model.clone(),
        usage_load: usage_load(lease.tokens_hour).to_string(),
        status: lease.status.clone(),
        token_usage_hour: lease.tokens_hour,
        token_usage_total: lease.tokens_total,
        api_key_hash,
    }
}

pub struct SessionManager {
    store: CounterStore,
    keys: Arc<KeyClient>,
    catalog: Arc<DriverCatalog>,
}

impl SessionManager {
    pub fn new(store: CounterStore, keys: Arc<KeyClient>, catalog: Arc<DriverCatalog>) -> Self {
        tracing::info!("session manager initialized");
        Self { store, keys, catalog }
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    // ==================== LIFECYCLE ====================

    /// Create an empty session: no models, no binding.
    pub async fn initialize_session(&self, user_id: i64) -> GatewayResult<String> {
        let session_id = Uuid::new_v4().to_string();
        let record = SessionRecord {
            session_id: session_id.clone(),
            user_id,
            selected_models: Vec::new(),
            current_provider: String::new(),
            current_model: String::new(),
            endpoint_id: None,
            api_key_hash: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            status: SessionStatus::Active,
        };
        self.store.set_session(&record).await?;
        self.store.track_user_session(user_id, &session_id).await?;
        tracing::info!(session_id, user_id, "initialized session");
        Ok(session_id)
    }

    /// Update the session's model list and regenerate its candidate set.
    ///
    /// Returns `(needs_disconnect, message)`; the binding is cleared when
    /// its (provider, model) fell out of the new selection.
    pub async fn update_session_models(
        &self,
        session_id: &str,
        new_models: Vec<String>,
    ) -> GatewayResult<(bool, String)> {
        let mut record = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))?;

        let mut needs_disconnect = binding_invalidated(&record, &new_models);
        if needs_disconnect {
            record.clear_binding();
            tracing::info!(session_id, "current endpoint removed from selection, disconnecting");
        }
        record.selected_models = new_models.clone();

        let leases = match self
            .keys
            .select_keys_for_session(session_id, record.user_id, &new_models, CANDIDATES_PER_MODEL)
            .await
        {
            Ok(leases) => leases,
            Err(GatewayError::NoKeys(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        if leases.is_empty() {
            needs_disconnect = true;
            record.clear_binding();
            tracing::warn!(session_id, "no endpoints available for new model selection");
        }

        self.store_candidates(session_id, &leases).await?;
        self.store.set_session(&record).await?;

        let message = if needs_disconnect && leases.is_empty() {
            "No endpoints available for selected models. Session disconnected.".to_string()
        } else if needs_disconnect {
            format!(
                "Current endpoint removed from selection. Session disconnected. {} new endpoints available.",
                leases.len()
            )
        } else {
            format!("Session models updated. {} endpoints available.", leases.len())
        };

        tracing::info!(
            session_id,
            models = new_models.len(),
            endpoints = leases.len(),
            "session models updated"
        );
        Ok((needs_disconnect, message))
    }

    /// Persist endpoint records (with secrets) and the externally visible
    /// candidate list (without).
    async fn store_candidates(&self, session_id: &str, leases: &[KeyLease]) -> GatewayResult<()> {
        let now = unix_now();
        let mut candidates = Vec::with_capacity(leases.len());

        for lease in leases {
            let endpoint_id = generate_endpoint_id(
                &lease.provider,
                &lease.model,
                &lease.key_id,
                Some(session_id),
                now,
                20,
            );
            let record = EndpointRecord {
                id: endpoint_id.clone(),
                provider: lease.provider.clone(),
                model: lease.model.clone(),
                api_key: lease.api_key.clone(),
                tokens_hour: lease.tokens_hour,
                tokens_total: lease.tokens_total,
                status: lease.status.clone(),
                session_id: session_id.to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            };
            self.store.set_endpoint(&record, SESSION_TTL_SECS).await?;

            let api_key_hash = session_key_hash(&lease.key_id, session_id, hour_bucket(now));
            candidates.push(candidate_from_lease(lease, &endpoint_id, api_key_hash));
        }

        self.store
            .set_session_endpoints(session_id, &candidates, SESSION_TTL_SECS)
            .await
    }

    pub async fn get_session_endpoints(
        &self,
        session_id: &str,
    ) -> GatewayResult<Vec<CandidateEndpoint>> {
        self.store.get_session_endpoints(session_id).await
    }

    /// Bind an endpoint into the session: the given one, or a uniformly
    /// random candidate when `endpoint_id` is absent.
    pub async fn choose_endpoint(
        &self,
        session_id: &str,
        endpoint_id: Option<&str>,
    ) -> GatewayResult<ChosenEndpoint> {
        let candidates = self.get_session_endpoints(session_id).await?;
        if candidates.is_empty() {
            return Err(GatewayError::Unavailable(format!(
                "no endpoints available for session {session_id}"
            )));
        }

        let candidate = match endpoint_id {
            Some(id) => candidates
                .iter()
                .find(|c| c.id == id)
                .ok_or_else(|| {
                    GatewayError::InvalidInput(format!(
                        "endpoint {id} not available for this session"
                    ))
                })?
                .clone(),
            None => secure_choice(&candidates).clone(),
        };

        let mut record = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))?;
        record.current_provider = candidate.provider.clone();
        record.current_model = candidate.model_tag.clone();
        record.endpoint_id = Some(candidate.id.clone());
        record.api_key_hash = Some(candidate.api_key_hash.clone());
        self.store.set_session(&record).await?;

        tracing::info!(
            session_id,
            endpoint_id = %candidate.id,
            provider = %candidate.provider,
            model = %candidate.model_tag,
            "session bound to endpoint"
        );
        Ok(ChosenEndpoint {
            provider: candidate.provider,
            model: candidate.model_tag,
            endpoint_id: candidate.id,
            api_key_hash: candidate.api_key_hash,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> GatewayResult<Option<SessionRecord>> {
        self.store.get_session(session_id).await
    }

    /// Distinguish a live session from an expired one from an id that never
    /// belonged to this user; the last case records a suspicious-access
    /// event with the client address.
    pub async fn check_session_status(
        &self,
        session_id: &str,
        user_id: i64,
        client_addr: &str,
    ) -> GatewayResult<SessionCheck> {
        if let Some(record) = self.store.get_session(session_id).await? {
            return Ok(SessionCheck::Active(record));
        }

        if self.store.was_user_session(user_id, session_id).await? {
            return Ok(SessionCheck::Expired);
        }

        let event = SuspiciousActivity {
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_id,
            session_id: session_id.to_string(),
            ip_address: client_addr.to_string(),
            activity: "invalid_session_access".to_string(),
        };
        if let Err(e) = self.store.record_suspicious_activity(&event).await {
            tracing::error!("failed to record suspicious activity: {e}");
        }
        Ok(SessionCheck::Invalid)
    }

    /// Materialize the driver for the session's bound endpoint.
    pub async fn bound_driver(
        &self,
        session_id: &str,
    ) -> GatewayResult<Option<Arc<dyn ProviderDriver>>> {
        let Some(record) = self.store.get_session(session_id).await? else {
            return Ok(None);
        };
        let Some(endpoint_id) = record.endpoint_id.as_deref() else {
            tracing::warn!(session_id, "session has no endpoint bound");
            return Ok(None);
        };
        let Some(endpoint) = self.store.get_endpoint(endpoint_id).await? else {
            return Err(GatewayError::EndpointExpired(endpoint_id.to_string()));
        };
        let driver = self
            .catalog
            .create(&endpoint.provider, &endpoint.model, &endpoint.api_key)?;
        Ok(Some(driver))
    }

    /// End a session: release its keys, delete its state, candidates, and
    /// endpoint records, and drop it from the user's history.
    pub async fn end_session(&self, session_id: &str) -> GatewayResult<()> {
        let record = self.store.get_session(session_id).await?;

        self.keys.release_session(session_id).await;

        for candidate in self.store.get_session_endpoints(session_id).await? {
            self.store.delete_endpoint(&candidate.id).await?;
        }
        self.store.delete_session_endpoints(session_id).await?;
        self.store.delete_session(session_id).await?;

        if let Some(record) = record {
            self.store
                .remove_user_session(record.user_id, session_id)
                .await?;
        }
        tracing::info!(session_id, "session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(provider: &str, model: &str) -> SessionRecord {
        SessionRecord {
            session_id: "s1".into(),
            user_id: 1,
            selected_models: vec![format!("{provider}/{model}")],
            current_provider: provider.into(),
            current_model: model.into(),
            endpoint_id: Some("e1".into()),
            api_key_hash: Some("h1".into()),
            created_at: "2025-01-01T00:00:00Z".into(),
            status: SessionStatus::Active,
        }
    }

    fn lease() -> KeyLease {
        KeyLease {
            key_id: "k1".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: "sk-secret".into(),
            tokens_hour: 120,
            tokens_total: 4_000,
            status: "Standby".into(),
        }
    }

    #[test]
    fn test_binding_survives_when_model_kept() {
        let record = session("openai", "gpt-4o");
        let models = vec!["openai/gpt-4o".to_string(), "anthropic/claude-3-haiku-20240307".to_string()];
        assert!(!binding_invalidated(&record, &models));
    }

    #[test]
    fn test_binding_invalidated_when_model_dropped() {
        let record = session("openai", "gpt-4o");
        let models = vec!["anthropic/claude-3-haiku-20240307".to_string()];
        assert!(binding_invalidated(&record, &models));
    }

    #[test]
    fn test_unbound_session_never_needs_disconnect() {
        let mut record = session("openai", "gpt-4o");
        record.clear_binding();
        assert!(!binding_invalidated(&record, &[]));
    }

    #[test]
    fn test_candidate_from_lease_carries_no_secret() {
        let candidate = candidate_from_lease(&lease(), "abcdef0123456789abcd", "hash24".into());
        assert_eq!(candidate.id, "abcdef0123456789abcd");
        assert_eq!(candidate.name, "endpoint-abcdef01");
        assert_eq!(candidate.usage_load, "light");
        assert_eq!(candidate.token_usage_hour, 120);
        let json = serde_json::to_string(&candidate).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
