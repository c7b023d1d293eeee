//! Single-turn completion.
//!
//! After a stateless dispatch the session's endpoint must not be reusable:
//! every candidate record is deleted, the binding is cleared, and — when the
//! session still has models selected — a fresh candidate set is generated
//! and one endpoint auto-selected so the next turn connects seamlessly.

use std::sync::Arc;

use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::records::CandidateEndpoint;

use crate::{ChosenEndpoint, SessionManager};

/// What a completed single turn left behind.
#[derive(Debug)]
pub struct TurnOutcome {
    pub new_endpoints: Vec<CandidateEndpoint>,
    pub auto_selected: Option<ChosenEndpoint>,
    pub message: String,
}

pub struct TurnCompletionService {
    sessions: Arc<SessionManager>,
}

impl TurnCompletionService {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    pub async fn complete_single_turn(&self, session_id: &str) -> GatewayResult<TurnOutcome> {
        tracing::info!(session_id, "starting single-turn completion");

        let mut record = self
            .sessions
            .store()
            .get_session(session_id)
            .await?
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))?;
        let models = record.selected_models.clone();

        // Invalidate every candidate endpoint, then the list itself.
        let candidates = self.sessions.store().get_session_endpoints(session_id).await?;
        for candidate in &candidates {
            self.sessions.store().delete_endpoint(&candidate.id).await?;
        }
        self.sessions.store().delete_session_endpoints(session_id).await?;
        tracing::debug!(session_id, invalidated = candidates.len(), "invalidated session endpoints");

        record.clear_binding();
        self.sessions.store().set_session(&record).await?;

        if models.is_empty() {
            return Ok(TurnOutcome {
                new_endpoints: Vec::new(),
                auto_selected: None,
                message: "Single-turn completed. No models selected for regeneration.".to_string(),
            });
        }

        // Regenerate with the same model list, then auto-connect.
        self.sessions.update_session_models(session_id, models).await?;
        let new_endpoints = self.sessions.get_session_endpoints(session_id).await?;

        let auto_selected = match self.sessions.choose_endpoint(session_id, None).await {
            Ok(chosen) => Some(chosen),
            Err(e) => {
                tracing::warn!(session_id, "auto-select after single turn failed: {e}");
                None
            }
        };

        let mut message = format!(
            "Single-turn completed. {} new endpoints available.",
            new_endpoints.len()
        );
        if let Some(chosen) = &auto_selected {
            message.push_str(&format!(
                " Auto-connected to {}:{}.",
                chosen.provider, chosen.model
            ));
        }

        tracing::info!(
            session_id,
            endpoints = new_endpoints.len(),
            auto_selected = auto_selected.is_some(),
            "single-turn completion finished"
        );
        Ok(TurnOutcome {
            new_endpoints,
            auto_selected,
            message,
        })
    }
}
