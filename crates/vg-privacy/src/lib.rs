//! Privacy pipeline
//!
//! Pure orchestration around the router: PII scrub and obfuscation rewrite
//! the request on the way out, deobfuscation inverts the response on the
//! way back, and the decoy service mints the unrelated prompts the
//! temporal-mixing dispatcher sends alongside the real one. Nothing here
//! ever contacts a provider.

pub mod decoy;
pub mod obfuscate;
pub mod pii;

use std::sync::Arc;

use vg_types::ChatMessage;

pub use decoy::DecoyService;
pub use obfuscate::ObfuscationService;
pub use pii::{IdentityPiiScrubber, PiiScrubber};

/// What the request pass did, carried alongside the rewritten messages.
#[derive(Debug, Clone)]
pub struct PrivacyMetadata {
    pub pii_detected: bool,
    pub obfuscated: bool,
    pub decoy_requested: bool,
    /// Pristine input, kept for decoy generation so the generator never
    /// sees obfuscated text.
    pub original_messages: Vec<ChatMessage>,
}

pub struct PrivacyProcessor {
    pii: Arc<dyn PiiScrubber>,
    obfuscation: Arc<ObfuscationService>,
    decoys: Arc<DecoyService>,
}

impl PrivacyProcessor {
    pub fn new(
        pii: Arc<dyn PiiScrubber>,
        obfuscation: Arc<ObfuscationService>,
        decoys: Arc<DecoyService>,
    ) -> Self {
        Self {
            pii,
            obfuscation,
            decoys,
        }
    }

    /// Processor with the baseline (identity) services.
    pub fn baseline() -> Self {
        Self::new(
            Arc::new(IdentityPiiScrubber::new()),
            Arc::new(ObfuscationService::new()),
            Arc::new(DecoyService::new()),
        )
    }

    /// Rewrite a request according to the enabled privacy features.
    pub async fn process_request(
        &self,
        messages: &[ChatMessage],
        pii_removal: bool,
        obfuscate: bool,
        decoy: bool,
        is_stateless: bool,
        session_id: Option<&str>,
    ) -> (Vec<ChatMessage>, PrivacyMetadata) {
        let mut processed = messages.to_vec();
        let mut metadata = PrivacyMetadata {
            pii_detected: false,
            obfuscated: false,
            decoy_requested: decoy && is_stateless,
            original_messages: messages.to_vec(),
        };

        if pii_removal {
            let (scrubbed, detected) = self.pii.scrub(&processed).await;
            processed = scrubbed;
            metadata.pii_detected = detected;
            tracing::debug!(detected, "pii removal pass complete");
        }

        if obfuscate {
            processed = self.obfuscation.obfuscate_messages(&processed, session_id);
            metadata.obfuscated = true;
        }

        (processed, metadata)
    }

    /// Whether decoys should actually be minted for this request.
    pub fn should_generate_decoys(
        &self,
        messages: &[ChatMessage],
        decoy_requested: bool,
        is_stateless: bool,
    ) -> bool {
        if !(decoy_requested && is_stateless) {
            return false;
        }
        self.decoys.should_generate_decoy(messages, true)
    }

    /// Mint decoy prompts from the pristine original messages.
    pub fn generate_decoy_queries(&self, original: &[ChatMessage], count: usize) -> Vec<String> {
        self.decoys.generate_decoy_queries(original, count)
    }

    /// Invert response rewrites (deobfuscation) where they were applied.
    pub fn process_response(
        &self,
        content: &str,
        obfuscate: bool,
        session_id: Option<&str>,
    ) -> String {
        if obfuscate {
            self.obfuscation.deobfuscate_response(content, session_id)
        } else {
            content.to_string()
        }
    }

    /// Drop per-session privacy state when a session ends.
    pub fn clear_session(&self, session_id: &str) {
        self.obfuscation.clear_mappings(Some(session_id));
    }

    /// Privacy score: base 0.5, +0.2 for PII scrub, +0.3 for obfuscation,
    /// minus 0.01 per message capped at 0.2, clamped to [0, 1].
    pub fn calculate_privacy_score(
        &self,
        pii_removal: bool,
        obfuscate: bool,
        message_count: usize,
    ) -> f64 {
        let mut score: f64 = 0.5;
        if pii_removal {
            score += 0.2;
        }
        if obfuscate {
            score += 0.3;
        }
        let penalty = (message_count as f64 * 0.01).min(0.2);
        (score - penalty).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    #[tokio::test]
    async fn test_request_pass_without_features_is_identity() {
        let processor = PrivacyProcessor::baseline();
        let (processed, metadata) = processor
            .process_request(&messages(), false, false, false, true, None)
            .await;
        assert_eq!(processed, messages());
        assert!(!metadata.pii_detected);
        assert!(!metadata.obfuscated);
        assert!(!metadata.decoy_requested);
    }

    #[tokio::test]
    async fn test_metadata_keeps_original_messages() {
        let processor = PrivacyProcessor::baseline();
        let input = messages();
        let (_, metadata) = processor
            .process_request(&input, true, true, true, true, Some("s1"))
            .await;
        assert_eq!(metadata.original_messages, input);
        assert!(metadata.obfuscated);
        assert!(metadata.decoy_requested);
    }

    #[tokio::test]
    async fn test_decoy_request_on_stateful_is_not_recorded() {
        let processor = PrivacyProcessor::baseline();
        let (_, metadata) = processor
            .process_request(&messages(), false, false, true, false, Some("s1"))
            .await;
        assert!(!metadata.decoy_requested);
        assert!(!processor.should_generate_decoys(&messages(), true, false));
    }

    #[tokio::test]
    async fn test_obfuscation_round_trip_within_session() {
        let processor = PrivacyProcessor::baseline();
        let input = messages();
        let (processed, _) = processor
            .process_request(&input, false, true, false, true, Some("s1"))
            .await;
        let restored = processor.process_response(&processed[0].content, true, Some("s1"));
        assert_eq!(restored, input[0].content);
    }

    #[test]
    fn test_privacy_score_formula() {
        let processor = PrivacyProcessor::baseline();
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(processor.calculate_privacy_score(false, false, 1), 0.49));
        assert!(close(processor.calculate_privacy_score(true, false, 1), 0.69));
        assert!(close(processor.calculate_privacy_score(true, true, 0), 1.0));
        // Penalty caps at 0.2 no matter how long the conversation gets.
        assert!(close(processor.calculate_privacy_score(false, false, 500), 0.3));
    }

    #[test]
    fn test_privacy_score_clamped() {
        let processor = PrivacyProcessor::baseline();
        let score = processor.calculate_privacy_score(false, false, 100);
        assert!((0.0..=1.0).contains(&score));
    }
}
