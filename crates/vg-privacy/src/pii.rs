//! PII scrubbing.
//!
//! Detection is a pluggable capability behind [`PiiScrubber`]; the baseline
//! implementation is the identity and never reports a detection.

use async_trait::async_trait;

use vg_types::ChatMessage;

#[async_trait]
pub trait PiiScrubber: Send + Sync {
    /// Scrub the messages, returning the rewritten set and whether any PII
    /// was detected.
    async fn scrub(&self, messages: &[ChatMessage]) -> (Vec<ChatMessage>, bool);
}

/// Baseline scrubber: passes messages through unchanged.
#[derive(Default)]
pub struct IdentityPiiScrubber;

impl IdentityPiiScrubber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PiiScrubber for IdentityPiiScrubber {
    async fn scrub(&self, messages: &[ChatMessage]) -> (Vec<ChatMessage>, bool) {
        tracing::debug!(count = messages.len(), "pii scrub requested (identity)");
        (messages.to_vec(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_scrubber_never_detects() {
        let scrubber = IdentityPiiScrubber::new();
        let messages = vec![ChatMessage::user("my email is someone@example.com")];
        let (scrubbed, detected) = scrubber.scrub(&messages).await;
        assert_eq!(scrubbed, messages);
        assert!(!detected);
    }
}
