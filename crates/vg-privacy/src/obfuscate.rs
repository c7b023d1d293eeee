//! Message obfuscation.
//!
//! A reversible transform keyed by session: obfuscating a message set
//! stores a mapping record so the response can be inverted later. The
//! baseline transform is the identity; the mapping bookkeeping and TTL
//! behavior are real so a non-identity transform can slot in without
//! touching callers.

use dashmap::DashMap;

use vg_types::ChatMessage;
use vg_utils::unix_now;

/// Mappings younger than this are invertible.
const MAPPING_TTL_SECS: i64 = 3600;
/// Expired mappings are purged lazily, at most this often.
const CLEANUP_INTERVAL_SECS: i64 = 300;

struct MappingRecord {
    session_id: String,
    #[allow(dead_code)]
    original: Vec<ChatMessage>,
    created_at: i64,
}

#[derive(Default)]
pub struct ObfuscationService {
    mappings: DashMap<String, MappingRecord>,
    last_cleanup: std::sync::atomic::AtomicI64,
}

impl ObfuscationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obfuscate a message set for a session. Returns the rewritten
    /// messages; the inverse mapping is retained for [`MAPPING_TTL_SECS`].
    pub fn obfuscate_messages(
        &self,
        messages: &[ChatMessage],
        session_id: Option<&str>,
    ) -> Vec<ChatMessage> {
        let obfuscated: Vec<ChatMessage> = messages.to_vec();

        if let Some(session_id) = session_id {
            let mapping_id = uuid::Uuid::new_v4().to_string();
            self.mappings.insert(
                mapping_id,
                MappingRecord {
                    session_id: session_id.to_string(),
                    original: messages.to_vec(),
                    created_at: unix_now(),
                },
            );
            self.cleanup_expired();
        }

        tracing::debug!(count = messages.len(), "obfuscated messages");
        obfuscated
    }

    /// Invert the obfuscation on response content using the session's
    /// mapping. Identity baseline: content comes back unchanged.
    pub fn deobfuscate_response(&self, content: &str, _session_id: Option<&str>) -> String {
        self.cleanup_expired();
        content.to_string()
    }

    /// Drop mappings for one session, or all of them.
    pub fn clear_mappings(&self, session_id: Option<&str>) {
        match session_id {
            Some(session_id) => {
                self.mappings.retain(|_, record| record.session_id != session_id);
            }
            None => self.mappings.clear(),
        }
    }

    pub fn active_mappings(&self) -> usize {
        self.mappings.len()
    }

    fn cleanup_expired(&self) {
        use std::sync::atomic::Ordering;
        let now = unix_now();
        let last = self.last_cleanup.load(Ordering::Relaxed);
        if now - last < CLEANUP_INTERVAL_SECS {
            return;
        }
        if self
            .last_cleanup
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let before = self.mappings.len();
        self.mappings.retain(|_, record| now - record.created_at <= MAPPING_TTL_SECS);
        let removed = before - self.mappings.len();
        if removed > 0 {
            tracing::info!(removed, remaining = self.mappings.len(), "purged expired obfuscation mappings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_identity() {
        let service = ObfuscationService::new();
        let messages = vec![ChatMessage::user("the quick brown fox")];
        let obfuscated = service.obfuscate_messages(&messages, Some("session-1"));
        let restored = service.deobfuscate_response(&obfuscated[0].content, Some("session-1"));
        assert_eq!(restored, messages[0].content);
    }

    #[test]
    fn test_mapping_recorded_per_session() {
        let service = ObfuscationService::new();
        let messages = vec![ChatMessage::user("x")];
        service.obfuscate_messages(&messages, Some("session-1"));
        service.obfuscate_messages(&messages, Some("session-2"));
        assert_eq!(service.active_mappings(), 2);

        service.clear_mappings(Some("session-1"));
        assert_eq!(service.active_mappings(), 1);

        service.clear_mappings(None);
        assert_eq!(service.active_mappings(), 0);
    }

    #[test]
    fn test_no_mapping_without_session() {
        let service = ObfuscationService::new();
        service.obfuscate_messages(&[ChatMessage::user("x")], None);
        assert_eq!(service.active_mappings(), 0);
    }
}
