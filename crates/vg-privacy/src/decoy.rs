//! Decoy query generation.
//!
//! A decoy is a complete prompt semantically unrelated to the input. The
//! baseline draws from a pool of generic prompts with a CSPRNG; generation
//! is gated to stateless traffic because a random decoy would corrupt
//! multi-turn context.

use std::sync::atomic::{AtomicU64, Ordering};

use vg_types::ChatMessage;
use vg_utils::secure_choice;

const DECOY_TOPICS: &[&str] = &[
    "What's the weather like today?",
    "Can you explain quantum computing?",
    "What are the benefits of meditation?",
    "How do I make a chocolate cake?",
    "What's the capital of France?",
    "Tell me about renewable energy sources.",
    "How does machine learning work?",
    "What are the health benefits of exercise?",
    "Explain the history of the internet.",
    "What's the difference between AI and ML?",
    "How do solar panels work?",
    "What are the best programming languages?",
    "Explain blockchain technology.",
    "What causes climate change?",
    "How do I improve my productivity?",
];

#[derive(Debug, Default)]
pub struct DecoyStats {
    pub queries_analyzed: AtomicU64,
    pub decoys_generated: AtomicU64,
}

#[derive(Default)]
pub struct DecoyService {
    stats: DecoyStats,
}

impl DecoyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether decoys should be minted for this query. Stateful
    /// conversations never get decoys.
    pub fn should_generate_decoy(&self, _messages: &[ChatMessage], is_stateless: bool) -> bool {
        self.stats.queries_analyzed.fetch_add(1, Ordering::Relaxed);
        if !is_stateless {
            tracing::debug!("decoy generation skipped: stateful query");
            return false;
        }
        true
    }

    /// Generate `count` decoy prompts. Takes the original (pre-rewrite)
    /// messages so a future content-aware generator never sees obfuscated
    /// text.
    pub fn generate_decoy_queries(
        &self,
        _original_messages: &[ChatMessage],
        count: usize,
    ) -> Vec<String> {
        let decoys: Vec<String> = (0..count)
            .map(|_| secure_choice(DECOY_TOPICS).to_string())
            .collect();
        self.stats
            .decoys_generated
            .fetch_add(decoys.len() as u64, Ordering::Relaxed);
        tracing::info!(count = decoys.len(), "generated decoy queries");
        decoys
    }

    pub fn queries_analyzed(&self) -> u64 {
        self.stats.queries_analyzed.load(Ordering::Relaxed)
    }

    pub fn decoys_generated(&self) -> u64 {
        self.stats.decoys_generated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stateful_queries_never_get_decoys() {
        let service = DecoyService::new();
        let messages = vec![ChatMessage::user("hi")];
        assert!(!service.should_generate_decoy(&messages, false));
        assert!(service.should_generate_decoy(&messages, true));
    }

    #[test]
    fn test_decoys_come_from_the_pool() {
        let service = DecoyService::new();
        let decoys = service.generate_decoy_queries(&[ChatMessage::user("secret topic")], 2);
        assert_eq!(decoys.len(), 2);
        for decoy in &decoys {
            assert!(DECOY_TOPICS.contains(&decoy.as_str()));
        }
        assert_eq!(service.decoys_generated(), 2);
    }

    #[test]
    fn test_decoys_are_unrelated_to_input() {
        let service = DecoyService::new();
        let decoys =
            service.generate_decoy_queries(&[ChatMessage::user("my very private question")], 5);
        for decoy in decoys {
            assert!(!decoy.contains("private"));
        }
    }
}
