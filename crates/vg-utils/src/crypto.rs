//! Cryptographic utilities
//!
//! Endpoint-id and key-hash derivation plus CSPRNG-backed choice and
//! shuffle. All user-visible randomness in the gateway goes through the OS
//! random source; nothing here is seeded or reproducible.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Hour bucket for a unix timestamp. Key hashes roll over at hour
/// boundaries so they cannot be correlated long-term.
pub fn hour_bucket(unix_seconds: i64) -> i64 {
    unix_seconds / 3600
}

/// Derive an opaque endpoint id.
///
/// SHA-256 over `provider:model:key_id:unix_seconds:session_salt`, truncated
/// to `length` hex characters. The salt is the first 8 chars of the session
/// id, so the same key yields unrelated ids in different sessions. The
/// secret material is never part of the input.
pub fn generate_endpoint_id(
    provider: &str,
    model: &str,
    key_id: &str,
    session_id: Option<&str>,
    unix_seconds: i64,
    length: usize,
) -> String {
    let session_salt = match session_id {
        Some(id) if id.len() >= 8 => &id[..8],
        Some(id) => id,
        None => "global00",
    };
    let input = format!("{provider}:{model}:{key_id}:{unix_seconds}:{session_salt}");
    let digest = Sha256::digest(input.as_bytes());
    let mut hex_digest = hex::encode(digest);
    hex_digest.truncate(length);
    hex_digest
}

/// Session-scoped hash of a key id, surfaced to clients as `api_key_hash`.
///
/// SHA-256 over `key_id:session_id:hour_bucket`, 24 hex chars. Lets a client
/// recognize "same endpoint within this session" without enabling
/// cross-session correlation; rolls over each hour.
pub fn session_key_hash(key_id: &str, session_id: &str, hour_bucket: i64) -> String {
    let input = format!("{key_id}:{session_id}:{hour_bucket}");
    let digest = Sha256::digest(input.as_bytes());
    let mut hex_digest = hex::encode(digest);
    hex_digest.truncate(24);
    hex_digest
}

/// Cryptographically secure uniform index into `0..len`.
pub fn secure_index(len: usize) -> usize {
    assert!(len > 0, "cannot choose from an empty range");
    OsRng.gen_range(0..len)
}

/// Cryptographically secure choice from a slice.
pub fn secure_choice<T>(items: &[T]) -> &T {
    &items[secure_index(items.len())]
}

/// Cryptographically secure in-place shuffle.
pub fn secure_shuffle<T>(items: &mut [T]) {
    items.shuffle(&mut OsRng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_endpoint_id_is_deterministic() {
        let a = generate_endpoint_id("openai", "gpt-4o", "k1", Some("session-1"), 1_700_000_000, 20);
        let b = generate_endpoint_id("openai", "gpt-4o", "k1", Some("session-1"), 1_700_000_000, 20);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_endpoint_id_differs_across_sessions() {
        // Same key, same timestamp, different session salt.
        let a = generate_endpoint_id("openai", "gpt-4o", "k1", Some("aaaaaaaa-1"), 1_700_000_000, 20);
        let b = generate_endpoint_id("openai", "gpt-4o", "k1", Some("bbbbbbbb-1"), 1_700_000_000, 20);
        assert_ne!(a, b);
    }

    #[test]
    fn test_endpoint_id_differs_across_time() {
        let a = generate_endpoint_id("openai", "gpt-4o", "k1", Some("aaaaaaaa"), 1_700_000_000, 20);
        let b = generate_endpoint_id("openai", "gpt-4o", "k1", Some("aaaaaaaa"), 1_700_000_001, 20);
        assert_ne!(a, b);
    }

    #[test]
    fn test_endpoint_id_without_session_uses_global_salt() {
        let a = generate_endpoint_id("openai", "gpt-4o", "k1", None, 1_700_000_000, 20);
        let b = generate_endpoint_id("openai", "gpt-4o", "k1", Some("global00-rest"), 1_700_000_000, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_hash_not_linkable_across_sessions() {
        let h1 = session_key_hash("k1", "session-a", 400_000);
        let h2 = session_key_hash("k1", "session-b", 400_000);
        assert_ne!(h1, h2);
        assert_eq!(h1.len(), 24);
    }

    #[test]
    fn test_key_hash_rolls_over_hour_boundary() {
        let h1 = session_key_hash("k1", "session-a", 400_000);
        let h2 = session_key_hash("k1", "session-a", 400_001);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_secure_shuffle_hits_every_position() {
        // The real query must land on every position eventually; with 300
        // trials over 3 slots a missing position would mean a broken
        // shuffle.
        let mut seen = HashSet::new();
        for _ in 0..300 {
            let mut indices = vec![0usize, 1, 2];
            secure_shuffle(&mut indices);
            seen.insert(indices.iter().position(|&i| i == 0).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_secure_shuffle_is_roughly_uniform() {
        let trials = 600;
        let mut counts = [0usize; 3];
        for _ in 0..trials {
            let mut indices = vec![0usize, 1, 2];
            secure_shuffle(&mut indices);
            counts[indices.iter().position(|&i| i == 0).unwrap()] += 1;
        }
        // No position may dominate: bound well above the expected third.
        for count in counts {
            assert!(count < trials * 8 / 10, "position count {count} out of {trials}");
        }
    }

    #[test]
    fn test_secure_choice_in_bounds() {
        let items = ["a", "b", "c"];
        for _ in 0..50 {
            assert!(items.contains(secure_choice(&items)));
        }
    }
}
