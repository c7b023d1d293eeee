//! Small shared utilities: id derivation, session-scoped hashing, and
//! cryptographically secure randomness.

pub mod crypto;

pub use crypto::{
    generate_endpoint_id, hour_bucket, secure_choice, secure_index, secure_shuffle,
    session_key_hash, unix_now,
};
