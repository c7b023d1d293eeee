//! gRPC schema and client for the key allocator.
//!
//! The allocator runs as a separate process and listens on a Unix-domain
//! socket; this crate carries the generated protobuf types plus the client
//! the web process uses to reach it.

pub mod client;

/// Generated protobuf types and service stubs.
pub mod pb {
    tonic::include_proto!("keyserver");
}

pub use client::KeyClient;

impl From<pb::SelectedKey> for vg_types::records::KeyLease {
    fn from(key: pb::SelectedKey) -> Self {
        Self {
            key_id: key.key_id,
            provider: key.provider,
            model: key.model,
            api_key: key.api_key,
            tokens_hour: key.tokens_hour,
            tokens_total: key.tokens_total,
            status: key.status,
        }
    }
}
