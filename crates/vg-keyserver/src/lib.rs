//! Key allocator
//!
//! Owns the key pool: ingests key config files, writes secrets to the
//! secret store, selects keys for sessions with the weighted policy, and
//! tracks per-key token usage. Served over gRPC on a Unix-domain socket.

pub mod manager;
pub mod service;

pub use manager::KeyManager;
pub use service::KeyServerService;
