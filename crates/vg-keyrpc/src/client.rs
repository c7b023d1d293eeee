//! Key allocator client over a Unix-domain socket.
//!
//! The channel is created lazily on first use and kept for the life of the
//! process; tonic multiplexes concurrent calls over it. Per-call deadlines
//! follow the operation cost: selection 10 s, reload 30 s, the rest 5 s or
//! less.

use std::collections::HashMap;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::records::KeyLease;

use crate::pb;
use crate::pb::key_server_client::KeyServerClient;

const SELECT_TIMEOUT: Duration = Duration::from_secs(10);
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);
const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);
const STATS_TIMEOUT: Duration = Duration::from_secs(3);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool and runtime statistics as reported by the allocator.
#[derive(Debug, Clone, Default)]
pub struct AllocatorStats {
    /// "<provider>:<model>" -> available key count.
    pub pools: HashMap<String, u64>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub uptime_seconds: f64,
    pub active_sessions: u64,
}

pub struct KeyClient {
    socket_path: String,
    stub: Mutex<Option<KeyServerClient<Channel>>>,
}

impl KeyClient {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            stub: Mutex::new(None),
        }
    }

    async fn connect(socket_path: String) -> GatewayResult<Channel> {
        // The URI is required by the endpoint builder but never resolved;
        // the connector dials the socket directly.
        Endpoint::try_from("http://[::1]:50051")
            .map_err(|e| GatewayError::Rpc(format!("invalid endpoint: {e}")))?
            .connect_with_connector(service_fn(move |_: Uri| {
                let socket_path = socket_path.clone();
                async move {
                    let stream = UnixStream::connect(socket_path).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await
            .map_err(|e| GatewayError::Rpc(format!("key server unreachable: {e}")))
    }

    async fn stub(&self) -> GatewayResult<KeyServerClient<Channel>> {
        let mut guard = self.stub.lock().await;
        if let Some(stub) = guard.as_ref() {
            return Ok(stub.clone());
        }
        let channel = Self::connect(self.socket_path.clone()).await?;
        let stub = KeyServerClient::new(channel);
        *guard = Some(stub.clone());
        tracing::debug!(socket = %self.socket_path, "key server channel established");
        Ok(stub)
    }

    /// Drop the cached channel so the next call reconnects.
    async fn reset(&self) {
        *self.stub.lock().await = None;
    }

    async fn rpc_err(&self, op: &str, status: tonic::Status) -> GatewayError {
        self.reset().await;
        GatewayError::Rpc(format!("{op}: {}: {}", status.code(), status.message()))
    }

    fn with_deadline<T>(message: T, timeout: Duration) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(timeout);
        request
    }

    pub async fn select_keys_for_session(
        &self,
        session_id: &str,
        user_id: i64,
        models: &[String],
        count_per_model: u32,
    ) -> GatewayResult<Vec<KeyLease>> {
        let request = Self::with_deadline(
            pb::SelectKeysRequest {
                session_id: session_id.to_string(),
                user_id,
                models: models.to_vec(),
                count_per_model,
            },
            SELECT_TIMEOUT,
        );
        let mut stub = self.stub().await?;
        let response = match stub.select_keys_for_session(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => return Err(self.rpc_err("select keys", status).await),
        };

        if !response.success {
            if response.error.starts_with("no-keys") {
                return Err(GatewayError::NoKeys(response.error));
            }
            return Err(GatewayError::Rpc(response.error));
        }
        Ok(response.keys.into_iter().map(KeyLease::from).collect())
    }

    /// Release every key weight a session holds. Never fails upward: a
    /// missing session or a transient error only logs.
    pub async fn release_session(&self, session_id: &str) {
        let request = Self::with_deadline(
            pb::ReleaseKeyRequest {
                session_id: session_id.to_string(),
            },
            RELEASE_TIMEOUT,
        );
        match self.stub().await {
            Ok(mut stub) => {
                if let Err(status) = stub.release_key(request).await {
                    tracing::warn!(session_id, "release failed: {status}");
                    self.reset().await;
                }
            }
            Err(e) => tracing::warn!(session_id, "release skipped: {e}"),
        }
    }

    pub async fn reload_keys(
        &self,
        file_path: Option<&str>,
    ) -> GatewayResult<HashMap<String, u32>> {
        let request = Self::with_deadline(
            pb::ReloadKeysRequest {
                file_path: file_path.unwrap_or_default().to_string(),
            },
            RELOAD_TIMEOUT,
        );
        let mut stub = self.stub().await?;
        let response = match stub.reload_keys(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => return Err(self.rpc_err("reload keys", status).await),
        };
        if !response.success {
            return Err(GatewayError::Rpc(response.error));
        }
        Ok(response.pools)
    }

    pub async fn track_usage(&self, key_id: &str, tokens_used: u64) -> GatewayResult<()> {
        let request = Self::with_deadline(
            pb::TrackUsageRequest {
                key_id: key_id.to_string(),
                tokens_used,
            },
            RELEASE_TIMEOUT,
        );
        let mut stub = self.stub().await?;
        let response = match stub.track_usage(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => return Err(self.rpc_err("track usage", status).await),
        };
        if !response.success {
            return Err(GatewayError::Rpc(response.error));
        }
        Ok(())
    }

    pub async fn get_stats(&self) -> GatewayResult<AllocatorStats> {
        let request = Self::with_deadline(pb::StatsRequest {}, STATS_TIMEOUT);
        let mut stub = self.stub().await?;
        let response = match stub.get_stats(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => return Err(self.rpc_err("get stats", status).await),
        };
        if !response.success {
            return Err(GatewayError::Rpc(response.error));
        }
        let runtime = response.runtime_stats.unwrap_or_default();
        Ok(AllocatorStats {
            pools: response
                .pool_stats
                .into_iter()
                .map(|(pool, stats)| (pool, stats.available))
                .collect(),
            total_requests: runtime.total_requests,
            successful_requests: runtime.successful_requests,
            failed_requests: runtime.failed_requests,
            uptime_seconds: runtime.uptime_seconds,
            active_sessions: runtime.active_sessions,
        })
    }

    pub async fn health(&self) -> bool {
        let request = Self::with_deadline(pb::HealthRequest {}, HEALTH_TIMEOUT);
        match self.stub().await {
            Ok(mut stub) => match stub.health(request).await {
                Ok(response) => {
                    let response = response.into_inner();
                    response.success && response.healthy
                }
                Err(status) => {
                    tracing::debug!("key server health check failed: {status}");
                    self.reset().await;
                    false
                }
            },
            Err(_) => false,
        }
    }
}
