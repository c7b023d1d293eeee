//! gRPC service wrapper around the key manager.
//!
//! Failures are reported in-band (`success = false` plus an error string)
//! so the web process can distinguish "no keys" from transport problems.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use vg_keyrpc::pb;
use vg_keyrpc::pb::key_server_server::KeyServer;
use vg_types::errors::GatewayError;

use crate::manager::KeyManager;

pub struct KeyServerService {
    manager: Arc<KeyManager>,
}

impl KeyServerService {
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self { manager }
    }

    fn runtime_pb(stats: crate::manager::RuntimeStats) -> pb::RuntimeStats {
        pb::RuntimeStats {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            uptime_seconds: stats.uptime_seconds,
            active_sessions: stats.active_sessions,
        }
    }
}

#[tonic::async_trait]
impl KeyServer for KeyServerService {
    async fn select_keys_for_session(
        &self,
        request: Request<pb::SelectKeysRequest>,
    ) -> Result<Response<pb::SelectKeysResponse>, Status> {
        let request = request.into_inner();
        let count = if request.count_per_model == 0 {
            1
        } else {
            request.count_per_model as usize
        };

        let result = self
            .manager
            .select_keys_for_session(&request.session_id, request.user_id, &request.models, count)
            .await;

        let response = match result {
            Ok(leases) => {
                self.manager.record_request(true);
                pb::SelectKeysResponse {
                    success: true,
                    keys: leases
                        .into_iter()
                        .map(|lease| pb::SelectedKey {
                            key_id: lease.key_id,
                            provider: lease.provider,
                            model: lease.model,
                            api_key: lease.api_key,
                            tokens_hour: lease.tokens_hour,
                            tokens_total: lease.tokens_total,
                            status: lease.status,
                        })
                        .collect(),
                    error: String::new(),
                }
            }
            Err(e) => {
                self.manager.record_request(false);
                let error = match &e {
                    GatewayError::NoKeys(message) => message.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(session_id = %request.session_id, "key selection failed: {error}");
                pb::SelectKeysResponse {
                    success: false,
                    keys: Vec::new(),
                    error,
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn release_key(
        &self,
        request: Request<pb::ReleaseKeyRequest>,
    ) -> Result<Response<pb::ReleaseKeyResponse>, Status> {
        let request = request.into_inner();
        if let Err(e) = self.manager.release_session(&request.session_id).await {
            // Release never fails the caller.
            tracing::warn!(session_id = %request.session_id, "release failed: {e}");
        }
        Ok(Response::new(pb::ReleaseKeyResponse {}))
    }

    async fn reload_keys(
        &self,
        request: Request<pb::ReloadKeysRequest>,
    ) -> Result<Response<pb::ReloadKeysResponse>, Status> {
        let request = request.into_inner();
        let file_path = if request.file_path.is_empty() {
            std::env::var("KEY_CONFIG_FILE").unwrap_or_else(|_| "api_keys.csv".to_string())
        } else {
            request.file_path
        };

        let response = match self.manager.ingest_keys_from_file(&file_path).await {
            Ok(pools) => pb::ReloadKeysResponse {
                success: true,
                pools,
                error: String::new(),
            },
            Err(e) => {
                tracing::error!(file_path, "key reload failed: {e}");
                pb::ReloadKeysResponse {
                    success: false,
                    pools: Default::default(),
                    error: e.to_string(),
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn get_stats(
        &self,
        _request: Request<pb::StatsRequest>,
    ) -> Result<Response<pb::StatsResponse>, Status> {
        let response = match (self.manager.pool_stats().await, self.manager.runtime_stats().await) {
            (Ok(pools), Ok(runtime)) => pb::StatsResponse {
                success: true,
                pool_stats: pools
                    .into_iter()
                    .map(|(pool, available)| (pool, pb::PoolStats { available }))
                    .collect(),
                runtime_stats: Some(Self::runtime_pb(runtime)),
                error: String::new(),
            },
            (Err(e), _) | (_, Err(e)) => pb::StatsResponse {
                success: false,
                pool_stats: Default::default(),
                runtime_stats: None,
                error: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }

    async fn get_detailed_stats(
        &self,
        _request: Request<pb::DetailedStatsRequest>,
    ) -> Result<Response<pb::DetailedStatsResponse>, Status> {
        let response = match (
            self.manager.detailed_pool_stats().await,
            self.manager.runtime_stats().await,
        ) {
            (Ok(pools), Ok(runtime)) => pb::DetailedStatsResponse {
                success: true,
                pool_detailed_stats: pools
                    .into_iter()
                    .map(|(pool, details)| {
                        let keys = details
                            .into_iter()
                            .map(|detail| pb::KeyStats {
                                key_id: detail.key_id,
                                tokens_hour: detail.usage.tokens_hour,
                                tokens_total: detail.usage.tokens_total,
                                last_used: detail.usage.last_used.unwrap_or(0),
                            })
                            .collect();
                        (pool, pb::PoolKeyStats { keys })
                    })
                    .collect(),
                runtime_stats: Some(Self::runtime_pb(runtime)),
                error: String::new(),
            },
            (Err(e), _) | (_, Err(e)) => pb::DetailedStatsResponse {
                success: false,
                pool_detailed_stats: Default::default(),
                runtime_stats: None,
                error: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }

    async fn track_usage(
        &self,
        request: Request<pb::TrackUsageRequest>,
    ) -> Result<Response<pb::TrackUsageResponse>, Status> {
        let request = request.into_inner();
        let response = match self
            .manager
            .track_key_usage(&request.key_id, request.tokens_used)
            .await
        {
            Ok(()) => pb::TrackUsageResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => pb::TrackUsageResponse {
                success: false,
                error: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }

    async fn health(
        &self,
        _request: Request<pb::HealthRequest>,
    ) -> Result<Response<pb::HealthResponse>, Status> {
        Ok(Response::new(pb::HealthResponse {
            success: true,
            healthy: true,
        }))
    }
}
