//! Key pool management: selection, usage tracking, ingestion, statistics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use vg_config::{parse_key_file, KeyFileEntry};
use vg_secrets::{key_secret_path, SecretStore};
use vg_store::CounterStore;
use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::records::{KeyLease, KeyStatus, KeyUsage};
use vg_types::{ModelRef, SESSION_TTL_SECS};

/// Weight assigned to a key for one selection round, from its hourly
/// counter. Unused keys rank first; heavily used keys stay selectable but
/// sink to the bottom.
pub fn selection_weight(tokens_hour: u64) -> f64 {
    if tokens_hour == 0 {
        100.0
    } else if tokens_hour < 1_000 {
        50.0
    } else if tokens_hour < 5_000 {
        20.0
    } else {
        5.0
    }
}

/// One key's load snapshot entering the ranking.
#[derive(Debug, Clone)]
pub struct KeyLoad {
    pub key_id: String,
    pub tokens_hour: u64,
}

/// Rank keys for selection: weight descending, hourly tokens ascending,
/// key id lexicographic. Deterministic given the counter state — the
/// user-visible randomness lives in the session manager and the dispatcher,
/// not here.
pub fn rank_keys(mut loads: Vec<KeyLoad>) -> Vec<String> {
    loads.sort_by(|a, b| {
        let wa = selection_weight(a.tokens_hour);
        let wb = selection_weight(b.tokens_hour);
        wb.partial_cmp(&wa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.tokens_hour.cmp(&b.tokens_hour))
            .then(a.key_id.cmp(&b.key_id))
    });
    loads.into_iter().map(|load| load.key_id).collect()
}

#[derive(Debug, Default)]
pub struct RequestCounters {
    pub total: AtomicU64,
    pub successful: AtomicU64,
    pub failed: AtomicU64,
}

/// Runtime statistics snapshot.
#[derive(Debug, Clone)]
pub struct RuntimeStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub uptime_seconds: f64,
    pub active_sessions: u64,
}

/// Per-key detail line in the detailed stats report.
#[derive(Debug, Clone)]
pub struct KeyDetail {
    pub key_id: String,
    pub usage: KeyUsage,
}

pub struct KeyManager {
    store: CounterStore,
    secrets: Arc<dyn SecretStore>,
    started_at: Instant,
    pub counters: RequestCounters,
}

impl KeyManager {
    pub fn new(store: CounterStore, secrets: Arc<dyn SecretStore>) -> Self {
        tracing::info!("key manager initialized");
        Self {
            store,
            secrets,
            started_at: Instant::now(),
            counters: RequestCounters::default(),
        }
    }

    // ==================== KEY SELECTION ====================

    /// Select up to `count_per_model` keys per requested (provider, model).
    ///
    /// Records a default session weight for each returned key. Fails with
    /// `no-keys` only when nothing could be selected at all; otherwise a
    /// partial list is returned and skipped pools are logged.
    pub async fn select_keys_for_session(
        &self,
        session_id: &str,
        user_id: i64,
        models: &[String],
        count_per_model: usize,
    ) -> GatewayResult<Vec<KeyLease>> {
        tracing::info!(session_id, user_id, ?models, "selecting keys for session");
        let mut selected = Vec::new();

        for model_string in models {
            let model_ref = match ModelRef::parse(model_string) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(model_string, "skipping invalid model string: {e}");
                    continue;
                }
            };
            // Pools and secret paths are keyed by lowercase provider so the
            // key file and request model strings agree regardless of case.
            let pool_provider = model_ref.provider.to_lowercase();

            let pool = self.store.pool_members(&pool_provider, &model_ref.model).await?;
            if pool.is_empty() {
                tracing::warn!(
                    provider = %model_ref.provider,
                    model = %model_ref.model,
                    "no keys available in pool"
                );
                continue;
            }

            let mut loads = Vec::with_capacity(pool.len());
            for key_id in pool {
                let usage = self.store.key_usage(&key_id).await?;
                loads.push(KeyLoad {
                    key_id,
                    tokens_hour: usage.tokens_hour,
                });
            }

            let ranked = rank_keys(loads);
            for key_id in ranked.into_iter().take(count_per_model) {
                let secret_path = key_secret_path(&pool_provider, &model_ref.model, &key_id);
                let api_key = match self.secrets.read(&secret_path).await {
                    Ok(secret) => secret,
                    Err(e) => {
                        // A pool entry without a secret is unusable; skip it
                        // rather than failing the whole selection.
                        tracing::error!(key_id, "failed to retrieve key secret: {e}");
                        continue;
                    }
                };

                let usage = self.store.key_usage(&key_id).await?;
                self.store
                    .set_key_weight(session_id, &key_id, 100.0, SESSION_TTL_SECS)
                    .await?;

                selected.push(KeyLease {
                    key_id,
                    provider: model_ref.provider.clone(),
                    model: model_ref.model.clone(),
                    api_key,
                    tokens_hour: usage.tokens_hour,
                    tokens_total: usage.tokens_total,
                    status: KeyStatus::from_hourly_tokens(usage.tokens_hour).to_string(),
                });
            }
        }

        if selected.is_empty() {
            return Err(GatewayError::NoKeys(format!(
                "no-keys: no keys available for models {models:?}"
            )));
        }

        tracing::info!(session_id, count = selected.len(), "selected keys for session");
        Ok(selected)
    }

    /// Reset all session→key weights for a session. Absent session is a
    /// no-op.
    pub async fn release_session(&self, session_id: &str) -> GatewayResult<()> {
        self.store.reset_session_weights(session_id).await?;
        tracing::info!(session_id, "released session keys");
        Ok(())
    }

    // ==================== INGESTION ====================

    /// Ingest a key config file: each secret goes to the secret store under
    /// `llm/<provider>/<model>/<uuid>` and the in-memory pool for every
    /// (provider, model) seen in the file is replaced.
    pub async fn ingest_keys_from_file(
        &self,
        file_path: &str,
    ) -> GatewayResult<HashMap<String, u32>> {
        tracing::info!(file_path, "ingesting keys");
        let entries = parse_key_file(file_path)?;
        self.ingest_entries(entries).await
    }

    pub async fn ingest_entries(
        &self,
        entries: Vec<KeyFileEntry>,
    ) -> GatewayResult<HashMap<String, u32>> {
        let mut grouped: HashMap<(String, String), Vec<KeyFileEntry>> = HashMap::new();
        for entry in entries {
            grouped
                .entry((entry.provider.to_lowercase(), entry.model.clone()))
                .or_default()
                .push(entry);
        }

        let mut pools = HashMap::new();
        for ((provider, model), group) in grouped {
            // Replace the pool: existing sessions keep their endpoint
            // secrets, but new selections draw only from the new keys.
            self.store.clear_key_pool(&provider, &model).await?;

            let mut count = 0u32;
            for entry in group {
                let key_id = Uuid::new_v4().to_string();
                let path = key_secret_path(&provider, &model, &key_id);
                self.secrets.write(&path, &entry.api_key).await?;
                self.store.add_key_to_pool(&provider, &model, &key_id).await?;
                count += 1;
            }

            tracing::info!(provider, model, count, "updated key pool");
            pools.insert(format!("{provider}:{model}"), count);
        }
        Ok(pools)
    }

    // ==================== USAGE & STATS ====================

    pub async fn track_key_usage(&self, key_id: &str, tokens: u64) -> GatewayResult<()> {
        self.store.track_key_usage(key_id, tokens).await
    }

    /// Available key count per pool. Only counts are exposed here; key ids
    /// stay in the detailed report.
    pub async fn pool_stats(&self) -> GatewayResult<HashMap<String, u64>> {
        let mut stats = HashMap::new();
        for (provider, model) in self.store.list_pools().await? {
            let size = self.store.pool_size(&provider, &model).await?;
            stats.insert(format!("{provider}:{model}"), size);
        }
        Ok(stats)
    }

    pub async fn detailed_pool_stats(&self) -> GatewayResult<HashMap<String, Vec<KeyDetail>>> {
        let mut stats = HashMap::new();
        for (provider, model) in self.store.list_pools().await? {
            let mut details = Vec::new();
            for key_id in self.store.pool_members(&provider, &model).await? {
                let usage = self.store.key_usage(&key_id).await?;
                details.push(KeyDetail { key_id, usage });
            }
            stats.insert(format!("{provider}:{model}"), details);
        }
        Ok(stats)
    }

    pub async fn runtime_stats(&self) -> GatewayResult<RuntimeStats> {
        let active_sessions = self.store.active_weight_sessions().await?.len() as u64;
        Ok(RuntimeStats {
            total_requests: self.counters.total.load(Ordering::Relaxed),
            successful_requests: self.counters.successful.load(Ordering::Relaxed),
            failed_requests: self.counters.failed.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            active_sessions,
        })
    }

    pub fn record_request(&self, success: bool) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.counters.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(key_id: &str, tokens_hour: u64) -> KeyLoad {
        KeyLoad {
            key_id: key_id.to_string(),
            tokens_hour,
        }
    }

    #[test]
    fn test_selection_weight_bands() {
        assert_eq!(selection_weight(0), 100.0);
        assert_eq!(selection_weight(999), 50.0);
        assert_eq!(selection_weight(1_000), 20.0);
        assert_eq!(selection_weight(4_999), 20.0);
        assert_eq!(selection_weight(5_000), 5.0);
        assert_eq!(selection_weight(1_000_000), 5.0);
    }

    #[test]
    fn test_rank_prefers_lower_usage() {
        let ranked = rank_keys(vec![load("a", 6_000), load("b", 0), load("c", 1_500)]);
        assert_eq!(ranked, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rank_breaks_ties_within_band_by_tokens_then_id() {
        // Same weight band (<1k), tokens decide; equal tokens fall back to
        // the key id for determinism.
        let ranked = rank_keys(vec![load("z", 500), load("a", 500), load("m", 100)]);
        assert_eq!(ranked, vec!["m", "a", "z"]);
    }

    #[test]
    fn test_rank_monotonicity() {
        // Reducing a key's hourly counter never lowers its rank.
        let base = vec![load("a", 3_000), load("b", 400), load("c", 0)];
        let before = rank_keys(base.clone());
        let pos_before = before.iter().position(|k| k == "a").unwrap();

        let reduced = vec![load("a", 200), load("b", 400), load("c", 0)];
        let after = rank_keys(reduced);
        let pos_after = after.iter().position(|k| k == "a").unwrap();

        assert!(pos_after <= pos_before);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let loads = vec![load("x", 10), load("y", 10), load("w", 10)];
        assert_eq!(rank_keys(loads.clone()), rank_keys(loads));
    }
}
