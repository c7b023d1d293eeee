//! Counter store: the shared Redis-backed state both processes operate on.
//!
//! The key allocator owns pools, usage counters, and session weights; the
//! web process owns sessions, candidate lists, and endpoint records. All of
//! it flows through the typed operations here — no raw key strings anywhere
//! else.

pub mod keys;

use std::collections::HashSet;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use vg_types::errors::{GatewayError, GatewayResult};
use vg_types::records::{
    CandidateEndpoint, EndpointRecord, KeyUsage, SessionRecord, SuspiciousActivity,
};
use vg_types::{
    KEY_LAST_USED_TTL_SECS, KEY_USAGE_HOUR_TTL_SECS, KEY_USAGE_TOTAL_TTL_SECS, SESSION_TTL_SECS,
    SUSPICIOUS_ACTIVITY_TTL_SECS, USER_SESSIONS_TTL_SECS,
};

/// Default session→key weight when nothing is recorded.
pub const DEFAULT_KEY_WEIGHT: f64 = 100.0;

fn storage_err(op: &str, e: redis::RedisError) -> GatewayError {
    GatewayError::Storage(format!("{op}: {e}"))
}

/// Typed handle over the counter store.
///
/// `ConnectionManager` multiplexes over a single auto-reconnecting
/// connection and is cheap to clone per operation.
#[derive(Clone)]
pub struct CounterStore {
    conn: ConnectionManager,
}

impl CounterStore {
    pub async fn connect(redis_url: &str) -> GatewayResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| GatewayError::Storage(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::Storage(format!("redis connect: {e}")))?;
        tracing::info!("counter store connected");
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| storage_err("ping", e))
    }

    // ==================== ENDPOINT RECORDS ====================

    pub async fn set_endpoint(&self, record: &EndpointRecord, ttl_secs: u64) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(keys::endpoint(&record.id), payload, ttl_secs)
            .await
            .map_err(|e| storage_err("set endpoint", e))?;
        tracing::debug!(endpoint_id = %record.id, "stored endpoint record");
        Ok(())
    }

    pub async fn get_endpoint(&self, endpoint_id: &str) -> GatewayResult<Option<EndpointRecord>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(keys::endpoint(endpoint_id))
            .await
            .map_err(|e| storage_err("get endpoint", e))?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(GatewayError::from))
            .transpose()
    }

    pub async fn delete_endpoint(&self, endpoint_id: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys::endpoint(endpoint_id))
            .await
            .map_err(|e| storage_err("delete endpoint", e))
    }

    // ==================== SESSION STATE ====================

    pub async fn set_session(&self, record: &SessionRecord) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(keys::session_state(&record.session_id), payload, SESSION_TTL_SECS)
            .await
            .map_err(|e| storage_err("set session", e))?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> GatewayResult<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(keys::session_state(session_id))
            .await
            .map_err(|e| storage_err("get session", e))?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(GatewayError::from))
            .transpose()
    }

    pub async fn delete_session(&self, session_id: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys::session_state(session_id))
            .await
            .map_err(|e| storage_err("delete session", e))
    }

    pub async fn active_session_count(&self) -> GatewayResult<usize> {
        let mut conn = self.conn.clone();
        let found: Vec<String> = conn
            .keys("session_state:*")
            .await
            .map_err(|e| storage_err("count sessions", e))?;
        Ok(found.len())
    }

    // ==================== CANDIDATE LISTS ====================

    pub async fn set_session_endpoints(
        &self,
        session_id: &str,
        endpoints: &[CandidateEndpoint],
        ttl_secs: u64,
    ) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(endpoints)?;
        conn.set_ex::<_, _, ()>(keys::session_endpoints(session_id), payload, ttl_secs)
            .await
            .map_err(|e| storage_err("set session endpoints", e))
    }

    pub async fn get_session_endpoints(
        &self,
        session_id: &str,
    ) -> GatewayResult<Vec<CandidateEndpoint>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(keys::session_endpoints(session_id))
            .await
            .map_err(|e| storage_err("get session endpoints", e))?;
        match payload {
            Some(p) => Ok(serde_json::from_str(&p)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn delete_session_endpoints(&self, session_id: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys::session_endpoints(session_id))
            .await
            .map_err(|e| storage_err("delete session endpoints", e))
    }

    // ==================== KEY POOLS ====================

    pub async fn add_key_to_pool(
        &self,
        provider: &str,
        model: &str,
        key_id: &str,
    ) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(keys::key_pool(provider, model), key_id)
            .await
            .map_err(|e| storage_err("add key to pool", e))
    }

    pub async fn clear_key_pool(&self, provider: &str, model: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys::key_pool(provider, model))
            .await
            .map_err(|e| storage_err("clear key pool", e))
    }

    pub async fn pool_members(&self, provider: &str, model: &str) -> GatewayResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(keys::key_pool(provider, model))
            .await
            .map_err(|e| storage_err("list pool members", e))
    }

    pub async fn pool_size(&self, provider: &str, model: &str) -> GatewayResult<u64> {
        let mut conn = self.conn.clone();
        conn.scard(keys::key_pool(provider, model))
            .await
            .map_err(|e| storage_err("pool size", e))
    }

    /// All (provider, model) pools currently present.
    pub async fn list_pools(&self) -> GatewayResult<Vec<(String, String)>> {
        let mut conn = self.conn.clone();
        let found: Vec<String> = conn
            .keys(keys::KEY_POOL_PATTERN)
            .await
            .map_err(|e| storage_err("list pools", e))?;
        Ok(found.iter().filter_map(|k| keys::parse_pool_key(k)).collect())
    }

    // ==================== USAGE COUNTERS ====================

    /// Atomically add to the rolling counters and refresh `last_used`.
    pub async fn track_key_usage(&self, key_id: &str, tokens: u64) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let hour_key = keys::key_usage_hour(key_id);
        let total_key = keys::key_usage_total(key_id);
        let last_used_key = keys::key_last_used(key_id);

        conn.incr::<_, _, i64>(&hour_key, tokens as i64)
            .await
            .map_err(|e| storage_err("track hourly usage", e))?;
        conn.expire::<_, ()>(&hour_key, KEY_USAGE_HOUR_TTL_SECS as i64)
            .await
            .map_err(|e| storage_err("expire hourly usage", e))?;

        conn.incr::<_, _, i64>(&total_key, tokens as i64)
            .await
            .map_err(|e| storage_err("track total usage", e))?;
        conn.expire::<_, ()>(&total_key, KEY_USAGE_TOTAL_TTL_SECS as i64)
            .await
            .map_err(|e| storage_err("expire total usage", e))?;

        conn.set_ex::<_, _, ()>(&last_used_key, chrono::Utc::now().timestamp(), KEY_LAST_USED_TTL_SECS)
            .await
            .map_err(|e| storage_err("set last used", e))?;

        tracing::debug!(key_id, tokens, "tracked key usage");
        Ok(())
    }

    pub async fn key_usage(&self, key_id: &str) -> GatewayResult<KeyUsage> {
        let mut conn = self.conn.clone();
        let tokens_hour: Option<u64> = conn
            .get(keys::key_usage_hour(key_id))
            .await
            .map_err(|e| storage_err("get hourly usage", e))?;
        let tokens_total: Option<u64> = conn
            .get(keys::key_usage_total(key_id))
            .await
            .map_err(|e| storage_err("get total usage", e))?;
        let last_used: Option<i64> = conn
            .get(keys::key_last_used(key_id))
            .await
            .map_err(|e| storage_err("get last used", e))?;
        Ok(KeyUsage {
            tokens_hour: tokens_hour.unwrap_or(0),
            tokens_total: tokens_total.unwrap_or(0),
            last_used,
        })
    }

    // ==================== SESSION KEY WEIGHTS ====================

    pub async fn key_weight(&self, session_id: &str, key_id: &str) -> GatewayResult<f64> {
        let mut conn = self.conn.clone();
        let weight: Option<f64> = conn
            .get(keys::session_key_weight(session_id, key_id))
            .await
            .map_err(|e| storage_err("get key weight", e))?;
        Ok(weight.unwrap_or(DEFAULT_KEY_WEIGHT))
    }

    pub async fn set_key_weight(
        &self,
        session_id: &str,
        key_id: &str,
        weight: f64,
        ttl_secs: u64,
    ) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(keys::session_key_weight(session_id, key_id), weight, ttl_secs)
            .await
            .map_err(|e| storage_err("set key weight", e))
    }

    /// Reset all weights a session holds back to the default.
    pub async fn reset_session_weights(&self, session_id: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let found: Vec<String> = conn
            .keys(keys::session_key_weight_pattern(session_id))
            .await
            .map_err(|e| storage_err("list session weights", e))?;
        for weight_key in found {
            if let Some((session_id, key_id)) = keys::parse_weight_key(&weight_key) {
                self.set_key_weight(&session_id, &key_id, DEFAULT_KEY_WEIGHT, SESSION_TTL_SECS)
                    .await?;
            }
        }
        tracing::debug!(session_id, "reset session key weights");
        Ok(())
    }

    /// Sessions that currently hold any key weight.
    pub async fn active_weight_sessions(&self) -> GatewayResult<HashSet<String>> {
        let mut conn = self.conn.clone();
        let found: Vec<String> = conn
            .keys(keys::SESSION_KEY_WEIGHT_PATTERN)
            .await
            .map_err(|e| storage_err("list weight sessions", e))?;
        Ok(found
            .iter()
            .filter_map(|k| keys::parse_weight_key(k).map(|(session, _)| session))
            .collect())
    }

    /// Weight 0 across every active session makes a key globally unusable,
    /// e.g. when it runs out of credits upstream.
    pub async fn disable_key_globally(&self, key_id: &str) -> GatewayResult<usize> {
        let sessions = self.active_weight_sessions().await?;
        for session_id in &sessions {
            self.set_key_weight(session_id, key_id, 0.0, SESSION_TTL_SECS).await?;
        }
        tracing::info!(key_id, sessions = sessions.len(), "disabled key globally");
        Ok(sessions.len())
    }

    // ==================== USER SESSION HISTORY ====================

    pub async fn track_user_session(&self, user_id: i64, session_id: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let key = keys::user_sessions(user_id);
        conn.sadd::<_, _, ()>(&key, session_id)
            .await
            .map_err(|e| storage_err("track user session", e))?;
        conn.expire::<_, ()>(&key, USER_SESSIONS_TTL_SECS as i64)
            .await
            .map_err(|e| storage_err("expire user sessions", e))
    }

    pub async fn was_user_session(&self, user_id: i64, session_id: &str) -> GatewayResult<bool> {
        let mut conn = self.conn.clone();
        conn.sismember(keys::user_sessions(user_id), session_id)
            .await
            .map_err(|e| storage_err("check user session", e))
    }

    pub async fn remove_user_session(&self, user_id: i64, session_id: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(keys::user_sessions(user_id), session_id)
            .await
            .map_err(|e| storage_err("remove user session", e))
    }

    // ==================== SECURITY EVENTS ====================

    pub async fn record_suspicious_activity(
        &self,
        record: &SuspiciousActivity,
    ) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let key = keys::suspicious_activity(&record.timestamp, record.user_id);
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(key, payload, SUSPICIOUS_ACTIVITY_TTL_SECS)
            .await
            .map_err(|e| storage_err("record suspicious activity", e))?;
        tracing::warn!(
            user_id = record.user_id,
            session_id = %record.session_id,
            ip_address = %record.ip_address,
            "suspicious activity recorded"
        );
        Ok(())
    }
}
