//! Redis-backed event ledger.
//!
//! Key layout per context:
//! - `rotation:{context}:members`     sorted set, scored by insertion
//!   time so `ZRANGE` yields a stable natural order.
//! - `rotation:{context}:exposures`   hash candidate -> count.
//! - `rotation:{context}:engagements` hash candidate -> count.
//!
//! Counters are mutated exclusively with `HINCRBY`, which is the single
//! place atomicity is provided: the engine's read-then-write sequence is
//! not serialized, and multiple service instances may share one Redis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use rotation_core::config::RedisConfig;
use rotation_core::types::CandidateId;
use rotation_core::{RotationError, RotationResult};
use rotation_engine::Ledger;
use std::collections::HashMap;
use tracing::info;

pub struct RedisLedger {
    client: redis::Client,
}

impl RedisLedger {
    /// Connect to Redis and verify connectivity with a PING.
    pub async fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        info!(url = %config.url, "Connecting to Redis ledger");

        let client = redis::Client::open(config.url.as_str())?;

        let mut conn = tokio::time::timeout(
            std::time::Duration::from_millis(config.connect_timeout_ms),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connect timed out"))??;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis ledger connection established");

        Ok(Self { client })
    }

    async fn connection(&self) -> RotationResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RotationError::LookupFailed(e.to_string()))
    }

    fn members_key(context_id: &str) -> String {
        format!("rotation:{context_id}:members")
    }

    fn exposures_key(context_id: &str) -> String {
        format!("rotation:{context_id}:exposures")
    }

    fn engagements_key(context_id: &str) -> String {
        format!("rotation:{context_id}:engagements")
    }

    async fn counts(&self, key: &str) -> RotationResult<HashMap<CandidateId, u64>> {
        let mut conn = self.connection().await?;
        let counts: HashMap<String, u64> = conn
            .hgetall(key)
            .await
            .map_err(|e| RotationError::LookupFailed(e.to_string()))?;
        Ok(counts)
    }

    async fn increment(&self, key: &str, candidate_id: &str) -> RotationResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RotationError::WriteFailed(e.to_string()))?;

        conn.hincr::<_, _, _, i64>(key, candidate_id, 1)
            .await
            .map_err(|e| {
                metrics::counter!("ledger.write_errors").increment(1);
                RotationError::WriteFailed(e.to_string())
            })?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for RedisLedger {
    async fn members_of(&self, context_id: &str) -> RotationResult<Vec<CandidateId>> {
        let mut conn = self.connection().await?;
        let members: Vec<String> = conn
            .zrange(Self::members_key(context_id), 0, -1)
            .await
            .map_err(|e| RotationError::LookupFailed(e.to_string()))?;
        Ok(members)
    }

    async fn unexposed_members(&self, context_id: &str) -> RotationResult<Vec<CandidateId>> {
        let members = self.members_of(context_id).await?;
        let exposures = self.counts(&Self::exposures_key(context_id)).await?;

        Ok(members
            .into_iter()
            .filter(|candidate| exposures.get(candidate).copied().unwrap_or(0) == 0)
            .collect())
    }

    async fn exposure_counts(
        &self,
        context_id: &str,
    ) -> RotationResult<HashMap<CandidateId, u64>> {
        self.counts(&Self::exposures_key(context_id)).await
    }

    async fn engagement_counts(
        &self,
        context_id: &str,
    ) -> RotationResult<HashMap<CandidateId, u64>> {
        self.counts(&Self::engagements_key(context_id)).await
    }

    async fn record_exposure(
        &self,
        context_id: &str,
        candidate_id: &str,
        _at: DateTime<Utc>,
    ) -> RotationResult<()> {
        self.increment(&Self::exposures_key(context_id), candidate_id)
            .await
    }

    async fn record_engagement(
        &self,
        context_id: &str,
        candidate_id: &str,
        _at: DateTime<Utc>,
    ) -> RotationResult<()> {
        self.increment(&Self::engagements_key(context_id), candidate_id)
            .await
    }

    async fn add_member(&self, context_id: &str, candidate_id: &str) -> RotationResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RotationError::WriteFailed(e.to_string()))?;

        // NX keeps the original insertion score on duplicate adds, so
        // re-adding a member never reorders the rotation.
        redis::cmd("ZADD")
            .arg(Self::members_key(context_id))
            .arg("NX")
            .arg(Utc::now().timestamp_millis())
            .arg(candidate_id)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| RotationError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn remove_member(&self, context_id: &str, candidate_id: &str) -> RotationResult<bool> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RotationError::WriteFailed(e.to_string()))?;

        let removed: i64 = conn
            .zrem(Self::members_key(context_id), candidate_id)
            .await
            .map_err(|e| RotationError::WriteFailed(e.to_string()))?;
        Ok(removed > 0)
    }
}
