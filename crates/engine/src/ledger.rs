//! Event-ledger boundary — rotation membership and exposure/engagement
//! counters.
//!
//! The ledger is the source of truth for which candidates belong to a
//! context and how often each has been shown and engaged with. Counters
//! are monotonically non-decreasing and mutated only through the record
//! calls; backends must make the increment itself atomic (the engine
//! performs no locking around its read-then-write sequence).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rotation_core::types::{CandidateId, ContextId};
use rotation_core::RotationResult;
use std::collections::HashMap;

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Candidates in the context's rotation set, in the ledger's natural
    /// (insertion) order. Forced exploration relies on this order being
    /// stable between calls.
    async fn members_of(&self, context_id: &str) -> RotationResult<Vec<CandidateId>>;

    /// Members of the context with zero recorded exposures, in the same
    /// order as [`Ledger::members_of`].
    async fn unexposed_members(&self, context_id: &str) -> RotationResult<Vec<CandidateId>>;

    async fn exposure_counts(&self, context_id: &str)
        -> RotationResult<HashMap<CandidateId, u64>>;

    async fn engagement_counts(
        &self,
        context_id: &str,
    ) -> RotationResult<HashMap<CandidateId, u64>>;

    async fn record_exposure(
        &self,
        context_id: &str,
        candidate_id: &str,
        at: DateTime<Utc>,
    ) -> RotationResult<()>;

    async fn record_engagement(
        &self,
        context_id: &str,
        candidate_id: &str,
        at: DateTime<Utc>,
    ) -> RotationResult<()>;

    async fn add_member(&self, context_id: &str, candidate_id: &str) -> RotationResult<()>;

    /// Returns false when the candidate was not in the rotation set.
    async fn remove_member(&self, context_id: &str, candidate_id: &str) -> RotationResult<bool>;
}

/// In-memory ledger for tests and single-node development runs.
/// Counters live in DashMaps keyed by (context, candidate); the entry
/// API makes each increment atomic.
#[derive(Default)]
pub struct MemoryLedger {
    members: DashMap<ContextId, Vec<CandidateId>>,
    exposures: DashMap<(ContextId, CandidateId), u64>,
    engagements: DashMap<(ContextId, CandidateId), u64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts_for(
        &self,
        counters: &DashMap<(ContextId, CandidateId), u64>,
        context_id: &str,
    ) -> HashMap<CandidateId, u64> {
        let members = self
            .members
            .get(context_id)
            .map(|m| m.clone())
            .unwrap_or_default();

        members
            .into_iter()
            .map(|candidate| {
                let count = counters
                    .get(&(context_id.to_string(), candidate.clone()))
                    .map(|c| *c)
                    .unwrap_or(0);
                (candidate, count)
            })
            .collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn members_of(&self, context_id: &str) -> RotationResult<Vec<CandidateId>> {
        Ok(self
            .members
            .get(context_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn unexposed_members(&self, context_id: &str) -> RotationResult<Vec<CandidateId>> {
        let members = self.members_of(context_id).await?;
        Ok(members
            .into_iter()
            .filter(|candidate| {
                self.exposures
                    .get(&(context_id.to_string(), candidate.clone()))
                    .map(|c| *c == 0)
                    .unwrap_or(true)
            })
            .collect())
    }

    async fn exposure_counts(
        &self,
        context_id: &str,
    ) -> RotationResult<HashMap<CandidateId, u64>> {
        Ok(self.counts_for(&self.exposures, context_id))
    }

    async fn engagement_counts(
        &self,
        context_id: &str,
    ) -> RotationResult<HashMap<CandidateId, u64>> {
        Ok(self.counts_for(&self.engagements, context_id))
    }

    async fn record_exposure(
        &self,
        context_id: &str,
        candidate_id: &str,
        _at: DateTime<Utc>,
    ) -> RotationResult<()> {
        *self
            .exposures
            .entry((context_id.to_string(), candidate_id.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn record_engagement(
        &self,
        context_id: &str,
        candidate_id: &str,
        _at: DateTime<Utc>,
    ) -> RotationResult<()> {
        *self
            .engagements
            .entry((context_id.to_string(), candidate_id.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn add_member(&self, context_id: &str, candidate_id: &str) -> RotationResult<()> {
        let mut members = self.members.entry(context_id.to_string()).or_default();
        if !members.iter().any(|c| c == candidate_id) {
            members.push(candidate_id.to_string());
        }
        Ok(())
    }

    async fn remove_member(&self, context_id: &str, candidate_id: &str) -> RotationResult<bool> {
        let Some(mut members) = self.members.get_mut(context_id) else {
            return Ok(false);
        };
        let before = members.len();
        members.retain(|c| c != candidate_id);
        Ok(members.len() < before)
    }
}
