//! Selection orchestrator — decides between forced exploration and UCB
//! scoring, and records the resulting exposure.
//!
//! Every candidate must be exposed at least once before it is ranked.
//! The engine therefore first asks the ledger for members with zero
//! exposures and, if any exist, exposes the first of them without
//! scoring. Only when every member has been seen does the scorer run.
//! The zero-exposure check and the later scoring read are not atomic:
//! two concurrent selections can both force-expose the same candidate
//! or score from stale counters. The invariant holds eventually; the
//! single point of atomicity is the ledger's counter increment.

use crate::ledger::Ledger;
use crate::scorer::Scorer;
use chrono::Utc;
use rotation_core::events::Notifier;
use rotation_core::types::{CandidateId, EventKind, RotationEvent};
use rotation_core::{RotationError, RotationResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of resolving one selection request. The explore/exploit split
/// is carried in the type so the scoring path can never be entered with
/// a zero-exposure candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Forced exploration: the candidate had never been exposed in this
    /// context and was chosen without scoring.
    Explore { candidate_id: CandidateId },
    /// Steady state: every member had at least one exposure and the
    /// candidate won the UCB ranking.
    Exploit { candidate_id: CandidateId, score: f64 },
}

impl Decision {
    pub fn candidate_id(&self) -> &str {
        match self {
            Decision::Explore { candidate_id } | Decision::Exploit { candidate_id, .. } => {
                candidate_id
            }
        }
    }

    pub fn is_explore(&self) -> bool {
        matches!(self, Decision::Explore { .. })
    }
}

/// Orchestrates candidate selection against the ledger and publishes the
/// resulting events. One instance serves all contexts concurrently; it
/// holds no per-context state of its own.
pub struct RotationEngine {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    scorer: Scorer,
}

impl RotationEngine {
    pub fn new(ledger: Arc<dyn Ledger>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_scorer(ledger, notifier, Scorer::new())
    }

    pub fn with_scorer(
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        scorer: Scorer,
    ) -> Self {
        Self {
            ledger,
            notifier,
            scorer,
        }
    }

    /// Select the next candidate to show in `context_id` and record its
    /// exposure. Returns the decision only after the ledger write has
    /// succeeded; on error nothing has been recorded.
    pub async fn select_candidate(&self, context_id: &str) -> RotationResult<Decision> {
        let members = self.ledger.members_of(context_id).await?;
        if members.is_empty() {
            metrics::counter!("rotation.empty_contexts").increment(1);
            return Err(RotationError::NoCandidatesInContext(context_id.to_string()));
        }

        let decision = match self.resolve_forced_exploration(context_id).await? {
            Some(decision) => decision,
            None => self.resolve_by_score(context_id, &members).await?,
        };

        self.record_exposure(context_id, decision.candidate_id())
            .await?;

        info!(
            context_id,
            candidate_id = decision.candidate_id(),
            explored = decision.is_explore(),
            "Candidate selected"
        );
        metrics::counter!("rotation.selections").increment(1);

        Ok(decision)
    }

    /// Forced-exploration phase: if any member of the context has zero
    /// exposures, pick the first one in the ledger's natural order.
    async fn resolve_forced_exploration(
        &self,
        context_id: &str,
    ) -> RotationResult<Option<Decision>> {
        let unexposed = self.ledger.unexposed_members(context_id).await?;

        match unexposed.into_iter().next() {
            Some(candidate_id) => {
                debug!(context_id, candidate_id = %candidate_id, "Forcing exploration");
                metrics::counter!("rotation.forced_explorations").increment(1);
                Ok(Some(Decision::Explore { candidate_id }))
            }
            None => Ok(None),
        }
    }

    /// Scoring phase: every member has at least one exposure, rank them
    /// by UCB score over a snapshot of the counters.
    async fn resolve_by_score(
        &self,
        context_id: &str,
        members: &[CandidateId],
    ) -> RotationResult<Decision> {
        let exposures = self.ledger.exposure_counts(context_id).await?;
        let engagements = self.ledger.engagement_counts(context_id).await?;

        let total_exposures: u64 = members
            .iter()
            .map(|candidate| exposures.get(candidate).copied().unwrap_or(0))
            .sum();

        let mut scores = HashMap::with_capacity(members.len());
        for candidate in members {
            let views = exposures.get(candidate).copied().unwrap_or(0);
            debug_assert!(views > 0, "scoring reached with an unexposed candidate");
            let clicks = engagements.get(candidate).copied().unwrap_or(0);
            scores.insert(
                candidate.clone(),
                self.scorer.score(views, clicks, total_exposures),
            );
        }

        let candidate_id = self.scorer.pick_winner(&scores)?;
        let score = scores[&candidate_id];

        Ok(Decision::Exploit {
            candidate_id,
            score,
        })
    }

    /// Record an exposure in the ledger and publish it downstream.
    /// Used internally by selection and exposed for the transport layer.
    pub async fn record_exposure(
        &self,
        context_id: &str,
        candidate_id: &str,
    ) -> RotationResult<()> {
        let at = Utc::now();
        self.ledger
            .record_exposure(context_id, candidate_id, at)
            .await?;
        self.publish(EventKind::Exposure, context_id, candidate_id, at)
            .await;
        Ok(())
    }

    /// Record an engagement (e.g. a click) in the ledger and publish it
    /// downstream.
    pub async fn record_engagement(
        &self,
        context_id: &str,
        candidate_id: &str,
    ) -> RotationResult<()> {
        let at = Utc::now();
        self.ledger
            .record_engagement(context_id, candidate_id, at)
            .await?;
        self.publish(EventKind::Engagement, context_id, candidate_id, at)
            .await;
        Ok(())
    }

    /// Add a candidate to a context's rotation set. A fresh candidate
    /// has zero exposures, so the next selection in that context will
    /// force-explore it.
    pub async fn add_candidate(&self, context_id: &str, candidate_id: &str) -> RotationResult<()> {
        self.ledger.add_member(context_id, candidate_id).await
    }

    /// Remove a candidate from a context's rotation set. Returns false
    /// when the candidate was not a member.
    pub async fn remove_candidate(
        &self,
        context_id: &str,
        candidate_id: &str,
    ) -> RotationResult<bool> {
        self.ledger.remove_member(context_id, candidate_id).await
    }

    /// Best-effort publish: a notifier failure must not roll back the
    /// ledger write that preceded it, so it is logged and swallowed.
    async fn publish(
        &self,
        kind: EventKind,
        context_id: &str,
        candidate_id: &str,
        at: chrono::DateTime<Utc>,
    ) {
        let event = RotationEvent::new(kind, context_id, candidate_id, at);
        if let Err(e) = self.notifier.publish(&event).await {
            warn!(
                error = %e,
                context_id,
                candidate_id,
                kind = ?kind,
                "Event publish failed, ledger write kept"
            );
            metrics::counter!("rotation.publish_errors").increment(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rotation_core::events::{capture_notifier, noop_notifier};

    fn engine_with(
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
    ) -> RotationEngine {
        RotationEngine::with_scorer(ledger, notifier, Scorer::with_seed(42))
    }

    async fn seeded_ledger(context: &str, candidates: &[&str]) -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        for candidate in candidates {
            ledger.add_member(context, candidate).await.unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn test_empty_context_is_an_error() {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(ledger, noop_notifier());

        let result = engine.select_candidate("slot-1").await;
        assert!(matches!(
            result,
            Err(RotationError::NoCandidatesInContext(ref context)) if context == "slot-1"
        ));
    }

    #[tokio::test]
    async fn test_forced_exploration_covers_every_candidate_once() {
        let ledger = seeded_ledger("slot-1", &["banner-1", "banner-2", "banner-3"]).await;
        let engine = engine_with(ledger.clone(), noop_notifier());

        let mut seen = Vec::new();
        for _ in 0..3 {
            let decision = engine.select_candidate("slot-1").await.unwrap();
            assert!(decision.is_explore());
            assert!(!seen.contains(&decision.candidate_id().to_string()));
            seen.push(decision.candidate_id().to_string());
        }

        let exposures = ledger.exposure_counts("slot-1").await.unwrap();
        for candidate in ["banner-1", "banner-2", "banner-3"] {
            assert_eq!(exposures[candidate], 1, "{candidate} not exposed exactly once");
        }

        // Fourth call: every member has one exposure, scoring takes over.
        let decision = engine.select_candidate("slot-1").await.unwrap();
        assert!(matches!(decision, Decision::Exploit { .. }));
    }

    #[tokio::test]
    async fn test_forced_exploration_follows_ledger_order() {
        let ledger = seeded_ledger("slot-1", &["banner-2", "banner-1"]).await;
        let engine = engine_with(ledger, noop_notifier());

        let decision = engine.select_candidate("slot-1").await.unwrap();
        assert_eq!(decision.candidate_id(), "banner-2");
    }

    #[tokio::test]
    async fn test_new_member_retriggers_exploration() {
        let ledger = seeded_ledger("slot-1", &["banner-1", "banner-2"]).await;
        let engine = engine_with(ledger.clone(), noop_notifier());

        engine.select_candidate("slot-1").await.unwrap();
        engine.select_candidate("slot-1").await.unwrap();

        engine.add_candidate("slot-1", "banner-3").await.unwrap();

        let decision = engine.select_candidate("slot-1").await.unwrap();
        assert_eq!(decision.candidate_id(), "banner-3");
        assert!(decision.is_explore());
    }

    #[tokio::test]
    async fn test_selection_publishes_exposure_events() {
        let ledger = seeded_ledger("slot-1", &["banner-1"]).await;
        let notifier = capture_notifier();
        let engine = engine_with(ledger, notifier.clone());

        engine.select_candidate("slot-1").await.unwrap();

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Exposure);
        assert_eq!(events[0].context_id, "slot-1");
        assert_eq!(events[0].candidate_id, "banner-1");
    }

    #[tokio::test]
    async fn test_record_engagement_increments_by_exactly_one_each() {
        let ledger = seeded_ledger("slot-1", &["banner-1"]).await;
        ledger.add_member("slot-2", "banner-9").await.unwrap();
        let notifier = capture_notifier();
        let engine = engine_with(ledger.clone(), notifier.clone());

        engine.record_engagement("slot-1", "banner-1").await.unwrap();
        // Unrelated context interleaved.
        engine.record_engagement("slot-2", "banner-9").await.unwrap();
        engine.record_engagement("slot-1", "banner-1").await.unwrap();

        let engagements = ledger.engagement_counts("slot-1").await.unwrap();
        assert_eq!(engagements["banner-1"], 2);
        assert_eq!(notifier.count_kind(EventKind::Engagement), 3);
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn publish(&self, _event: &RotationEvent) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("nats connection lost"))
        }
    }

    #[tokio::test]
    async fn test_notifier_failure_is_swallowed() {
        let ledger = seeded_ledger("slot-1", &["banner-1"]).await;
        let engine = engine_with(ledger.clone(), Arc::new(FailingNotifier));

        let decision = engine.select_candidate("slot-1").await.unwrap();
        assert_eq!(decision.candidate_id(), "banner-1");

        engine.record_engagement("slot-1", "banner-1").await.unwrap();

        // The ledger writes survived the publish failures.
        let exposures = ledger.exposure_counts("slot-1").await.unwrap();
        let engagements = ledger.engagement_counts("slot-1").await.unwrap();
        assert_eq!(exposures["banner-1"], 1);
        assert_eq!(engagements["banner-1"], 1);
    }

    /// Ledger that fails every write, for error-propagation tests.
    struct WriteFailingLedger {
        inner: MemoryLedger,
    }

    #[async_trait]
    impl Ledger for WriteFailingLedger {
        async fn members_of(&self, context_id: &str) -> RotationResult<Vec<CandidateId>> {
            self.inner.members_of(context_id).await
        }

        async fn unexposed_members(&self, context_id: &str) -> RotationResult<Vec<CandidateId>> {
            self.inner.unexposed_members(context_id).await
        }

        async fn exposure_counts(
            &self,
            context_id: &str,
        ) -> RotationResult<HashMap<CandidateId, u64>> {
            self.inner.exposure_counts(context_id).await
        }

        async fn engagement_counts(
            &self,
            context_id: &str,
        ) -> RotationResult<HashMap<CandidateId, u64>> {
            self.inner.engagement_counts(context_id).await
        }

        async fn record_exposure(
            &self,
            _context_id: &str,
            _candidate_id: &str,
            _at: DateTime<Utc>,
        ) -> RotationResult<()> {
            Err(RotationError::WriteFailed("disk full".to_string()))
        }

        async fn record_engagement(
            &self,
            _context_id: &str,
            _candidate_id: &str,
            _at: DateTime<Utc>,
        ) -> RotationResult<()> {
            Err(RotationError::WriteFailed("disk full".to_string()))
        }

        async fn add_member(&self, context_id: &str, candidate_id: &str) -> RotationResult<()> {
            self.inner.add_member(context_id, candidate_id).await
        }

        async fn remove_member(
            &self,
            context_id: &str,
            candidate_id: &str,
        ) -> RotationResult<bool> {
            self.inner.remove_member(context_id, candidate_id).await
        }
    }

    #[tokio::test]
    async fn test_ledger_write_failure_propagates_and_nothing_is_published() {
        let failing = WriteFailingLedger {
            inner: MemoryLedger::new(),
        };
        failing.add_member("slot-1", "banner-1").await.unwrap();

        let notifier = capture_notifier();
        let engine = engine_with(Arc::new(failing), notifier.clone());

        let result = engine.select_candidate("slot-1").await;
        assert!(matches!(result, Err(RotationError::WriteFailed(_))));

        let result = engine.record_engagement("slot-1", "banner-1").await;
        assert!(matches!(result, Err(RotationError::WriteFailed(_))));

        // No event may be published for a write that never landed.
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_steady_state_favors_engaged_candidate() {
        let ledger = seeded_ledger("slot-1", &["banner-1", "banner-2", "banner-3"]).await;
        let engine = engine_with(ledger.clone(), noop_notifier());

        // Cover the forced-exploration phase.
        for _ in 0..3 {
            engine.select_candidate("slot-1").await.unwrap();
        }

        for _ in 0..5 {
            engine.record_engagement("slot-1", "banner-2").await.unwrap();
        }

        let mut wins: HashMap<String, u32> = HashMap::new();
        for _ in 0..200 {
            let decision = engine.select_candidate("slot-1").await.unwrap();
            *wins.entry(decision.candidate_id().to_string()).or_insert(0) += 1;
        }

        let engaged = wins.get("banner-2").copied().unwrap_or(0);
        for candidate in ["banner-1", "banner-3"] {
            let other = wins.get(candidate).copied().unwrap_or(0);
            assert!(
                other < engaged,
                "{candidate} ({other}) not below engaged candidate ({engaged})"
            );
        }
    }
}
