//! Shared types for the rotation service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Opaque identifier of a placement/slot requesting a selection.
pub type ContextId = String;

/// Opaque identifier of a selectable content item.
pub type CandidateId = String;

/// Kind of engagement-feedback event published downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A candidate was shown in a context.
    Exposure,
    /// A user acted on a previously shown candidate (e.g. a click).
    Engagement,
}

/// An exposure/engagement event as published to the notification channel
/// for downstream analytics. Best-effort: losing one of these never rolls
/// back the ledger write it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEvent {
    pub event_id: Uuid,
    pub kind: EventKind,
    pub context_id: ContextId,
    pub candidate_id: CandidateId,
    pub occurred_at: DateTime<Utc>,
}

impl RotationEvent {
    pub fn new(
        kind: EventKind,
        context_id: impl Into<ContextId>,
        candidate_id: impl Into<CandidateId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            context_id: context_id.into(),
            candidate_id: candidate_id.into(),
            occurred_at,
        }
    }
}
