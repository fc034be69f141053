//! Notification channel boundary — trait for publishing exposure and
//! engagement events to downstream analytics.
//!
//! The engine accepts an `Arc<dyn Notifier>` and treats every publish as
//! best-effort: a failure is logged and swallowed, never surfaced to the
//! caller of a selection or recording operation.

use crate::types::{EventKind, RotationEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Trait for publishing rotation events. Implementations route events to
/// NATS subjects or, in tests, to in-memory buffers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &RotationEvent) -> anyhow::Result<()>;
}

/// No-op notifier for tests and notifier-less deployments.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(&self, _event: &RotationEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory notifier that captures events for testing.
#[derive(Default)]
pub struct CaptureNotifier {
    events: Mutex<Vec<RotationEvent>>,
}

impl CaptureNotifier {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<RotationEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("notifier mutex poisoned").len()
    }

    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("notifier mutex poisoned").clear();
    }
}

#[async_trait]
impl Notifier for CaptureNotifier {
    async fn publish(&self, event: &RotationEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Convenience: create a no-op notifier for deployments without NATS.
pub fn noop_notifier() -> Arc<dyn Notifier> {
    Arc::new(NoopNotifier)
}

/// Convenience: create a capture notifier for tests.
pub fn capture_notifier() -> Arc<CaptureNotifier> {
    Arc::new(CaptureNotifier::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_capture_notifier() {
        let notifier = capture_notifier();
        assert_eq!(notifier.count(), 0);

        notifier
            .publish(&RotationEvent::new(
                EventKind::Exposure,
                "slot-1",
                "banner-1",
                Utc::now(),
            ))
            .await
            .unwrap();
        notifier
            .publish(&RotationEvent::new(
                EventKind::Engagement,
                "slot-1",
                "banner-1",
                Utc::now(),
            ))
            .await
            .unwrap();

        assert_eq!(notifier.count(), 2);
        assert_eq!(notifier.count_kind(EventKind::Exposure), 1);
        assert_eq!(notifier.count_kind(EventKind::Engagement), 1);

        let events = notifier.events();
        assert_eq!(events[0].context_id, "slot-1");
        assert_eq!(events[1].kind, EventKind::Engagement);
    }

    #[tokio::test]
    async fn test_noop_notifier() {
        let notifier = noop_notifier();
        notifier
            .publish(&RotationEvent::new(
                EventKind::Exposure,
                "slot-1",
                "banner-1",
                Utc::now(),
            ))
            .await
            .unwrap();
    }
}
