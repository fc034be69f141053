//! NATS-backed notifier — publishes exposure/engagement events to a
//! configured subject for downstream analytics consumers.
//!
//! Publication is best-effort by contract: the engine logs and swallows
//! any error returned from here, and the ledger write it describes is
//! never rolled back.

use async_trait::async_trait;
use rotation_core::config::NatsConfig;
use rotation_core::events::Notifier;
use rotation_core::types::RotationEvent;
use tracing::{debug, info};

pub struct NatsNotifier {
    client: async_nats::Client,
    subject: String,
}

impl NatsNotifier {
    pub async fn connect(config: &NatsConfig) -> anyhow::Result<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "nats://localhost:4222".to_string());

        let client = async_nats::ConnectOptions::new()
            .max_reconnects(Some(config.max_reconnects))
            .connect(&url)
            .await?;

        info!(url = %url, subject = %config.subject, "NATS connection established");

        Ok(Self {
            client,
            subject: config.subject.clone(),
        })
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn publish(&self, event: &RotationEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            event_id = %event.event_id,
            kind = ?event.kind,
            context_id = %event.context_id,
            "Event published"
        );
        metrics::counter!("notify.events_published").increment(1);
        Ok(())
    }
}
