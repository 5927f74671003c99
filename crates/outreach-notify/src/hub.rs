//! Bridges the pipeline's event bus to connected WebSocket clients. Grounded
//! on the same shape as a routed notification backend: one background task
//! drains a single ordered stream and fans each event out to whoever is
//! listening, logging and moving on when a destination can't take it rather
//! than letting one bad connection stall the others.

use outreach_events::EventBus;
use tracing::{debug, info};
use uuid::Uuid;

use crate::registry::ConnectionRegistry;
use crate::types::Notification;

pub struct NotifyHub {
    registry: ConnectionRegistry,
}

impl NotifyHub {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Spawns the fan-out task and returns immediately. The task runs for
    /// as long as `events` lives, reading its ordered subscription so that
    /// within one campaign, notifications arrive in the order the pipeline
    /// raised them.
    pub fn spawn(self, events: EventBus) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut rx = events.subscribe_ordered().await;
            info!("notification hub listening for domain events");
            while let Some(event) = rx.recv().await {
                let Some(campaign_id) = event.campaign_id().and_then(|s| Uuid::parse_str(s).ok())
                else {
                    continue;
                };
                let Some(notification) = Notification::from_event(&event, campaign_id) else {
                    continue;
                };
                let delivered = self.registry.push(campaign_id, notification).await;
                debug!(%campaign_id, delivered, "fanned out domain event to connected clients");
            }
        })
    }
}
