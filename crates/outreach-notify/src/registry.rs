//! Connection bookkeeping: which sockets are listening for which campaign,
//! so the hub's fan-out knows who to push a notification to. Delivery is
//! best-effort — a socket whose send fails (client gone, buffer full) is
//! dropped from its campaign's list rather than retried.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::types::Notification;

struct Connection {
    user_id: Uuid,
    sender: mpsc::UnboundedSender<Notification>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    by_campaign: Arc<RwLock<HashMap<Uuid, Vec<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection for `(user_id, campaign_id)` and returns
    /// the receiver half the caller's socket loop should drain.
    pub async fn register(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.by_campaign
            .write()
            .await
            .entry(campaign_id)
            .or_default()
            .push(Connection { user_id, sender: tx });
        rx
    }

    /// Removes every connection registered for `user_id` under `campaign_id`.
    /// Called when a socket's read loop observes the client disconnect.
    pub async fn unregister(&self, user_id: Uuid, campaign_id: Uuid) {
        let mut guard = self.by_campaign.write().await;
        if let Some(conns) = guard.get_mut(&campaign_id) {
            conns.retain(|c| c.user_id != user_id);
            if conns.is_empty() {
                guard.remove(&campaign_id);
            }
        }
    }

    /// Best-effort fan-out to every socket currently registered for
    /// `campaign_id`. Returns the number of sockets the notification was
    /// actually handed to.
    pub async fn push(&self, campaign_id: Uuid, notification: Notification) -> usize {
        let mut guard = self.by_campaign.write().await;
        let Some(conns) = guard.get_mut(&campaign_id) else {
            return 0;
        };
        conns.retain(|c| c.sender.send(notification.clone()).is_ok());
        let delivered = conns.len();
        if conns.is_empty() {
            guard.remove(&campaign_id);
        }
        delivered
    }

    pub async fn connection_count(&self, campaign_id: Uuid) -> usize {
        self.by_campaign
            .read()
            .await
            .get(&campaign_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_events::{DomainEvent, EventKind};

    fn make_notification(campaign_id: Uuid) -> Notification {
        let event = DomainEvent::new(
            EventKind::MatchCreated,
            "match_suggestion",
            "1",
            serde_json::json!({ "campaign_id": campaign_id }),
        );
        Notification::from_event(&event, campaign_id).unwrap()
    }

    #[tokio::test]
    async fn push_delivers_to_registered_connection() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();
        let mut rx = registry.register(user_id, campaign_id).await;

        let delivered = registry.push(campaign_id, make_notification(campaign_id)).await;
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn push_to_unknown_campaign_delivers_nothing() {
        let registry = ConnectionRegistry::new();
        let delivered = registry.push(Uuid::new_v4(), make_notification(Uuid::new_v4())).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn unregister_stops_further_delivery() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();
        let _rx = registry.register(user_id, campaign_id).await;

        registry.unregister(user_id, campaign_id).await;
        assert_eq!(registry.connection_count(campaign_id).await, 0);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_push() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();
        let rx = registry.register(user_id, campaign_id).await;
        drop(rx);

        let delivered = registry.push(campaign_id, make_notification(campaign_id)).await;
        assert_eq!(delivered, 0);
        assert_eq!(registry.connection_count(campaign_id).await, 0);
    }
}
