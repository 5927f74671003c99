//! The notification shape pushed to connected clients.

use chrono::{DateTime, Utc};
use outreach_events::EventKind;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub campaign_id: Uuid,
    pub priority: Priority,
}

impl Notification {
    /// Translates a pipeline event into a client-facing notification. Events
    /// with no recognisable campaign grouping, or no client-facing meaning
    /// at all, have no representation and are filtered out by the caller.
    pub fn from_event(event: &outreach_events::DomainEvent, campaign_id: Uuid) -> Option<Self> {
        let (kind, title, message, priority) = match event.kind {
            EventKind::MatchCreated => (
                "match.created",
                "New match found",
                "A new podcast match is ready for review.",
                Priority::Normal,
            ),
            EventKind::ClientMatchesReady => (
                "client.matches.ready",
                "Matches ready",
                "Your campaign's latest discovery run has new matches ready for review.",
                Priority::Normal,
            ),
            EventKind::MatchApproved => (
                "match.approved",
                "Match approved",
                "A match suggestion was approved and is headed to outreach.",
                Priority::Low,
            ),
            EventKind::ClientLimitReached => (
                "client.limit.reached",
                "Weekly limit reached",
                "Your plan's weekly match allowance has been reached.",
                Priority::Urgent,
            ),
            _ => return None,
        };

        Some(Self {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            data: event.data.clone(),
            timestamp: event.timestamp,
            campaign_id,
            priority,
        })
    }
}
