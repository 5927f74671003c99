//! Core event types for the pipeline's in-process publish/subscribe bus. This is
//! an in-memory bus, not a durable event log — it exists for reliable in-process
//! fan-out plus a rolling history window for debugging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The domain event kinds the pipeline publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MediaDiscovered,
    EnrichmentCompleted,
    EpisodeTranscribed,
    MatchCreated,
    VettingCompleted,
    MatchApproved,
    MatchRejected,
    ClientMatchesReady,
    ClientLimitReached,
}

/// An event as delivered to subscribers and retained in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl DomainEvent {
    pub fn new(
        kind: EventKind,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            data,
            timestamp: Utc::now(),
            source: "pipeline".to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Best-effort campaign grouping key, if the payload carries one. Notifications
    /// fan out by `(user_id, campaign_id)`; most pipeline events stamp `campaign_id`
    /// into `data`.
    pub fn campaign_id(&self) -> Option<&str> {
        self.data.get("campaign_id").and_then(|v| v.as_str())
    }
}
