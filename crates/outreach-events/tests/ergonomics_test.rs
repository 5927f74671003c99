//! Behavioral tests for the event bus: no Postgres needed, pure in-process
//! behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use outreach_events::{DomainEvent, EventBus, EventHandler, EventKind};
use serde_json::json;

struct CountingHandler {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle(&self, _event: &DomainEvent) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "counting_handler"
    }
}

struct PanickingHandler;

#[async_trait]
impl EventHandler for PanickingHandler {
    async fn handle(&self, _event: &DomainEvent) {
        panic!("boom");
    }

    fn name(&self) -> &str {
        "panicking_handler"
    }
}

fn sample_event(campaign_id: &str) -> DomainEvent {
    DomainEvent::new(
        EventKind::MediaDiscovered,
        "media",
        "42",
        json!({ "campaign_id": campaign_id }),
    )
}

#[tokio::test]
async fn publish_delivers_to_all_subscribed_handlers() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    bus.subscribe(
        EventKind::MediaDiscovered,
        Arc::new(CountingHandler { count: count.clone() }),
    )
    .await;
    bus.subscribe(
        EventKind::MediaDiscovered,
        Arc::new(CountingHandler { count: count.clone() }),
    )
    .await;

    bus.publish(sample_event("c1")).await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn one_handler_panicking_does_not_stop_peers() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    bus.subscribe(EventKind::MediaDiscovered, Arc::new(PanickingHandler)).await;
    bus.subscribe(
        EventKind::MediaDiscovered,
        Arc::new(CountingHandler { count: count.clone() }),
    )
    .await;

    bus.publish(sample_event("c1")).await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn history_is_capped_and_filterable() {
    let bus = EventBus::new();
    for i in 0..5 {
        bus.publish(sample_event(&format!("c{i}"))).await;
    }

    let all = bus.history(100, None).await;
    assert_eq!(all.len(), 5);

    let filtered = bus.history(100, Some(EventKind::MediaDiscovered)).await;
    assert_eq!(filtered.len(), 5);

    let other = bus.history(100, Some(EventKind::MatchCreated)).await;
    assert!(other.is_empty());
}

#[tokio::test]
async fn history_limit_keeps_most_recent() {
    let bus = EventBus::new();
    for i in 0..10 {
        bus.publish(sample_event(&format!("c{i}"))).await;
    }
    let recent = bus.history(3, None).await;
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[2].campaign_id(), Some("c9"));
}

#[tokio::test]
async fn ordered_subscriber_preserves_publish_order_within_campaign() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe_ordered().await;

    for i in 0..20 {
        bus.publish(sample_event("same-campaign")).await;
        let _ = i;
    }

    let mut received = Vec::new();
    for _ in 0..20 {
        received.push(rx.recv().await.expect("event"));
    }
    // All events published sequentially by a single awaiting caller must arrive in
    // the same order they were published.
    for (i, event) in received.iter().enumerate() {
        assert_eq!(event.entity_id, "42");
        assert_eq!(event.campaign_id(), Some("same-campaign"));
        let _ = i;
    }
}

#[tokio::test]
async fn events_for_entity_filters_by_id() {
    let bus = EventBus::new();
    bus.publish(sample_event("c1")).await;
    bus.publish(DomainEvent::new(
        EventKind::EnrichmentCompleted,
        "media",
        "99",
        json!({}),
    ))
    .await;

    let entity_events = bus.events_for_entity("42").await;
    assert_eq!(entity_events.len(), 1);
    assert_eq!(entity_events[0].entity_id, "42");
}

#[tokio::test]
async fn handler_count_reflects_subscriptions() {
    let bus = EventBus::new();
    assert_eq!(bus.handler_count(EventKind::MatchCreated).await, 0);
    bus.subscribe(
        EventKind::MatchCreated,
        Arc::new(CountingHandler { count: Arc::new(AtomicUsize::new(0)) }),
    )
    .await;
    assert_eq!(bus.handler_count(EventKind::MatchCreated).await, 1);
}
