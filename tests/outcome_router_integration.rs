use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use feedcourier::benefits::models::EntitlementDefaults;
use feedcourier::benefits::BenefitsResolver;
use feedcourier::bus::{topics, EventBus, InMemoryBus};
use feedcourier::events::models::DeliverArticlesEvent;
use feedcourier::events::OutcomeRouter;
use feedcourier::notifications::{BusNotifier, FeedDisabledNotification};
use feedcourier::store::memory::{
    MemoryConnectionStore, MemoryEntitlementStore, MemoryFeedStore,
};
use feedcourier::store::models::{
    Connection, ConnectionKind, Feed, FeedDisabledCode, HealthStatus,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn defaults() -> EntitlementDefaults {
    EntitlementDefaults {
        max_feeds: 5,
        max_user_feeds: 5,
        refresh_rate_seconds: 600,
        daily_article_limit: 50,
        supporter_daily_article_limit: 1000,
    }
}

fn feed(id: i64, url: &str) -> Feed {
    Feed {
        id,
        url: url.to_string(),
        owner_id: "owner-1".to_string(),
        lookup_key: None,
        user_refresh_rate_seconds: None,
        refresh_rate_seconds: 600,
        slot_offset_ms: 0,
        health_status: HealthStatus::Ok,
        disabled_code: None,
    }
}

fn connection(id: i64, feed_id: i64) -> Connection {
    Connection {
        id,
        feed_id,
        kind: ConnectionKind::Channel,
        disabled_code: None,
        disabled_detail: None,
        filters: None,
        format_options: None,
    }
}

struct Deployment {
    feeds: Arc<MemoryFeedStore>,
    connections: Arc<MemoryConnectionStore>,
    bus: Arc<InMemoryBus>,
}

/// Wire a router to an in-memory bus the way the daemon does and start it
async fn deploy() -> Deployment {
    let feeds = Arc::new(MemoryFeedStore::new());
    let connections = Arc::new(MemoryConnectionStore::new());
    let entitlements = Arc::new(MemoryEntitlementStore::new());
    let bus = Arc::new(InMemoryBus::new());

    let resolver = Arc::new(BenefitsResolver::new(entitlements, None, defaults()));
    let router = Arc::new(OutcomeRouter::new(
        feeds.clone(),
        connections.clone(),
        resolver,
        bus.clone(),
        Arc::new(BusNotifier::new(bus.clone())),
    ));
    router.start().await;

    Deployment {
        feeds,
        connections,
        bus,
    }
}

#[tokio::test]
async fn test_fetch_completed_round_trip_emits_delivery() {
    let d = deploy().await;
    d.feeds.insert(feed(1, "https://example.com/a.xml")).await;
    d.connections.insert(connection(10, 1)).await;

    let mut deliveries = d.bus.subscribe(topics::DELIVER_ARTICLES).await;

    d.bus
        .publish(
            topics::FETCH_COMPLETED,
            json!({"fetch_key": "https://example.com/a.xml", "rate_seconds": 600}),
        )
        .await
        .unwrap();

    let payload = timeout(RECV_TIMEOUT, deliveries.recv())
        .await
        .expect("timed out waiting for delivery")
        .unwrap();
    let event: DeliverArticlesEvent = serde_json::from_value(payload).unwrap();
    assert_eq!(event.feed_id, 1);
    assert_eq!(event.connections.len(), 1);
    assert_eq!(event.rate_limits[0].limit, 50);
}

#[tokio::test]
async fn test_failed_disable_round_trip_notifies_owner() {
    let d = deploy().await;
    d.feeds.insert(feed(1, "https://example.com/a.xml")).await;

    let mut notifications = d.bus.subscribe(topics::NOTIFY_FEED_DISABLED).await;

    d.bus
        .publish(
            topics::FETCH_FAILED_DISABLE,
            json!({"fetch_key": "https://example.com/a.xml"}),
        )
        .await
        .unwrap();

    let payload = timeout(RECV_TIMEOUT, notifications.recv())
        .await
        .expect("timed out waiting for notification")
        .unwrap();
    let notification: FeedDisabledNotification = serde_json::from_value(payload).unwrap();
    assert_eq!(notification.feed_ids, vec![1]);

    let disabled = d.feeds.get(1).await.unwrap();
    assert_eq!(disabled.disabled_code, Some(FeedDisabledCode::FailedRequests));
    assert_eq!(disabled.health_status, HealthStatus::Failed);
}

#[tokio::test]
async fn test_duplicate_events_do_not_write_twice() {
    let d = deploy().await;
    d.feeds.insert(feed(1, "https://example.com/a.xml")).await;

    // Subscribe to the notification topic so the disable path completes its
    // fire-and-forget publish deterministically
    let mut notifications = d.bus.subscribe(topics::NOTIFY_FEED_DISABLED).await;

    let event = json!({"fetch_key": "https://example.com/a.xml"});
    d.bus
        .publish(topics::FETCH_FAILED_DISABLE, event.clone())
        .await
        .unwrap();
    timeout(RECV_TIMEOUT, notifications.recv())
        .await
        .expect("timed out waiting for first notification")
        .unwrap();

    // At-least-once delivery: the same event arrives again
    d.bus
        .publish(topics::FETCH_FAILED_DISABLE, event)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(d.feeds.write_count(), 1);
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_payload_does_not_stop_the_subscription() {
    let d = deploy().await;
    d.feeds.insert(feed(1, "https://example.com/a.xml")).await;

    d.bus
        .publish(topics::FETCH_FAILING, json!({"unexpected": true}))
        .await
        .unwrap();

    d.bus
        .publish(
            topics::FETCH_FAILING,
            json!({"fetch_key": "https://example.com/a.xml"}),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        d.feeds.get(1).await.unwrap().health_status,
        HealthStatus::Failing
    );
}

#[tokio::test]
async fn test_connection_rejection_round_trip() {
    let d = deploy().await;
    d.feeds.insert(feed(1, "https://example.com/a.xml")).await;
    d.connections.insert(connection(10, 1)).await;
    d.connections.insert(connection(11, 1)).await;

    d.bus
        .publish(
            topics::ARTICLE_REJECTED_DISABLE_CONNECTION,
            json!({
                "feed_id": 1,
                "connection_id": 10,
                "reject_code": "bad-format",
                "article_id": "article-1",
                "message": "embed too long"
            }),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let disabled = d.connections.get(10).await.unwrap();
    assert_eq!(
        disabled.disabled_code,
        Some(feedcourier::store::models::ConnectionDisabledCode::BadFormat)
    );
    assert_eq!(disabled.disabled_detail.as_deref(), Some("embed too long"));

    let sibling = d.connections.get(11).await.unwrap();
    assert_eq!(sibling.disabled_code, None);
}
