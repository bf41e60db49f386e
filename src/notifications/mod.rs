//! Disable notifications
//!
//! Notifying owners and co-managers is fire-and-forget from the core's
//! perspective: failures are logged and never roll back the state change
//! that triggered them.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::bus::{topics, EventBus};
use crate::store::models::{ConnectionDisabledCode, FeedDisabledCode};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify the owner and accepted co-managers of the disabled feeds
    async fn notify_disabled_feed(&self, feed_ids: &[i64], reason: FeedDisabledCode) -> Result<()>;

    /// Notify only the stakeholders of the single disabled connection
    async fn notify_disabled_connection(
        &self,
        feed_id: i64,
        connection_id: i64,
        reason: ConnectionDisabledCode,
    ) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedDisabledNotification {
    pub feed_ids: Vec<i64>,
    pub reason: FeedDisabledCode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionDisabledNotification {
    pub feed_id: i64,
    pub connection_id: i64,
    pub reason: ConnectionDisabledCode,
}

/// Publishes notification requests for the out-of-process notification service
pub struct BusNotifier {
    bus: Arc<dyn EventBus>,
}

impl BusNotifier {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Notifier for BusNotifier {
    async fn notify_disabled_feed(&self, feed_ids: &[i64], reason: FeedDisabledCode) -> Result<()> {
        let notification = FeedDisabledNotification {
            feed_ids: feed_ids.to_vec(),
            reason,
        };
        self.bus
            .publish(
                topics::NOTIFY_FEED_DISABLED,
                serde_json::to_value(notification)?,
            )
            .await
    }

    async fn notify_disabled_connection(
        &self,
        feed_id: i64,
        connection_id: i64,
        reason: ConnectionDisabledCode,
    ) -> Result<()> {
        let notification = ConnectionDisabledNotification {
            feed_id,
            connection_id,
            reason,
        };
        self.bus
            .publish(
                topics::NOTIFY_CONNECTION_DISABLED,
                serde_json::to_value(notification)?,
            )
            .await
    }
}

/// Discards notifications; used in tests
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_disabled_feed(
        &self,
        _feed_ids: &[i64],
        _reason: FeedDisabledCode,
    ) -> Result<()> {
        Ok(())
    }

    async fn notify_disabled_connection(
        &self,
        _feed_id: i64,
        _connection_id: i64,
        _reason: ConnectionDisabledCode,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    #[tokio::test]
    async fn test_bus_notifier_publishes_feed_notification() {
        let bus = Arc::new(InMemoryBus::new());
        let mut rx = bus.subscribe(topics::NOTIFY_FEED_DISABLED).await;
        let notifier = BusNotifier::new(bus.clone());

        notifier
            .notify_disabled_feed(&[3, 5], FeedDisabledCode::FailedRequests)
            .await
            .unwrap();

        let payload = rx.recv().await.unwrap();
        let notification: FeedDisabledNotification = serde_json::from_value(payload).unwrap();
        assert_eq!(notification.feed_ids, vec![3, 5]);
        assert_eq!(notification.reason, FeedDisabledCode::FailedRequests);
    }
}
