//! Event bus abstraction
//!
//! The core subscribes to named topics for fetch outcome events and publishes
//! delivery and notification events. Delivery is at-least-once; every consumer
//! must be idempotent, which the guarded store writes guarantee.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::constants::bus::SUBSCRIBER_CHANNEL_CAPACITY;

/// Topic names shared with the fetch subsystem and delivery workers
pub mod topics {
    pub const FETCH_COMPLETED: &str = "feed.fetch-completed";
    pub const FETCH_FAILING: &str = "feed.fetch-failing";
    pub const FETCH_FAILED_DISABLE: &str = "feed.fetch-failed.disable";
    pub const FETCH_REJECTED_DISABLE: &str = "feed.fetch-rejected.disable";
    pub const FEED_REJECTED_DISABLE: &str = "feed.rejected.disable";
    pub const ARTICLE_REJECTED_DISABLE_CONNECTION: &str = "feed.article-rejected.disable-connection";
    pub const DELIVER_ARTICLES: &str = "feed.deliver-articles";
    pub const SCHEDULE_TICK: &str = "feed.schedule-tick";
    pub const NOTIFY_FEED_DISABLED: &str = "notifications.feed-disabled";
    pub const NOTIFY_CONNECTION_DISABLED: &str = "notifications.connection-disabled";
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a JSON payload to every subscriber of the topic
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()>;

    /// Register a new subscriber for the topic
    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<serde_json::Value>;
}

/// In-process bus used when all components run in one daemon
#[derive(Default)]
pub struct InMemoryBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<serde_json::Value>>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        let mut subscribers = self.subscribers.lock().await;
        let Some(senders) = subscribers.get_mut(topic) else {
            debug!("No subscribers for topic '{}', dropping event", topic);
            return Ok(());
        };

        let mut open = Vec::with_capacity(senders.len());
        for sender in senders.drain(..) {
            match sender.send(payload.clone()).await {
                Ok(()) => open.push(sender),
                // Receiver dropped; forget the subscription
                Err(_) => {}
            }
        }

        let all_gone = open.is_empty();
        *senders = open;
        if all_gone {
            subscribers.remove(topic);
            debug!("Last subscriber for topic '{}' is gone, dropping event", topic);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = InMemoryBus::new();
        let mut first = bus.subscribe(topics::FETCH_COMPLETED).await;
        let mut second = bus.subscribe(topics::FETCH_COMPLETED).await;

        bus.publish(topics::FETCH_COMPLETED, json!({"fetch_key": "k"}))
            .await
            .unwrap();

        assert_eq!(first.recv().await.unwrap()["fetch_key"], "k");
        assert_eq!(second.recv().await.unwrap()["fetch_key"], "k");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = InMemoryBus::new();
        assert!(bus
            .publish(topics::FETCH_FAILING, json!({}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let bus = InMemoryBus::new();
        let first = bus.subscribe(topics::SCHEDULE_TICK).await;
        let mut second = bus.subscribe(topics::SCHEDULE_TICK).await;
        drop(first);

        bus.publish(topics::SCHEDULE_TICK, json!({"refresh_rate_seconds": 120}))
            .await
            .unwrap();
        assert_eq!(
            second.recv().await.unwrap()["refresh_rate_seconds"],
            120
        );
    }
}
