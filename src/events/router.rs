//! Fetch outcome routing
//!
//! Consumes the asynchronous outcome events published by the fetch subsystem,
//! matches them to feeds and connections, applies guarded state transitions,
//! and emits delivery requests. Events arrive at-least-once and possibly out
//! of order; every write's predicate encodes the expected prior state, so a
//! redelivered event lands as a no-op. Once a disable reason is set, a later
//! event carrying a different reason never overwrites it; re-enabling is an
//! explicit store operation, never a router side effect.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::models::{
    connection_disabled_code_for_reject, feed_disabled_code_for_reject,
    ArticleRejectedDisableConnectionEvent, DeliverArticlesEvent, DeliveryTarget,
    FeedRejectedDisableEvent, FetchCompletedEvent, FetchFailedDisableEvent, FetchFailingEvent,
    FetchRejectedDisableEvent, REFUSED_LARGE_FEED,
};
use crate::benefits::BenefitsResolver;
use crate::bus::{topics, EventBus};
use crate::constants::scheduling::FEED_PAGE_SIZE;
use crate::metrics;
use crate::notifications::Notifier;
use crate::store::models::{Feed, FeedDisabledCode};
use crate::store::{ConnectionStore, FeedStore};

type EventHandler = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct OutcomeRouter {
    feeds: Arc<dyn FeedStore>,
    connections: Arc<dyn ConnectionStore>,
    resolver: Arc<BenefitsResolver>,
    bus: Arc<dyn EventBus>,
    notifier: Arc<dyn Notifier>,
}

impl OutcomeRouter {
    pub fn new(
        feeds: Arc<dyn FeedStore>,
        connections: Arc<dyn ConnectionStore>,
        resolver: Arc<BenefitsResolver>,
        bus: Arc<dyn EventBus>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            feeds,
            connections,
            resolver,
            bus,
            notifier,
        }
    }

    /// Explicit dispatch table mapping topic name to handler, registered at
    /// startup
    fn dispatch_table(self: Arc<Self>) -> Vec<(&'static str, EventHandler)> {
        let mut table: Vec<(&'static str, EventHandler)> = Vec::new();

        let router = Arc::clone(&self);
        table.push((
            topics::FETCH_COMPLETED,
            Arc::new(move |payload| {
                let router = Arc::clone(&router);
                async move {
                    let event: FetchCompletedEvent = serde_json::from_value(payload)
                        .context("Invalid fetch-completed payload")?;
                    router.handle_fetch_completed(event).await
                }
                .boxed()
            }),
        ));

        let router = Arc::clone(&self);
        table.push((
            topics::FETCH_FAILING,
            Arc::new(move |payload| {
                let router = Arc::clone(&router);
                async move {
                    let event: FetchFailingEvent =
                        serde_json::from_value(payload).context("Invalid fetch-failing payload")?;
                    router.handle_fetch_failing(event).await
                }
                .boxed()
            }),
        ));

        let router = Arc::clone(&self);
        table.push((
            topics::FETCH_FAILED_DISABLE,
            Arc::new(move |payload| {
                let router = Arc::clone(&router);
                async move {
                    let event: FetchFailedDisableEvent = serde_json::from_value(payload)
                        .context("Invalid fetch-failed payload")?;
                    router.handle_fetch_failed_disable(event).await
                }
                .boxed()
            }),
        ));

        let router = Arc::clone(&self);
        table.push((
            topics::FETCH_REJECTED_DISABLE,
            Arc::new(move |payload| {
                let router = Arc::clone(&router);
                async move {
                    let event: FetchRejectedDisableEvent = serde_json::from_value(payload)
                        .context("Invalid fetch-rejected payload")?;
                    router.handle_fetch_rejected_disable(event).await
                }
                .boxed()
            }),
        ));

        let router = Arc::clone(&self);
        table.push((
            topics::FEED_REJECTED_DISABLE,
            Arc::new(move |payload| {
                let router = Arc::clone(&router);
                async move {
                    let event: FeedRejectedDisableEvent = serde_json::from_value(payload)
                        .context("Invalid feed-rejected payload")?;
                    router.handle_feed_rejected_disable(event).await
                }
                .boxed()
            }),
        ));

        let router = Arc::clone(&self);
        table.push((
            topics::ARTICLE_REJECTED_DISABLE_CONNECTION,
            Arc::new(move |payload| {
                let router = Arc::clone(&router);
                async move {
                    let event: ArticleRejectedDisableConnectionEvent =
                        serde_json::from_value(payload)
                            .context("Invalid article-rejected payload")?;
                    router.handle_article_rejected_disable_connection(event).await
                }
                .boxed()
            }),
        ));

        table
    }

    /// Subscribe to every outcome topic; one task per topic drains its queue.
    /// A failing handler invocation is logged and the loop continues, relying
    /// on upstream redelivery rather than an internal retry.
    pub async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for (topic, handler) in Arc::clone(&self).dispatch_table() {
            let mut rx = self.bus.subscribe(topic).await;
            handles.push(tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    if let Err(e) = handler(payload).await {
                        error!("Handler for '{}' failed: {}", topic, e);
                    }
                }
                info!("Subscription for '{}' closed", topic);
            }));
        }

        info!("Outcome router subscribed to {} topics", handles.len());
        handles
    }

    pub async fn handle_fetch_completed(&self, event: FetchCompletedEvent) -> Result<()> {
        metrics::record_outcome_event("fetch-completed");

        let restored = self.feeds.mark_ok(&event.fetch_key).await?;
        if restored > 0 {
            debug!(
                "Restored {} feeds to ok for key {}",
                restored, event.fetch_key
            );
        }

        // Cursor over matches; a single key and rate can cover tens of
        // thousands of feeds
        let mut after_id = 0;
        loop {
            let page = self
                .feeds
                .list_deliverable_page(&event.fetch_key, event.rate_seconds, after_id, FEED_PAGE_SIZE)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;

            for feed in &page {
                // One feed's emit failure must not abort the batch
                if let Err(e) = self.emit_delivery(feed).await {
                    error!("Failed to emit delivery for feed {}: {}", feed.id, e);
                }
            }
        }

        Ok(())
    }

    async fn emit_delivery(&self, feed: &Feed) -> Result<()> {
        // Premium flags are resolved fresh on every delivery so entitlement
        // changes apply without waiting for a sync pass
        let benefits = self.resolver.owner_benefits(&feed.owner_id).await;
        let connections = self.connections.list_enabled_by_feed(feed.id).await?;

        let event = DeliverArticlesEvent {
            feed_id: feed.id,
            url: feed.url.clone(),
            fetch_key: feed.fetch_key().to_string(),
            rate_seconds: feed.effective_refresh_rate_seconds(),
            connections: connections
                .into_iter()
                .map(|c| DeliveryTarget {
                    connection_id: c.id,
                    kind: c.kind,
                    filters: c.filters,
                    format_options: c.format_options,
                })
                .collect(),
            allow_webhooks: benefits.allow_webhooks,
            daily_article_limit: benefits.daily_article_limit,
            rate_limits: benefits.rate_limits,
        };

        self.bus
            .publish(topics::DELIVER_ARTICLES, serde_json::to_value(event)?)
            .await?;
        metrics::record_delivery_emitted();
        Ok(())
    }

    pub async fn handle_fetch_failing(&self, event: FetchFailingEvent) -> Result<()> {
        metrics::record_outcome_event("fetch-failing");

        let changed = self.feeds.mark_failing(&event.fetch_key).await?;
        if changed > 0 {
            debug!(
                "Marked {} feeds failing for key {}",
                changed, event.fetch_key
            );
        }
        Ok(())
    }

    pub async fn handle_fetch_failed_disable(&self, event: FetchFailedDisableEvent) -> Result<()> {
        metrics::record_outcome_event("fetch-failed-disable");

        let disabled = self.feeds.disable_failed(&event.fetch_key).await?;
        if disabled.is_empty() {
            return Ok(());
        }

        metrics::record_feeds_disabled("failed-requests", disabled.len() as u64);
        warn!(
            "Disabled {} feeds for key {} after sustained request failures",
            disabled.len(),
            event.fetch_key
        );

        // Fire-and-forget: a notification failure never rolls back the disable
        if let Err(e) = self
            .notifier
            .notify_disabled_feed(&disabled, FeedDisabledCode::FailedRequests)
            .await
        {
            warn!("Failed to notify disabled feeds: {}", e);
        }
        Ok(())
    }

    pub async fn handle_fetch_rejected_disable(
        &self,
        event: FetchRejectedDisableEvent,
    ) -> Result<()> {
        metrics::record_outcome_event("fetch-rejected-disable");

        if event.status != REFUSED_LARGE_FEED {
            warn!(
                "Unknown rejection status '{}' for key {}, ignoring",
                event.status, event.fetch_key
            );
            return Ok(());
        }

        let changed = self
            .feeds
            .disable_rejected(&event.fetch_key, FeedDisabledCode::FeedTooLarge)
            .await?;
        if changed > 0 {
            metrics::record_feeds_disabled(FeedDisabledCode::FeedTooLarge.as_str(), changed);
            warn!(
                "Disabled {} oversized feeds for key {}",
                changed, event.fetch_key
            );
        }
        Ok(())
    }

    pub async fn handle_feed_rejected_disable(
        &self,
        event: FeedRejectedDisableEvent,
    ) -> Result<()> {
        metrics::record_outcome_event("feed-rejected-disable");

        let Some(feed) = self.feeds.find_by_id(event.feed_id).await? else {
            // Concurrent deletion is not an error
            warn!("Feed {} not found for rejection, skipping", event.feed_id);
            return Ok(());
        };

        let code = feed_disabled_code_for_reject(&event.reject_code);
        let changed = self.feeds.disable_by_id(feed.id, code).await?;
        if changed == 0 {
            debug!("Feed {} already disabled, keeping its first reason", feed.id);
            return Ok(());
        }

        metrics::record_feeds_disabled(code.as_str(), 1);
        if let Err(e) = self.notifier.notify_disabled_feed(&[feed.id], code).await {
            warn!("Failed to notify disabled feed {}: {}", feed.id, e);
        }
        Ok(())
    }

    pub async fn handle_article_rejected_disable_connection(
        &self,
        event: ArticleRejectedDisableConnectionEvent,
    ) -> Result<()> {
        metrics::record_outcome_event("article-rejected-disable-connection");

        let Some(connection) = self.connections.find_by_id(event.connection_id).await? else {
            warn!(
                "Connection {} not found for article rejection, skipping",
                event.connection_id
            );
            return Ok(());
        };

        let code = connection_disabled_code_for_reject(&event.reject_code);
        let detail = event
            .message
            .clone()
            .or_else(|| event.article_id.as_ref().map(|id| format!("article {id} rejected")));

        let changed = self
            .connections
            .disable(connection.id, code, detail.as_deref())
            .await?;
        if changed == 0 {
            debug!(
                "Connection {} already disabled, keeping its first reason",
                connection.id
            );
            return Ok(());
        }

        metrics::record_connection_disabled(code.as_str());
        if let Err(e) = self
            .notifier
            .notify_disabled_connection(connection.feed_id, connection.id, code)
            .await
        {
            warn!("Failed to notify disabled connection {}: {}", connection.id, e);
        }
        Ok(())
    }
}
