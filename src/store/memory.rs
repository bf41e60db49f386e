//! In-memory store implementations
//!
//! Mirror the guarded-update semantics of the PostgreSQL repositories so the
//! router and scheduler can be exercised without a database. Mutation counts
//! are tracked to make idempotence observable in tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::models::{Connection, ConnectionDisabledCode, Feed, FeedDisabledCode, HealthStatus};
use super::{ConnectionStore, EntitlementStore, FeedStore};
use crate::benefits::models::{LegacyOverride, PatronRecord, SupporterRecord};

fn matches_key(feed: &Feed, fetch_key: &str) -> bool {
    feed.url == fetch_key || feed.lookup_key.as_deref() == Some(fetch_key)
}

#[derive(Default)]
pub struct MemoryFeedStore {
    feeds: RwLock<HashMap<i64, Feed>>,
    writes: AtomicU64,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, feed: Feed) {
        self.feeds.write().await.insert(feed.id, feed);
    }

    pub async fn get(&self, feed_id: i64) -> Option<Feed> {
        self.feeds.read().await.get(&feed_id).cloned()
    }

    /// Number of mutations that actually changed a row
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_writes(&self, changed: u64) -> u64 {
        self.writes.fetch_add(changed, Ordering::SeqCst);
        changed
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn mark_ok(&self, fetch_key: &str) -> Result<u64> {
        let mut feeds = self.feeds.write().await;
        let mut changed = 0;
        for feed in feeds.values_mut() {
            if matches_key(feed, fetch_key) && feed.health_status != HealthStatus::Ok {
                feed.health_status = HealthStatus::Ok;
                changed += 1;
            }
        }
        Ok(self.record_writes(changed))
    }

    async fn mark_failing(&self, fetch_key: &str) -> Result<u64> {
        let mut feeds = self.feeds.write().await;
        let mut changed = 0;
        for feed in feeds.values_mut() {
            if matches_key(feed, fetch_key) && feed.health_status != HealthStatus::Failing {
                feed.health_status = HealthStatus::Failing;
                changed += 1;
            }
        }
        Ok(self.record_writes(changed))
    }

    async fn disable_failed(&self, fetch_key: &str) -> Result<Vec<i64>> {
        let mut feeds = self.feeds.write().await;
        let mut disabled = Vec::new();
        for feed in feeds.values_mut() {
            if matches_key(feed, fetch_key) && feed.disabled_code.is_none() {
                feed.disabled_code = Some(FeedDisabledCode::FailedRequests);
                feed.health_status = HealthStatus::Failed;
                disabled.push(feed.id);
            }
        }
        disabled.sort_unstable();
        self.record_writes(disabled.len() as u64);
        Ok(disabled)
    }

    async fn disable_rejected(&self, fetch_key: &str, code: FeedDisabledCode) -> Result<u64> {
        let mut feeds = self.feeds.write().await;
        let mut changed = 0;
        for feed in feeds.values_mut() {
            if matches_key(feed, fetch_key) && feed.disabled_code.is_none() {
                feed.disabled_code = Some(code);
                changed += 1;
            }
        }
        Ok(self.record_writes(changed))
    }

    async fn disable_by_id(&self, feed_id: i64, code: FeedDisabledCode) -> Result<u64> {
        let mut feeds = self.feeds.write().await;
        let changed = match feeds.get_mut(&feed_id) {
            Some(feed) if feed.disabled_code.is_none() => {
                feed.disabled_code = Some(code);
                1
            }
            _ => 0,
        };
        Ok(self.record_writes(changed))
    }

    async fn clear_disabled(&self, feed_id: i64) -> Result<u64> {
        let mut feeds = self.feeds.write().await;
        let changed = match feeds.get_mut(&feed_id) {
            Some(feed) if feed.disabled_code.is_some() => {
                feed.disabled_code = None;
                feed.health_status = HealthStatus::Ok;
                1
            }
            _ => 0,
        };
        Ok(self.record_writes(changed))
    }

    async fn find_by_id(&self, feed_id: i64) -> Result<Option<Feed>> {
        Ok(self.feeds.read().await.get(&feed_id).cloned())
    }

    async fn list_deliverable_page(
        &self,
        fetch_key: &str,
        rate_seconds: u32,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Feed>> {
        let feeds = self.feeds.read().await;
        let mut page: Vec<Feed> = feeds
            .values()
            .filter(|feed| {
                matches_key(feed, fetch_key)
                    && feed.effective_refresh_rate_seconds() == rate_seconds
                    && feed.disabled_code.is_none()
                    && feed.id > after_id
            })
            .cloned()
            .collect();
        page.sort_by_key(|feed| feed.id);
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn list_by_owner_page(
        &self,
        owner_id: &str,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Feed>> {
        let feeds = self.feeds.read().await;
        let mut page: Vec<Feed> = feeds
            .values()
            .filter(|feed| feed.owner_id == owner_id && feed.id > after_id)
            .cloned()
            .collect();
        page.sort_by_key(|feed| feed.id);
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn list_all_page(&self, after_id: i64, limit: i64) -> Result<Vec<Feed>> {
        let feeds = self.feeds.read().await;
        let mut page: Vec<Feed> = feeds
            .values()
            .filter(|feed| feed.id > after_id)
            .cloned()
            .collect();
        page.sort_by_key(|feed| feed.id);
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn set_assigned_rate(
        &self,
        feed_id: i64,
        rate_seconds: u32,
        slot_offset_ms: i64,
    ) -> Result<u64> {
        let mut feeds = self.feeds.write().await;
        let changed = match feeds.get_mut(&feed_id) {
            Some(feed) if feed.refresh_rate_seconds != rate_seconds => {
                feed.refresh_rate_seconds = rate_seconds;
                feed.slot_offset_ms = slot_offset_ms;
                1
            }
            _ => 0,
        };
        Ok(self.record_writes(changed))
    }

    async fn set_slot_offset(&self, feed_id: i64, slot_offset_ms: i64) -> Result<u64> {
        let mut feeds = self.feeds.write().await;
        let changed = match feeds.get_mut(&feed_id) {
            Some(feed) if feed.slot_offset_ms != slot_offset_ms => {
                feed.slot_offset_ms = slot_offset_ms;
                1
            }
            _ => 0,
        };
        Ok(self.record_writes(changed))
    }

    async fn distinct_user_refresh_rates(&self) -> Result<Vec<u32>> {
        let feeds = self.feeds.read().await;
        let mut rates: Vec<u32> = feeds
            .values()
            .filter(|feed| feed.disabled_code.is_none())
            .filter_map(|feed| feed.user_refresh_rate_seconds)
            .collect();
        rates.sort_unstable();
        rates.dedup();
        Ok(rates)
    }
}

#[derive(Default)]
pub struct MemoryConnectionStore {
    connections: RwLock<HashMap<i64, Connection>>,
    writes: AtomicU64,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, connection: Connection) {
        self.connections
            .write()
            .await
            .insert(connection.id, connection);
    }

    pub async fn get(&self, connection_id: i64) -> Option<Connection> {
        self.connections.read().await.get(&connection_id).cloned()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn find_by_id(&self, connection_id: i64) -> Result<Option<Connection>> {
        Ok(self.connections.read().await.get(&connection_id).cloned())
    }

    async fn list_enabled_by_feed(&self, feed_id: i64) -> Result<Vec<Connection>> {
        let connections = self.connections.read().await;
        let mut matched: Vec<Connection> = connections
            .values()
            .filter(|c| c.feed_id == feed_id && c.disabled_code.is_none())
            .cloned()
            .collect();
        matched.sort_by_key(|c| c.id);
        Ok(matched)
    }

    async fn disable(
        &self,
        connection_id: i64,
        code: ConnectionDisabledCode,
        detail: Option<&str>,
    ) -> Result<u64> {
        let mut connections = self.connections.write().await;
        let changed = match connections.get_mut(&connection_id) {
            Some(connection) if connection.disabled_code.is_none() => {
                connection.disabled_code = Some(code);
                connection.disabled_detail = detail.map(str::to_string);
                1
            }
            _ => 0,
        };
        self.writes.fetch_add(changed, Ordering::SeqCst);
        Ok(changed)
    }

    async fn clear_disabled(&self, connection_id: i64) -> Result<u64> {
        let mut connections = self.connections.write().await;
        let changed = match connections.get_mut(&connection_id) {
            Some(connection) if connection.disabled_code.is_some() => {
                connection.disabled_code = None;
                connection.disabled_detail = None;
                1
            }
            _ => 0,
        };
        self.writes.fetch_add(changed, Ordering::SeqCst);
        Ok(changed)
    }
}

#[derive(Default)]
pub struct MemoryEntitlementStore {
    supporters: RwLock<Vec<SupporterRecord>>,
    patrons: RwLock<HashMap<String, Vec<PatronRecord>>>,
    legacy: RwLock<HashMap<String, LegacyOverride>>,
}

impl MemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_supporter(&self, record: SupporterRecord) {
        self.supporters.write().await.push(record);
    }

    pub async fn insert_patron(&self, owner_id: &str, record: PatronRecord) {
        self.patrons
            .write()
            .await
            .entry(owner_id.to_string())
            .or_default()
            .push(record);
    }

    pub async fn insert_legacy_override(&self, record: LegacyOverride) {
        self.legacy
            .write()
            .await
            .insert(record.owner_id.clone(), record);
    }

    pub async fn remove_patrons(&self, owner_id: &str) {
        self.patrons.write().await.remove(owner_id);
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn find_supporter(&self, owner_id: &str) -> Result<Option<SupporterRecord>> {
        Ok(self
            .supporters
            .read()
            .await
            .iter()
            .find(|s| s.owner_id == owner_id)
            .cloned())
    }

    async fn find_patrons(&self, owner_id: &str) -> Result<Vec<PatronRecord>> {
        Ok(self
            .patrons
            .read()
            .await
            .get(owner_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_legacy_override(&self, owner_id: &str) -> Result<Option<LegacyOverride>> {
        Ok(self.legacy.read().await.get(owner_id).cloned())
    }

    async fn list_supporters(&self) -> Result<Vec<SupporterRecord>> {
        Ok(self.supporters.read().await.clone())
    }

    async fn find_supporters_for_guild(&self, guild_id: &str) -> Result<Vec<SupporterRecord>> {
        Ok(self
            .supporters
            .read()
            .await
            .iter()
            .filter(|s| s.guild_ids.iter().any(|g| g == guild_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(id: i64, url: &str, rate: u32) -> Feed {
        Feed {
            id,
            url: url.to_string(),
            owner_id: "owner-1".to_string(),
            lookup_key: None,
            user_refresh_rate_seconds: None,
            refresh_rate_seconds: rate,
            slot_offset_ms: 0,
            health_status: HealthStatus::Ok,
            disabled_code: None,
        }
    }

    #[tokio::test]
    async fn test_mark_ok_counts_only_real_changes() {
        let store = MemoryFeedStore::new();
        let mut failing = feed(1, "https://example.com/a.xml", 600);
        failing.health_status = HealthStatus::Failing;
        store.insert(failing).await;

        assert_eq!(store.mark_ok("https://example.com/a.xml").await.unwrap(), 1);
        assert_eq!(store.mark_ok("https://example.com/a.xml").await.unwrap(), 0);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_disable_guard_preserves_first_reason() {
        let store = MemoryFeedStore::new();
        store.insert(feed(1, "https://example.com/a.xml", 600)).await;

        let disabled = store.disable_failed("https://example.com/a.xml").await.unwrap();
        assert_eq!(disabled, vec![1]);

        let changed = store
            .disable_rejected("https://example.com/a.xml", FeedDisabledCode::FeedTooLarge)
            .await
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(
            store.get(1).await.unwrap().disabled_code,
            Some(FeedDisabledCode::FailedRequests)
        );
    }

    #[tokio::test]
    async fn test_connection_disable_and_explicit_clear() {
        let store = MemoryConnectionStore::new();
        store
            .insert(Connection {
                id: 7,
                feed_id: 1,
                kind: crate::store::models::ConnectionKind::Webhook,
                disabled_code: None,
                disabled_detail: None,
                filters: None,
                format_options: None,
            })
            .await;

        assert_eq!(
            store
                .disable(7, ConnectionDisabledCode::BadFormat, Some("bad embed"))
                .await
                .unwrap(),
            1
        );
        // A second disable with a different reason is a guarded no-op
        assert_eq!(
            store
                .disable(7, ConnectionDisabledCode::Unknown, None)
                .await
                .unwrap(),
            0
        );

        assert_eq!(store.clear_disabled(7).await.unwrap(), 1);
        let cleared = store.get(7).await.unwrap();
        assert_eq!(cleared.disabled_code, None);
        assert_eq!(cleared.disabled_detail, None);
    }

    #[tokio::test]
    async fn test_deliverable_page_matches_effective_rate() {
        let store = MemoryFeedStore::new();
        store.insert(feed(1, "https://example.com/a.xml", 600)).await;
        let mut overridden = feed(2, "https://example.com/a.xml", 600);
        overridden.user_refresh_rate_seconds = Some(120);
        store.insert(overridden).await;

        let page = store
            .list_deliverable_page("https://example.com/a.xml", 600, 0, 100)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 1);

        let page = store
            .list_deliverable_page("https://example.com/a.xml", 120, 0, 100)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 2);
    }
}
