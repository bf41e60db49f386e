//! Feed, connection, and entitlement persistence
//!
//! The core talks to storage through the narrow traits defined here:
//! conditional guarded updates, keyset-paginated queries, and find-by-id.
//! PostgreSQL implementations live in the repository modules; in-memory
//! implementations back the integration tests.

pub mod connection;
pub mod connection_repository;
pub mod entitlement_repository;
pub mod feed_repository;
pub mod memory;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;

use crate::benefits::models::{LegacyOverride, PatronRecord, SupporterRecord};
use models::{Connection, ConnectionDisabledCode, Feed, FeedDisabledCode};

/// Guarded feed mutations and cursor queries
///
/// Every mutation encodes its guard in the update predicate, so duplicate
/// or out-of-order event delivery degrades to an idempotent no-op. Each
/// mutation returns the number of rows it actually changed.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Set health to ok on feeds matching the fetch key whose status is not ok
    async fn mark_ok(&self, fetch_key: &str) -> Result<u64>;

    /// Set health to failing on feeds matching the fetch key not already failing
    async fn mark_failing(&self, fetch_key: &str) -> Result<u64>;

    /// Disable feeds matching the fetch key with failed-requests and set
    /// health to failed; only feeds with no disabled code are touched.
    /// Returns the ids of the feeds that were disabled.
    async fn disable_failed(&self, fetch_key: &str) -> Result<Vec<i64>>;

    /// Disable feeds matching the fetch key with the given code; only feeds
    /// with no disabled code are touched
    async fn disable_rejected(&self, fetch_key: &str, code: FeedDisabledCode) -> Result<u64>;

    /// Disable a single feed by id; a no-op unless its disabled code is unset
    async fn disable_by_id(&self, feed_id: i64, code: FeedDisabledCode) -> Result<u64>;

    /// Explicit re-enable: clear the disabled code regardless of its value
    async fn clear_disabled(&self, feed_id: i64) -> Result<u64>;

    async fn find_by_id(&self, feed_id: i64) -> Result<Option<Feed>>;

    /// Page of enabled feeds matching the fetch key whose effective refresh
    /// rate equals the given rate, ordered by id, starting after `after_id`
    async fn list_deliverable_page(
        &self,
        fetch_key: &str,
        rate_seconds: u32,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Feed>>;

    /// Page of an owner's feeds ordered by id, starting after `after_id`
    async fn list_by_owner_page(
        &self,
        owner_id: &str,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Feed>>;

    /// Page over every feed, ordered by id, starting after `after_id`
    async fn list_all_page(&self, after_id: i64, limit: i64) -> Result<Vec<Feed>>;

    /// Assign a new system refresh rate and slot offset; a no-op when the
    /// assigned rate already matches
    async fn set_assigned_rate(
        &self,
        feed_id: i64,
        rate_seconds: u32,
        slot_offset_ms: i64,
    ) -> Result<u64>;

    /// Overwrite the slot offset (batch recompute path)
    async fn set_slot_offset(&self, feed_id: i64, slot_offset_ms: i64) -> Result<u64>;

    /// Distinct user-configured refresh rate overrides across enabled feeds
    async fn distinct_user_refresh_rates(&self) -> Result<Vec<u32>>;
}

/// Guarded connection mutations
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn find_by_id(&self, connection_id: i64) -> Result<Option<Connection>>;

    async fn list_enabled_by_feed(&self, feed_id: i64) -> Result<Vec<Connection>>;

    /// Disable a single connection with a code and free-text detail; a no-op
    /// unless its disabled code is unset
    async fn disable(
        &self,
        connection_id: i64,
        code: ConnectionDisabledCode,
        detail: Option<&str>,
    ) -> Result<u64>;

    /// Explicit re-enable: clear the disabled code and detail
    async fn clear_disabled(&self, connection_id: i64) -> Result<u64>;
}

/// Read-only source of supporter, patron, and legacy-override records.
/// These are externally owned by billing/administration and never written here.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn find_supporter(&self, owner_id: &str) -> Result<Option<SupporterRecord>>;

    async fn find_patrons(&self, owner_id: &str) -> Result<Vec<PatronRecord>>;

    async fn find_legacy_override(&self, owner_id: &str) -> Result<Option<LegacyOverride>>;

    /// Every supporter record, used to derive the set of required refresh rates
    async fn list_supporters(&self) -> Result<Vec<SupporterRecord>>;

    /// Supporter records listing the given guild
    async fn find_supporters_for_guild(&self, guild_id: &str) -> Result<Vec<SupporterRecord>>;
}
