use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::connection::DatabasePool;
use super::EntitlementStore;
use crate::benefits::models::{
    LegacyOverride, PaidSubscriptionBenefits, PatronRecord, PatronStatus, SupporterRecord,
};

/// PostgreSQL-backed read-only view over the billing-owned entitlement tables
pub struct PgEntitlementStore {
    pool: DatabasePool,
}

impl PgEntitlementStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SupporterRow {
    owner_id: String,
    guild_ids: Vec<String>,
    expire_at: Option<DateTime<Utc>>,
    max_feeds: Option<i32>,
    max_user_feeds: Option<i32>,
    max_guilds: Option<i32>,
    slow_rate: bool,
    paid_refresh_rate_seconds: Option<i32>,
    paid_allow_webhooks: Option<bool>,
    paid_daily_article_limit: Option<i32>,
    paid_max_user_feeds: Option<i32>,
}

impl From<SupporterRow> for SupporterRecord {
    fn from(row: SupporterRow) -> Self {
        // The paid subscription block is present when its rate column is set
        let paid_subscription =
            row.paid_refresh_rate_seconds
                .map(|rate| PaidSubscriptionBenefits {
                    refresh_rate_seconds: rate.max(0) as u32,
                    allow_webhooks: row.paid_allow_webhooks.unwrap_or(false),
                    daily_article_limit: row.paid_daily_article_limit.unwrap_or(0).max(0) as u32,
                    max_user_feeds: row.paid_max_user_feeds.unwrap_or(0).max(0) as u32,
                });

        SupporterRecord {
            owner_id: row.owner_id,
            guild_ids: row.guild_ids,
            expire_at: row.expire_at,
            max_feeds: row.max_feeds.map(|v| v.max(0) as u32),
            max_user_feeds: row.max_user_feeds.map(|v| v.max(0) as u32),
            max_guilds: row.max_guilds.map(|v| v.max(0) as u32),
            paid_subscription,
            slow_rate: row.slow_rate,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PatronRow {
    owner_id: String,
    status: String,
    pledge: i32,
    pledge_lifetime: i32,
    pledge_override: Option<i32>,
    last_charge: Option<DateTime<Utc>>,
}

impl PatronRow {
    fn into_record(self) -> Option<PatronRecord> {
        let Some(status) = PatronStatus::parse(&self.status) else {
            warn!(
                "Patron record for {} has unknown status '{}', skipping",
                self.owner_id, self.status
            );
            return None;
        };

        Some(PatronRecord {
            status,
            pledge: self.pledge.max(0) as u32,
            pledge_lifetime: self.pledge_lifetime.max(0) as u32,
            pledge_override: self.pledge_override.map(|v| v.max(0) as u32),
            last_charge: self.last_charge,
        })
    }
}

const SUPPORTER_COLUMNS: &str = r#"
    owner_id,
    guild_ids,
    expire_at,
    max_feeds,
    max_user_feeds,
    max_guilds,
    slow_rate,
    paid_refresh_rate_seconds,
    paid_allow_webhooks,
    paid_daily_article_limit,
    paid_max_user_feeds
"#;

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn find_supporter(&self, owner_id: &str) -> Result<Option<SupporterRecord>> {
        let row: Option<SupporterRow> = sqlx::query_as(&format!(
            "SELECT {SUPPORTER_COLUMNS} FROM supporters WHERE owner_id = $1"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find supporter record")?;

        Ok(row.map(SupporterRecord::from))
    }

    async fn find_patrons(&self, owner_id: &str) -> Result<Vec<PatronRecord>> {
        let rows: Vec<PatronRow> = sqlx::query_as(
            r#"
            SELECT owner_id, status, pledge, pledge_lifetime, pledge_override, last_charge
            FROM patrons
            WHERE owner_id = $1
            ORDER BY id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to find patron records")?;

        Ok(rows.into_iter().filter_map(PatronRow::into_record).collect())
    }

    async fn find_legacy_override(&self, owner_id: &str) -> Result<Option<LegacyOverride>> {
        let row: Option<(String, i32)> = sqlx::query_as(
            r#"
            SELECT owner_id, additional_user_feeds
            FROM legacy_overrides
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find legacy override")?;

        Ok(row.map(|(owner_id, additional)| LegacyOverride {
            owner_id,
            additional_user_feeds: additional.max(0) as u32,
        }))
    }

    async fn list_supporters(&self) -> Result<Vec<SupporterRecord>> {
        let rows: Vec<SupporterRow> = sqlx::query_as(&format!(
            "SELECT {SUPPORTER_COLUMNS} FROM supporters ORDER BY owner_id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list supporter records")?;

        Ok(rows.into_iter().map(SupporterRecord::from).collect())
    }

    async fn find_supporters_for_guild(&self, guild_id: &str) -> Result<Vec<SupporterRecord>> {
        let rows: Vec<SupporterRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SUPPORTER_COLUMNS}
            FROM supporters
            WHERE $1 = ANY(guild_ids)
            ORDER BY owner_id
            "#
        ))
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to find supporters for guild")?;

        Ok(rows.into_iter().map(SupporterRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supporter_row_paid_subscription_presence() {
        let row = SupporterRow {
            owner_id: "owner-1".to_string(),
            guild_ids: vec![],
            expire_at: None,
            max_feeds: None,
            max_user_feeds: None,
            max_guilds: None,
            slow_rate: false,
            paid_refresh_rate_seconds: Some(60),
            paid_allow_webhooks: Some(true),
            paid_daily_article_limit: Some(5000),
            paid_max_user_feeds: Some(100),
        };

        let record = SupporterRecord::from(row);
        let sub = record.paid_subscription.expect("paid subscription");
        assert_eq!(sub.refresh_rate_seconds, 60);
        assert!(sub.allow_webhooks);
    }

    #[test]
    fn test_patron_row_unknown_status_is_skipped() {
        let row = PatronRow {
            owner_id: "owner-1".to_string(),
            status: "mystery".to_string(),
            pledge: 500,
            pledge_lifetime: 500,
            pledge_override: None,
            last_charge: None,
        };

        assert!(row.into_record().is_none());
    }
}
