use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use super::connection::DatabasePool;
use super::models::{Feed, FeedDisabledCode, HealthStatus};
use super::FeedStore;

/// PostgreSQL-backed feed store
///
/// Every mutation is a single conditional UPDATE whose predicate encodes the
/// expected prior state, so redelivered events land as no-ops.
pub struct PgFeedStore {
    pool: DatabasePool,
}

impl PgFeedStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FeedRow {
    id: i64,
    url: String,
    owner_id: String,
    lookup_key: Option<String>,
    user_refresh_rate_seconds: Option<i32>,
    refresh_rate_seconds: i32,
    slot_offset_ms: i64,
    health_status: String,
    disabled_code: Option<String>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        let health_status = HealthStatus::parse(&row.health_status).unwrap_or_else(|| {
            warn!(
                "Feed {} has unknown health status '{}', treating as ok",
                row.id, row.health_status
            );
            HealthStatus::Ok
        });
        let disabled_code = row.disabled_code.as_deref().and_then(|code| {
            let parsed = FeedDisabledCode::parse(code);
            if parsed.is_none() {
                warn!("Feed {} has unknown disabled code '{}'", row.id, code);
            }
            parsed
        });

        Feed {
            id: row.id,
            url: row.url,
            owner_id: row.owner_id,
            lookup_key: row.lookup_key,
            user_refresh_rate_seconds: row.user_refresh_rate_seconds.map(|r| r.max(0) as u32),
            refresh_rate_seconds: row.refresh_rate_seconds.max(0) as u32,
            slot_offset_ms: row.slot_offset_ms,
            health_status,
            disabled_code,
        }
    }
}

const FEED_COLUMNS: &str = r#"
    id,
    url,
    owner_id,
    lookup_key,
    user_refresh_rate_seconds,
    refresh_rate_seconds,
    slot_offset_ms,
    health_status,
    disabled_code
"#;

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn mark_ok(&self, fetch_key: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET health_status = 'ok', updated_at = NOW()
            WHERE (url = $1 OR lookup_key = $1)
                AND health_status <> 'ok'
            "#,
        )
        .bind(fetch_key)
        .execute(&self.pool)
        .await
        .context("Failed to mark feeds ok")?;

        Ok(result.rows_affected())
    }

    async fn mark_failing(&self, fetch_key: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET health_status = 'failing', updated_at = NOW()
            WHERE (url = $1 OR lookup_key = $1)
                AND health_status <> 'failing'
            "#,
        )
        .bind(fetch_key)
        .execute(&self.pool)
        .await
        .context("Failed to mark feeds failing")?;

        Ok(result.rows_affected())
    }

    async fn disable_failed(&self, fetch_key: &str) -> Result<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            UPDATE feeds
            SET disabled_code = 'failed-requests', health_status = 'failed', updated_at = NOW()
            WHERE (url = $1 OR lookup_key = $1)
                AND disabled_code IS NULL
            RETURNING id
            "#,
        )
        .bind(fetch_key)
        .fetch_all(&self.pool)
        .await
        .context("Failed to disable failed feeds")?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn disable_rejected(&self, fetch_key: &str, code: FeedDisabledCode) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET disabled_code = $2, updated_at = NOW()
            WHERE (url = $1 OR lookup_key = $1)
                AND disabled_code IS NULL
            "#,
        )
        .bind(fetch_key)
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to disable rejected feeds")?;

        Ok(result.rows_affected())
    }

    async fn disable_by_id(&self, feed_id: i64, code: FeedDisabledCode) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET disabled_code = $2, updated_at = NOW()
            WHERE id = $1
                AND disabled_code IS NULL
            "#,
        )
        .bind(feed_id)
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to disable feed by id")?;

        Ok(result.rows_affected())
    }

    async fn clear_disabled(&self, feed_id: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET disabled_code = NULL, health_status = 'ok', updated_at = NOW()
            WHERE id = $1
                AND disabled_code IS NOT NULL
            "#,
        )
        .bind(feed_id)
        .execute(&self.pool)
        .await
        .context("Failed to clear feed disabled code")?;

        Ok(result.rows_affected())
    }

    async fn find_by_id(&self, feed_id: i64) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = $1"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find feed by id")?;

        Ok(row.map(Feed::from))
    }

    async fn list_deliverable_page(
        &self,
        fetch_key: &str,
        rate_seconds: u32,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            WHERE (url = $1 OR lookup_key = $1)
                AND COALESCE(user_refresh_rate_seconds, refresh_rate_seconds) = $2
                AND disabled_code IS NULL
                AND id > $3
            ORDER BY id
            LIMIT $4
            "#
        ))
        .bind(fetch_key)
        .bind(rate_seconds as i32)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list deliverable feeds")?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    async fn list_by_owner_page(
        &self,
        owner_id: &str,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            WHERE owner_id = $1
                AND id > $2
            ORDER BY id
            LIMIT $3
            "#
        ))
        .bind(owner_id)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list feeds by owner")?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    async fn list_all_page(&self, after_id: i64, limit: i64) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            WHERE id > $1
            ORDER BY id
            LIMIT $2
            "#
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list feeds")?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    async fn set_assigned_rate(
        &self,
        feed_id: i64,
        rate_seconds: u32,
        slot_offset_ms: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET refresh_rate_seconds = $2, slot_offset_ms = $3, updated_at = NOW()
            WHERE id = $1
                AND refresh_rate_seconds <> $2
            "#,
        )
        .bind(feed_id)
        .bind(rate_seconds as i32)
        .bind(slot_offset_ms)
        .execute(&self.pool)
        .await
        .context("Failed to assign feed refresh rate")?;

        Ok(result.rows_affected())
    }

    async fn set_slot_offset(&self, feed_id: i64, slot_offset_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET slot_offset_ms = $2, updated_at = NOW()
            WHERE id = $1
                AND slot_offset_ms <> $2
            "#,
        )
        .bind(feed_id)
        .bind(slot_offset_ms)
        .execute(&self.pool)
        .await
        .context("Failed to set feed slot offset")?;

        Ok(result.rows_affected())
    }

    async fn distinct_user_refresh_rates(&self) -> Result<Vec<u32>> {
        let rates: Vec<(i32,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT user_refresh_rate_seconds
            FROM feeds
            WHERE user_refresh_rate_seconds IS NOT NULL
                AND disabled_code IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list distinct user refresh rates")?;

        Ok(rates.into_iter().map(|(r,)| r.max(0) as u32).collect())
    }
}
