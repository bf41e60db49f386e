use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use super::connection::DatabasePool;
use super::models::{Connection, ConnectionDisabledCode, ConnectionKind};
use super::ConnectionStore;

/// PostgreSQL-backed connection store
pub struct PgConnectionStore {
    pool: DatabasePool,
}

impl PgConnectionStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: i64,
    feed_id: i64,
    kind: String,
    disabled_code: Option<String>,
    disabled_detail: Option<String>,
    filters: Option<serde_json::Value>,
    format_options: Option<serde_json::Value>,
}

impl From<ConnectionRow> for Connection {
    fn from(row: ConnectionRow) -> Self {
        let kind = ConnectionKind::parse(&row.kind).unwrap_or_else(|| {
            warn!(
                "Connection {} has unknown kind '{}', treating as channel",
                row.id, row.kind
            );
            ConnectionKind::Channel
        });
        let disabled_code = row.disabled_code.as_deref().and_then(|code| {
            let parsed = ConnectionDisabledCode::parse(code);
            if parsed.is_none() {
                warn!("Connection {} has unknown disabled code '{}'", row.id, code);
            }
            parsed
        });

        Connection {
            id: row.id,
            feed_id: row.feed_id,
            kind,
            disabled_code,
            disabled_detail: row.disabled_detail,
            filters: row.filters,
            format_options: row.format_options,
        }
    }
}

const CONNECTION_COLUMNS: &str = r#"
    id,
    feed_id,
    kind,
    disabled_code,
    disabled_detail,
    filters,
    format_options
"#;

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn find_by_id(&self, connection_id: i64) -> Result<Option<Connection>> {
        let row: Option<ConnectionRow> = sqlx::query_as(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = $1"
        ))
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find connection by id")?;

        Ok(row.map(Connection::from))
    }

    async fn list_enabled_by_feed(&self, feed_id: i64) -> Result<Vec<Connection>> {
        let rows: Vec<ConnectionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE feed_id = $1
                AND disabled_code IS NULL
            ORDER BY id
            "#
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list enabled connections")?;

        Ok(rows.into_iter().map(Connection::from).collect())
    }

    async fn disable(
        &self,
        connection_id: i64,
        code: ConnectionDisabledCode,
        detail: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE connections
            SET disabled_code = $2, disabled_detail = $3, updated_at = NOW()
            WHERE id = $1
                AND disabled_code IS NULL
            "#,
        )
        .bind(connection_id)
        .bind(code.as_str())
        .bind(detail)
        .execute(&self.pool)
        .await
        .context("Failed to disable connection")?;

        Ok(result.rows_affected())
    }

    async fn clear_disabled(&self, connection_id: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE connections
            SET disabled_code = NULL, disabled_detail = NULL, updated_at = NOW()
            WHERE id = $1
                AND disabled_code IS NOT NULL
            "#,
        )
        .bind(connection_id)
        .execute(&self.pool)
        .await
        .context("Failed to clear connection disabled code")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_is_first_write_wins() {
        let query = r#"
            UPDATE connections
            SET disabled_code = $2, disabled_detail = $3, updated_at = NOW()
            WHERE id = $1
                AND disabled_code IS NULL
            "#;

        assert!(query.contains("disabled_code IS NULL"));
    }

    #[test]
    fn test_connection_row_conversion() {
        let row = ConnectionRow {
            id: 3,
            feed_id: 1,
            kind: "webhook".to_string(),
            disabled_code: Some("missing-permissions".to_string()),
            disabled_detail: Some("forbidden".to_string()),
            filters: None,
            format_options: None,
        };

        let connection = Connection::from(row);
        assert_eq!(connection.kind, ConnectionKind::Webhook);
        assert_eq!(
            connection.disabled_code,
            Some(ConnectionDisabledCode::MissingPermissions)
        );
    }
}
