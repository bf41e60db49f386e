use serde::{Deserialize, Serialize};

/// Transient health signal driven by fetch outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Ok,
    Failing,
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Failing => "failing",
            HealthStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(HealthStatus::Ok),
            "failing" => Some(HealthStatus::Failing),
            "failed" => Some(HealthStatus::Failed),
            _ => None,
        }
    }
}

/// Sticky reason a feed stopped being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedDisabledCode {
    FailedRequests,
    FeedTooLarge,
    InvalidFeed,
    ExceededFeedLimit,
}

impl FeedDisabledCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedDisabledCode::FailedRequests => "failed-requests",
            FeedDisabledCode::FeedTooLarge => "feed-too-large",
            FeedDisabledCode::InvalidFeed => "invalid-feed",
            FeedDisabledCode::ExceededFeedLimit => "exceeded-feed-limit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "failed-requests" => Some(FeedDisabledCode::FailedRequests),
            "feed-too-large" => Some(FeedDisabledCode::FeedTooLarge),
            "invalid-feed" => Some(FeedDisabledCode::InvalidFeed),
            "exceeded-feed-limit" => Some(FeedDisabledCode::ExceededFeedLimit),
            _ => None,
        }
    }
}

/// Sticky reason a single delivery connection stopped being used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionDisabledCode {
    BadFormat,
    MissingMedium,
    MissingPermissions,
    Unknown,
}

impl ConnectionDisabledCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionDisabledCode::BadFormat => "bad-format",
            ConnectionDisabledCode::MissingMedium => "missing-medium",
            ConnectionDisabledCode::MissingPermissions => "missing-permissions",
            ConnectionDisabledCode::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bad-format" => Some(ConnectionDisabledCode::BadFormat),
            "missing-medium" => Some(ConnectionDisabledCode::MissingMedium),
            "missing-permissions" => Some(ConnectionDisabledCode::MissingPermissions),
            "unknown" => Some(ConnectionDisabledCode::Unknown),
            _ => None,
        }
    }
}

/// Destination variant for a delivery connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    Channel,
    Webhook,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Channel => "channel",
            ConnectionKind::Webhook => "webhook",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "channel" => Some(ConnectionKind::Channel),
            "webhook" => Some(ConnectionKind::Webhook),
            _ => None,
        }
    }
}

/// A content feed registered for periodic refresh
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub owner_id: String,
    /// Alternate correlation key used instead of the url when the source
    /// requires per-owner credentials
    pub lookup_key: Option<String>,
    pub user_refresh_rate_seconds: Option<u32>,
    pub refresh_rate_seconds: u32,
    pub slot_offset_ms: i64,
    pub health_status: HealthStatus,
    pub disabled_code: Option<FeedDisabledCode>,
}

impl Feed {
    /// User override if present, else the system-assigned rate
    pub fn effective_refresh_rate_seconds(&self) -> u32 {
        self.user_refresh_rate_seconds
            .unwrap_or(self.refresh_rate_seconds)
    }

    /// Key the fetch subsystem correlates outcomes under
    pub fn fetch_key(&self) -> &str {
        self.lookup_key.as_deref().unwrap_or(&self.url)
    }
}

/// A delivery destination attached to a feed
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: i64,
    pub feed_id: i64,
    pub kind: ConnectionKind,
    pub disabled_code: Option<ConnectionDisabledCode>,
    pub disabled_detail: Option<String>,
    /// Opaque per-connection article filters, owned by the CRUD surface
    pub filters: Option<serde_json::Value>,
    /// Opaque per-connection format options, owned by the CRUD surface
    pub format_options: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_round_trip() {
        for status in [HealthStatus::Ok, HealthStatus::Failing, HealthStatus::Failed] {
            assert_eq!(HealthStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(HealthStatus::parse("bogus"), None);
    }

    #[test]
    fn test_disabled_code_round_trip() {
        for code in [
            FeedDisabledCode::FailedRequests,
            FeedDisabledCode::FeedTooLarge,
            FeedDisabledCode::InvalidFeed,
            FeedDisabledCode::ExceededFeedLimit,
        ] {
            assert_eq!(FeedDisabledCode::parse(code.as_str()), Some(code));
        }
    }

    #[test]
    fn test_effective_refresh_rate_prefers_user_override() {
        let mut feed = Feed {
            id: 1,
            url: "https://example.com/feed.xml".to_string(),
            owner_id: "owner-1".to_string(),
            lookup_key: None,
            user_refresh_rate_seconds: None,
            refresh_rate_seconds: 600,
            slot_offset_ms: 0,
            health_status: HealthStatus::Ok,
            disabled_code: None,
        };
        assert_eq!(feed.effective_refresh_rate_seconds(), 600);

        feed.user_refresh_rate_seconds = Some(120);
        assert_eq!(feed.effective_refresh_rate_seconds(), 120);
    }

    #[test]
    fn test_fetch_key_prefers_lookup_key() {
        let mut feed = Feed {
            id: 1,
            url: "https://example.com/feed.xml".to_string(),
            owner_id: "owner-1".to_string(),
            lookup_key: None,
            user_refresh_rate_seconds: None,
            refresh_rate_seconds: 600,
            slot_offset_ms: 0,
            health_status: HealthStatus::Ok,
            disabled_code: None,
        };
        assert_eq!(feed.fetch_key(), "https://example.com/feed.xml");

        feed.lookup_key = Some("owner-1:example".to_string());
        assert_eq!(feed.fetch_key(), "owner-1:example");
    }
}
