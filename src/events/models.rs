use serde::{Deserialize, Serialize};

use crate::benefits::models::DeliveryRateLimit;
use crate::store::models::{ConnectionDisabledCode, ConnectionKind, FeedDisabledCode};

/// Tick signal for one refresh rate; the fetch subsystem fans this out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub refresh_rate_seconds: u32,
}

/// A fetch for the key finished successfully at the given rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchCompletedEvent {
    pub fetch_key: String,
    pub rate_seconds: u32,
}

/// Fetches for the key have started failing but are still retried upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFailingEvent {
    pub fetch_key: String,
}

/// The fetch subsystem gave up on the key after sustained failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFailedDisableEvent {
    pub fetch_key: String,
}

/// The fetch subsystem refused the key outright
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRejectedDisableEvent {
    pub fetch_key: String,
    pub status: String,
}

/// Rejection status carried by [`FetchRejectedDisableEvent`]
pub const REFUSED_LARGE_FEED: &str = "refused-large-feed";

/// A single feed was rejected by a downstream processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRejectedDisableEvent {
    pub feed_id: i64,
    pub reject_code: String,
}

/// An article delivery was rejected for a single connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRejectedDisableConnectionEvent {
    pub feed_id: i64,
    pub connection_id: i64,
    pub reject_code: String,
    pub article_id: Option<String>,
    pub message: Option<String>,
}

/// One delivery destination inside a [`DeliverArticlesEvent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub connection_id: i64,
    pub kind: ConnectionKind,
    pub filters: Option<serde_json::Value>,
    pub format_options: Option<serde_json::Value>,
}

/// Request for the delivery workers to push new articles out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverArticlesEvent {
    pub feed_id: i64,
    pub url: String,
    pub fetch_key: String,
    pub rate_seconds: u32,
    pub connections: Vec<DeliveryTarget>,
    pub allow_webhooks: bool,
    pub daily_article_limit: u32,
    pub rate_limits: Vec<DeliveryRateLimit>,
}

/// Fixed mapping from downstream feed reject codes to disable reasons
pub fn feed_disabled_code_for_reject(reject_code: &str) -> FeedDisabledCode {
    match reject_code {
        "invalid-feed" => FeedDisabledCode::InvalidFeed,
        "feed-too-large" => FeedDisabledCode::FeedTooLarge,
        "exceeded-feed-limit" => FeedDisabledCode::ExceededFeedLimit,
        _ => FeedDisabledCode::FailedRequests,
    }
}

/// Fixed mapping from article reject codes to connection disable reasons
pub fn connection_disabled_code_for_reject(reject_code: &str) -> ConnectionDisabledCode {
    match reject_code {
        "bad-format" => ConnectionDisabledCode::BadFormat,
        "missing-medium" => ConnectionDisabledCode::MissingMedium,
        "missing-permissions" => ConnectionDisabledCode::MissingPermissions,
        _ => ConnectionDisabledCode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_reject_code_mapping() {
        assert_eq!(
            feed_disabled_code_for_reject("invalid-feed"),
            FeedDisabledCode::InvalidFeed
        );
        assert_eq!(
            feed_disabled_code_for_reject("feed-too-large"),
            FeedDisabledCode::FeedTooLarge
        );
        assert_eq!(
            feed_disabled_code_for_reject("exceeded-feed-limit"),
            FeedDisabledCode::ExceededFeedLimit
        );
        assert_eq!(
            feed_disabled_code_for_reject("something-new"),
            FeedDisabledCode::FailedRequests
        );
    }

    #[test]
    fn test_connection_reject_code_mapping() {
        assert_eq!(
            connection_disabled_code_for_reject("bad-format"),
            ConnectionDisabledCode::BadFormat
        );
        assert_eq!(
            connection_disabled_code_for_reject("missing-medium"),
            ConnectionDisabledCode::MissingMedium
        );
        assert_eq!(
            connection_disabled_code_for_reject("missing-permissions"),
            ConnectionDisabledCode::MissingPermissions
        );
        assert_eq!(
            connection_disabled_code_for_reject("totally-unexpected"),
            ConnectionDisabledCode::Unknown
        );
    }

    #[test]
    fn test_event_payload_round_trip() {
        let event = FetchCompletedEvent {
            fetch_key: "https://example.com/feed.xml".to_string(),
            rate_seconds: 120,
        };
        let payload = serde_json::to_value(&event).unwrap();
        let decoded: FetchCompletedEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(decoded.fetch_key, event.fetch_key);
        assert_eq!(decoded.rate_seconds, 120);
    }
}
