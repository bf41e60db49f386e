use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Benefits attached to an active paid subscription on a supporter record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidSubscriptionBenefits {
    pub refresh_rate_seconds: u32,
    pub allow_webhooks: bool,
    pub daily_article_limit: u32,
    pub max_user_feeds: u32,
}

/// An owner's supporter record, externally owned by billing/administration
#[derive(Debug, Clone)]
pub struct SupporterRecord {
    pub owner_id: String,
    pub guild_ids: Vec<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub max_feeds: Option<u32>,
    pub max_user_feeds: Option<u32>,
    pub max_guilds: Option<u32>,
    pub paid_subscription: Option<PaidSubscriptionBenefits>,
    /// Pins the owner to the default refresh rate despite supporter status
    pub slow_rate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatronStatus {
    Active,
    Declined,
    Former,
}

impl PatronStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatronStatus::Active => "active",
            PatronStatus::Declined => "declined",
            PatronStatus::Former => "former",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(PatronStatus::Active),
            "declined" => Some(PatronStatus::Declined),
            "former" => Some(PatronStatus::Former),
            _ => None,
        }
    }
}

/// A pledge record, externally owned; pledge amounts are in cents
#[derive(Debug, Clone)]
pub struct PatronRecord {
    pub status: PatronStatus,
    pub pledge: u32,
    pub pledge_lifetime: u32,
    pub pledge_override: Option<u32>,
    pub last_charge: Option<DateTime<Utc>>,
}

impl PatronRecord {
    /// Pledge used for tiering: the override when set, else the current pledge
    pub fn effective_pledge(&self) -> u32 {
        self.pledge_override.unwrap_or(self.pledge)
    }
}

/// Additive grandfathered feed allowance for legacy accounts
#[derive(Debug, Clone)]
pub struct LegacyOverride {
    pub owner_id: String,
    pub additional_user_feeds: u32,
}

/// Breakdown of the user-feed allowance, kept for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxUserFeedsComposition {
    pub base: u32,
    pub legacy: u32,
}

/// A delivery throughput cap over a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRateLimit {
    pub limit: u32,
    pub window_seconds: u32,
}

/// The resolved entitlement bundle for an owner at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benefits {
    pub is_supporter: bool,
    pub max_feeds: u32,
    pub max_user_feeds: u32,
    pub max_user_feeds_composition: MaxUserFeedsComposition,
    pub max_guilds: u32,
    pub refresh_rate_seconds: u32,
    pub daily_article_limit: u32,
    pub rate_limits: Vec<DeliveryRateLimit>,
    pub allow_webhooks: bool,
}

/// The resolved entitlement bundle for a single server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBenefits {
    pub server_id: String,
    pub has_supporter: bool,
    pub max_feeds: u32,
    pub refresh_rate_seconds: Option<u32>,
    pub allow_webhooks: bool,
}

/// Hard defaults applied when no entitlement source grants more
#[derive(Debug, Clone, Copy)]
pub struct EntitlementDefaults {
    pub max_feeds: u32,
    pub max_user_feeds: u32,
    pub refresh_rate_seconds: u32,
    pub daily_article_limit: u32,
    /// Daily cap granted to patron-valid supporters without a paid subscription
    pub supporter_daily_article_limit: u32,
}
