use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::benefits::models::EntitlementDefaults;
use crate::constants::metrics::METRICS_SERVER_PORT;
use crate::constants::scheduling::DEFAULT_SYNC_SCHEDULE;

/// The main configuration structure for feedcourier
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CourierConfig {
    /// Entitlement defaults applied when no source grants more
    #[validate]
    pub defaults: DefaultsConfig,

    /// Timer re-sync configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// External per-guild paid subscription API
    #[serde(default)]
    pub guild_subscriptions: GuildSubscriptionApiConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DefaultsConfig {
    /// System default refresh rate in seconds. Required; the process refuses
    /// to start without a usable value.
    #[validate(range(min = 1))]
    pub refresh_rate_seconds: u32,

    #[serde(default = "default_max_feeds")]
    pub max_feeds: u32,

    #[serde(default = "default_max_user_feeds")]
    pub max_user_feeds: u32,

    #[serde(default = "default_daily_article_limit")]
    pub daily_article_limit: u32,

    /// Daily cap for patron-valid supporters without a paid subscription
    #[serde(default = "default_supporter_daily_article_limit")]
    pub supporter_daily_article_limit: u32,
}

fn default_max_feeds() -> u32 {
    5
}

fn default_max_user_feeds() -> u32 {
    5
}

fn default_daily_article_limit() -> u32 {
    50
}

fn default_supporter_daily_article_limit() -> u32 {
    1000
}

impl From<&DefaultsConfig> for EntitlementDefaults {
    fn from(config: &DefaultsConfig) -> Self {
        EntitlementDefaults {
            max_feeds: config.max_feeds,
            max_user_feeds: config.max_user_feeds,
            refresh_rate_seconds: config.refresh_rate_seconds,
            daily_article_limit: config.daily_article_limit,
            supporter_daily_article_limit: config.supporter_daily_article_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron schedule for the timer re-sync job (default: every five minutes)
    #[serde(default = "default_sync_schedule")]
    pub sync_schedule: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_schedule: default_sync_schedule(),
        }
    }
}

fn default_sync_schedule() -> String {
    DEFAULT_SYNC_SCHEDULE.to_string()
}

/// Feature-flagged external per-guild paid override API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildSubscriptionApiConfig {
    #[serde(default)]
    pub enabled: bool,

    pub base_url: Option<String>,

    /// Bearer token (can be provided via environment in deployment)
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    METRICS_SERVER_PORT
}
