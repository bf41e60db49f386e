//! Entitlement resolution
//!
//! Computes the benefit bundle that drives refresh cadence and delivery
//! throughput for an owner or a server. Resolution is a pure function of the
//! current supporter/patron/legacy records; absent or expired records degrade
//! silently to the defaults because this sits on the scheduling hot path.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use super::guild_api::GuildSubscriptionClient;
use super::models::{
    Benefits, DeliveryRateLimit, EntitlementDefaults, LegacyOverride, MaxUserFeedsComposition,
    PatronRecord, ServerBenefits, SupporterRecord,
};
use super::patron::{is_valid_patron, max_benefits_from_patrons};
use crate::constants::entitlements::{DAILY_LIMIT_WINDOW_SECS, SUPPORTER_REFRESH_RATE_SECS};
use crate::store::EntitlementStore;

/// Compute an owner's benefits from their current records
pub fn resolve_owner_benefits(
    defaults: &EntitlementDefaults,
    supporter: Option<&SupporterRecord>,
    patrons: &[PatronRecord],
    legacy: Option<&LegacyOverride>,
    now: DateTime<Utc>,
) -> Benefits {
    let legacy_user_feeds = legacy.map(|l| l.additional_user_feeds).unwrap_or(0);

    let Some(supporter) = supporter else {
        return default_benefits(defaults, legacy_user_feeds);
    };

    let has_valid_patron = patrons.iter().any(|p| is_valid_patron(p, now));
    let is_valid = supporter.paid_subscription.is_some()
        || supporter.expire_at.is_some_and(|at| at > now)
        || has_valid_patron;

    if !is_valid {
        return default_benefits(defaults, legacy_user_feeds);
    }

    let patron_benefits = max_benefits_from_patrons(patrons, defaults.max_feeds, now);

    let max_feeds = supporter
        .max_feeds
        .unwrap_or(defaults.max_feeds)
        .max(patron_benefits.max_feeds);

    let max_guilds = supporter
        .max_guilds
        .unwrap_or(1)
        .max(patron_benefits.max_guilds);

    let base_max_user_feeds = supporter
        .paid_subscription
        .as_ref()
        .map(|sub| sub.max_user_feeds)
        .or(supporter.max_user_feeds)
        .unwrap_or(defaults.max_user_feeds)
        .max(patron_benefits.max_user_feeds);

    let refresh_rate_seconds = if let Some(sub) = &supporter.paid_subscription {
        sub.refresh_rate_seconds
    } else if supporter.slow_rate {
        defaults.refresh_rate_seconds
    } else if let Some(rate) = patron_benefits.refresh_rate_seconds.filter(|_| has_valid_patron) {
        rate
    } else {
        SUPPORTER_REFRESH_RATE_SECS
    };

    let daily_article_limit = if let Some(sub) = &supporter.paid_subscription {
        sub.daily_article_limit
    } else if has_valid_patron {
        defaults.supporter_daily_article_limit
    } else {
        defaults.daily_article_limit
    };

    let allow_webhooks = supporter
        .paid_subscription
        .as_ref()
        .map(|sub| sub.allow_webhooks)
        .unwrap_or(false)
        || patron_benefits.allow_webhooks;

    Benefits {
        is_supporter: true,
        max_feeds,
        max_user_feeds: base_max_user_feeds + legacy_user_feeds,
        max_user_feeds_composition: MaxUserFeedsComposition {
            base: base_max_user_feeds,
            legacy: legacy_user_feeds,
        },
        max_guilds,
        refresh_rate_seconds,
        daily_article_limit,
        rate_limits: rate_limits_for(daily_article_limit),
        allow_webhooks,
    }
}

/// Hard defaults; the grandfathered allowance still applies so legacy
/// accounts keep their extra feeds independent of current supporter status
fn default_benefits(defaults: &EntitlementDefaults, legacy_user_feeds: u32) -> Benefits {
    Benefits {
        is_supporter: false,
        max_feeds: defaults.max_feeds,
        max_user_feeds: defaults.max_user_feeds + legacy_user_feeds,
        max_user_feeds_composition: MaxUserFeedsComposition {
            base: defaults.max_user_feeds,
            legacy: legacy_user_feeds,
        },
        max_guilds: 1,
        refresh_rate_seconds: defaults.refresh_rate_seconds,
        daily_article_limit: defaults.daily_article_limit,
        rate_limits: rate_limits_for(defaults.daily_article_limit),
        allow_webhooks: false,
    }
}

fn rate_limits_for(daily_article_limit: u32) -> Vec<DeliveryRateLimit> {
    vec![DeliveryRateLimit {
        limit: daily_article_limit,
        window_seconds: DAILY_LIMIT_WINDOW_SECS,
    }]
}

/// Resolves entitlement bundles from the read-only record stores
pub struct BenefitsResolver {
    store: Arc<dyn EntitlementStore>,
    guild_api: Option<GuildSubscriptionClient>,
    defaults: EntitlementDefaults,
}

impl BenefitsResolver {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        guild_api: Option<GuildSubscriptionClient>,
        defaults: EntitlementDefaults,
    ) -> Self {
        Self {
            store,
            guild_api,
            defaults,
        }
    }

    pub fn defaults(&self) -> &EntitlementDefaults {
        &self.defaults
    }

    /// Resolve an owner's benefits from their current records. Store errors
    /// are logged and degrade to absent records rather than failing the
    /// scheduling path.
    pub async fn owner_benefits(&self, owner_id: &str) -> Benefits {
        let supporter = match self.store.find_supporter(owner_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load supporter record for {}: {}", owner_id, e);
                None
            }
        };

        let patrons = match self.store.find_patrons(owner_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load patron records for {}: {}", owner_id, e);
                Vec::new()
            }
        };

        let legacy = match self.store.find_legacy_override(owner_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load legacy override for {}: {}", owner_id, e);
                None
            }
        };

        resolve_owner_benefits(
            &self.defaults,
            supporter.as_ref(),
            &patrons,
            legacy.as_ref(),
            Utc::now(),
        )
    }

    /// Resolve per-server benefits. A configured guild subscription fully
    /// overrides; otherwise the most generous supporter listing the guild
    /// wins on each axis.
    pub async fn server_benefits(&self, server_ids: &[String]) -> Vec<ServerBenefits> {
        let mut results = Vec::with_capacity(server_ids.len());
        for server_id in server_ids {
            results.push(self.single_server_benefits(server_id).await);
        }
        results
    }

    async fn single_server_benefits(&self, server_id: &str) -> ServerBenefits {
        if let Some(client) = &self.guild_api {
            match client.subscription(server_id).await {
                Ok(Some(subscription)) => {
                    return ServerBenefits {
                        server_id: server_id.to_string(),
                        has_supporter: true,
                        max_feeds: subscription.max_feeds,
                        refresh_rate_seconds: Some(subscription.refresh_rate_seconds),
                        allow_webhooks: true,
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Guild subscription lookup failed for {}: {}", server_id, e);
                }
            }
        }

        let mut supporters = match self.store.find_supporters_for_guild(server_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load supporters for guild {}: {}", server_id, e);
                Vec::new()
            }
        };

        if supporters.is_empty() {
            return ServerBenefits {
                server_id: server_id.to_string(),
                has_supporter: false,
                max_feeds: self.defaults.max_feeds,
                refresh_rate_seconds: None,
                allow_webhooks: false,
            };
        }

        // Deterministic aggregation order regardless of store iteration order
        supporters.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));

        let mut max_feeds = self.defaults.max_feeds;
        let mut allow_webhooks = false;
        let mut refresh_rate_seconds = None;
        for supporter in &supporters {
            max_feeds = max_feeds.max(supporter.max_feeds.unwrap_or(self.defaults.max_feeds));
            if let Some(sub) = &supporter.paid_subscription {
                allow_webhooks = allow_webhooks || sub.allow_webhooks;
                if refresh_rate_seconds.is_none() {
                    refresh_rate_seconds = Some(sub.refresh_rate_seconds);
                }
            }
        }

        ServerBenefits {
            server_id: server_id.to_string(),
            has_supporter: true,
            max_feeds,
            refresh_rate_seconds,
            allow_webhooks,
        }
    }
}
