//! Periodic rate-set re-derivation
//!
//! Entitlements and user schedules change continuously, so the set of
//! required rate timers is re-derived on a fixed cron schedule. The same pass
//! re-assigns each supporter owner's feeds to their current entitled rate and
//! recomputes slot offsets against the new window.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use super::slot_offset::calculate_slot_offset_ms;
use super::timers::ScheduleTimerManager;
use crate::benefits::BenefitsResolver;
use crate::constants::scheduling::FEED_PAGE_SIZE;
use crate::store::{EntitlementStore, FeedStore};

pub struct RateSyncJob {
    feeds: Arc<dyn FeedStore>,
    entitlements: Arc<dyn EntitlementStore>,
    resolver: Arc<BenefitsResolver>,
    timers: Arc<ScheduleTimerManager>,
    default_rate_seconds: u32,
}

impl RateSyncJob {
    pub fn new(
        feeds: Arc<dyn FeedStore>,
        entitlements: Arc<dyn EntitlementStore>,
        resolver: Arc<BenefitsResolver>,
        timers: Arc<ScheduleTimerManager>,
        default_rate_seconds: u32,
    ) -> Self {
        Self {
            feeds,
            entitlements,
            resolver,
            timers,
            default_rate_seconds,
        }
    }

    /// One full sync pass: derive the required rate set, diff the timers,
    /// then bring supporter-owned feeds onto their entitled rates
    pub async fn run_once(&self) -> Result<()> {
        let required = self.required_rates_ms().await?;
        let outcome = self.timers.sync_timer_states(&required).await;

        if outcome.started.is_empty() && outcome.cancelled.is_empty() {
            debug!("Timer sync left {} rates unchanged", required.len());
        } else {
            info!(
                "Timer sync started {:?} and cancelled {:?} (ms rates)",
                outcome.started, outcome.cancelled
            );
        }

        self.reassign_supporter_rates().await;
        Ok(())
    }

    /// Union of the default rate, every supporter owner's entitled rate, and
    /// every user-configured schedule rate, in milliseconds
    async fn required_rates_ms(&self) -> Result<HashSet<u64>> {
        let mut required = HashSet::new();
        required.insert(u64::from(self.default_rate_seconds) * 1000);

        let supporters = self
            .entitlements
            .list_supporters()
            .await
            .context("Failed to list supporters for rate derivation")?;
        for supporter in &supporters {
            let benefits = self.resolver.owner_benefits(&supporter.owner_id).await;
            required.insert(u64::from(benefits.refresh_rate_seconds) * 1000);
        }

        let custom = self
            .feeds
            .distinct_user_refresh_rates()
            .await
            .context("Failed to list user schedule rates")?;
        for rate in custom {
            if rate > 0 {
                required.insert(u64::from(rate) * 1000);
            }
        }

        Ok(required)
    }

    /// Re-assign every supporter owner's feeds to their current entitled
    /// rate. Per-owner and per-feed failures are logged and skipped so one
    /// bad record cannot stall the sweep.
    async fn reassign_supporter_rates(&self) {
        let supporters = match self.entitlements.list_supporters().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Skipping rate re-assignment, supporter listing failed: {}", e);
                return;
            }
        };

        for supporter in &supporters {
            let benefits = self.resolver.owner_benefits(&supporter.owner_id).await;
            if let Err(e) = self
                .reassign_owner_feeds(&supporter.owner_id, benefits.refresh_rate_seconds)
                .await
            {
                error!(
                    "Failed to re-assign feeds for owner {}: {}",
                    supporter.owner_id, e
                );
            }
        }
    }

    async fn reassign_owner_feeds(&self, owner_id: &str, rate_seconds: u32) -> Result<()> {
        let mut after_id = 0;
        loop {
            let page = self
                .feeds
                .list_by_owner_page(owner_id, after_id, FEED_PAGE_SIZE)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;

            for feed in &page {
                if feed.refresh_rate_seconds == rate_seconds {
                    continue;
                }
                // A user override keeps the effective window; the recomputed
                // offset lands in whichever window is effective after the change
                let window_rate = feed.user_refresh_rate_seconds.unwrap_or(rate_seconds);
                let offset = calculate_slot_offset_ms(&feed.url, window_rate);
                if let Err(e) = self.feeds.set_assigned_rate(feed.id, rate_seconds, offset).await {
                    error!("Failed to re-assign rate for feed {}: {}", feed.id, e);
                }
            }
        }
        Ok(())
    }
}

/// Runs the sync job on a cron schedule
pub struct RateSyncScheduler {
    job: Arc<RateSyncJob>,
    scheduler: JobScheduler,
    schedule: String,
}

impl RateSyncScheduler {
    pub async fn new(job: Arc<RateSyncJob>, schedule: String) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create sync job scheduler")?;

        Ok(Self {
            job,
            scheduler,
            schedule,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting timer re-sync with cron schedule: {}", self.schedule);

        let job = Arc::clone(&self.job);
        let cron_job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let job = Arc::clone(&job);
            Box::pin(async move {
                debug!("Running scheduled timer re-sync");
                if let Err(e) = job.run_once().await {
                    error!("Timer re-sync failed: {}", e);
                }
            })
        })
        .context("Failed to create sync job")?;

        self.scheduler
            .add(cron_job)
            .await
            .context("Failed to add sync job to scheduler")?;
        self.scheduler
            .start()
            .await
            .context("Failed to start sync scheduler")?;

        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping timer re-sync scheduler");
        self.scheduler
            .shutdown()
            .await
            .context("Failed to shutdown sync scheduler")?;
        Ok(())
    }
}
