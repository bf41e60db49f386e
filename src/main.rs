use std::sync::Arc;

use clap::Parser;
use tracing::info;

use feedcourier::benefits::guild_api::GuildSubscriptionClient;
use feedcourier::benefits::models::EntitlementDefaults;
use feedcourier::benefits::BenefitsResolver;
use feedcourier::bus::{EventBus, InMemoryBus};
use feedcourier::cli::{self, Cli, Commands};
use feedcourier::config::{self, CourierConfig};
use feedcourier::error::CourierError;
use feedcourier::events::OutcomeRouter;
use feedcourier::metrics;
use feedcourier::notifications::BusNotifier;
use feedcourier::scheduler::{
    BusTickPublisher, RateSyncJob, RateSyncScheduler, ScheduleTimerManager,
};
use feedcourier::store::connection::{establish_connection, run_migrations};
use feedcourier::store::connection_repository::PgConnectionStore;
use feedcourier::store::entitlement_repository::PgEntitlementStore;
use feedcourier::store::feed_repository::PgFeedStore;
use feedcourier::store::{ConnectionStore, EntitlementStore, FeedStore};

#[tokio::main]
async fn main() -> Result<(), CourierError> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    info!("Using configuration file: {:?}", config_path);
    let config = config::load_config(&config_path)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::RecomputeOffsets => recompute_offsets().await,
    }
}

async fn run_daemon(config: CourierConfig) -> Result<(), CourierError> {
    let pool = establish_connection().await?;
    run_migrations(&pool).await?;

    let feeds: Arc<dyn FeedStore> = Arc::new(PgFeedStore::new(pool.clone()));
    let connections: Arc<dyn ConnectionStore> = Arc::new(PgConnectionStore::new(pool.clone()));
    let entitlements: Arc<dyn EntitlementStore> = Arc::new(PgEntitlementStore::new(pool));

    let guild_api = match (
        config.guild_subscriptions.enabled,
        &config.guild_subscriptions.base_url,
    ) {
        (true, Some(base_url)) => Some(GuildSubscriptionClient::new(
            base_url.clone(),
            config.guild_subscriptions.access_token.clone(),
        )?),
        _ => None,
    };

    let resolver = Arc::new(BenefitsResolver::new(
        Arc::clone(&entitlements),
        guild_api,
        EntitlementDefaults::from(&config.defaults),
    ));

    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let notifier = Arc::new(BusNotifier::new(Arc::clone(&bus)));

    let router = Arc::new(OutcomeRouter::new(
        Arc::clone(&feeds),
        connections,
        Arc::clone(&resolver),
        Arc::clone(&bus),
        notifier,
    ));
    let router_handles = router.start().await;
    info!("Outcome router running with {} subscriptions", router_handles.len());

    let timers = Arc::new(ScheduleTimerManager::new(Arc::new(BusTickPublisher::new(
        Arc::clone(&bus),
    ))));

    let sync_job = Arc::new(RateSyncJob::new(
        feeds,
        entitlements,
        resolver,
        Arc::clone(&timers),
        config.defaults.refresh_rate_seconds,
    ));

    // Bring the timer set up before the cron cadence takes over
    sync_job.run_once().await?;

    let mut sync_scheduler =
        RateSyncScheduler::new(sync_job, config.scheduler.sync_schedule.clone()).await?;
    sync_scheduler.start().await?;

    if config.metrics.enabled {
        metrics::server::start_metrics_server(config.metrics.port).await?;
    }

    info!("feedcourier is running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    timers.stop().await;
    sync_scheduler.stop().await?;
    for handle in router_handles {
        handle.abort();
    }

    Ok(())
}

async fn recompute_offsets() -> Result<(), CourierError> {
    let pool = establish_connection().await?;
    run_migrations(&pool).await?;

    let feeds = PgFeedStore::new(pool);
    let (scanned, updated) = cli::recompute_all_offsets(&feeds).await?;
    info!(
        "Slot offset recompute complete: {} feeds scanned, {} updated",
        scanned, updated
    );

    Ok(())
}
