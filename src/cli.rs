use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use crate::constants::scheduling::FEED_PAGE_SIZE;
use crate::scheduler::calculate_slot_offset_ms;
use crate::store::FeedStore;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "feedcourier - a feed refresh-scheduling and delivery-health daemon",
    long_about = "feedcourier decides when each content feed is checked, spreads \
                  fetch load inside each refresh window, routes fetch outcomes into \
                  durable feed health state, and computes the paid-tier entitlements \
                  that drive refresh cadence."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the feedcourier daemon (default behavior)
    Run,
    /// Recompute every feed's slot offset against its effective refresh
    /// window. Only needed after the offset hash changes.
    RecomputeOffsets,
}

/// Full-table slot offset recompute. Returns (scanned, updated) counts.
pub async fn recompute_all_offsets(feeds: &dyn FeedStore) -> Result<(u64, u64)> {
    let mut scanned = 0u64;
    let mut updated = 0u64;
    let mut after_id = 0;

    loop {
        let page = feeds.list_all_page(after_id, FEED_PAGE_SIZE).await?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = last.id;

        for feed in &page {
            scanned += 1;
            let offset =
                calculate_slot_offset_ms(&feed.url, feed.effective_refresh_rate_seconds());
            if offset == feed.slot_offset_ms {
                continue;
            }
            match feeds.set_slot_offset(feed.id, offset).await {
                Ok(changed) => updated += changed,
                Err(e) => {
                    error!("Failed to update slot offset for feed {}: {}", feed.id, e);
                }
            }
        }
    }

    Ok((scanned, updated))
}
