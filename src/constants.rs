//! Application-wide constants
//!
//! This module contains all the magic numbers and default values used throughout
//! the application, making them easy to find and modify.

/// Entitlement-related constants
pub mod entitlements {
    /// Flat refresh rate granted to valid supporters with no patron-derived rate (in seconds)
    pub const SUPPORTER_REFRESH_RATE_SECS: u32 = 120;

    /// Pledge threshold (in cents) above which a patron-derived refresh rate applies
    pub const PATRON_REFRESH_RATE_PLEDGE_CENTS: u32 = 500;

    /// Refresh rate granted by a qualifying patron pledge (in seconds)
    pub const PATRON_REFRESH_RATE_SECS: u32 = 120;

    /// Grace period after a declined patron's last successful charge (in days)
    pub const DECLINED_PATRON_GRACE_DAYS: i64 = 4;

    /// Window used when deriving delivery rate limits from the daily article cap (in seconds)
    pub const DAILY_LIMIT_WINDOW_SECS: u32 = 86_400;
}

/// Scheduling-related constants
pub mod scheduling {
    /// Default cron schedule for the timer re-sync job (every five minutes)
    pub const DEFAULT_SYNC_SCHEDULE: &str = "0 */5 * * * *";

    /// Page size used when cursoring over matched feeds
    pub const FEED_PAGE_SIZE: i64 = 500;
}

/// Metrics-related constants
pub mod metrics {
    /// Port for Prometheus metrics server
    pub const METRICS_SERVER_PORT: u16 = 9090;
}

/// Database-related constants
pub mod database {
    /// Connection pool maximum size
    pub const MAX_POOL_SIZE: u32 = 10;

    /// Connection pool minimum size
    pub const MIN_POOL_SIZE: u32 = 2;
}

/// Event-bus-related constants
pub mod bus {
    /// Per-subscriber channel capacity before publishers are backpressured
    pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 1024;
}
