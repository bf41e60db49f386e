//! Per-rate recurring timers
//!
//! One tokio task per distinct refresh rate. Re-syncing the rate set cancels
//! timers whose rate is no longer required and starts timers for new rates;
//! unchanged rates are left untouched. Cancelling a timer stops its future
//! ticks only: a tick callback already dispatched runs to completion.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::bus::{topics, EventBus};
use crate::events::models::ScheduleEvent;
use crate::metrics;

/// Callback fired on every tick of a rate timer
#[async_trait]
pub trait TickHandler: Send + Sync {
    async fn handle_tick(&self, rate_seconds: u32) -> Result<()>;
}

/// What a single sync pass changed, in milliseconds-rate terms
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub started: Vec<u64>,
    pub cancelled: Vec<u64>,
}

/// Owns the rate → timer map; multiple managers can coexist (e.g. in tests)
pub struct ScheduleTimerManager {
    timers: Mutex<HashMap<u64, JoinHandle<()>>>,
    handler: Arc<dyn TickHandler>,
}

impl ScheduleTimerManager {
    pub fn new(handler: Arc<dyn TickHandler>) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            handler,
        }
    }

    /// Diff the running timers against the required rate set: cancel timers
    /// for rates no longer required, start timers for newly required rates
    pub async fn sync_timer_states(&self, required_ms: &HashSet<u64>) -> SyncOutcome {
        let mut timers = self.timers.lock().await;

        let mut cancelled = Vec::new();
        timers.retain(|rate_ms, handle| {
            if required_ms.contains(rate_ms) {
                true
            } else {
                handle.abort();
                cancelled.push(*rate_ms);
                false
            }
        });

        let mut started = Vec::new();
        for &rate_ms in required_ms {
            if !timers.contains_key(&rate_ms) {
                timers.insert(rate_ms, spawn_rate_timer(rate_ms, Arc::clone(&self.handler)));
                started.push(rate_ms);
            }
        }

        started.sort_unstable();
        cancelled.sort_unstable();
        metrics::set_active_rate_timers(timers.len() as i64);

        SyncOutcome { started, cancelled }
    }

    /// Rates with a running timer, in milliseconds, sorted
    pub async fn active_rates_ms(&self) -> Vec<u64> {
        let timers = self.timers.lock().await;
        let mut rates: Vec<u64> = timers.keys().copied().collect();
        rates.sort_unstable();
        rates
    }

    /// Cancel every timer
    pub async fn stop(&self) {
        let mut timers = self.timers.lock().await;
        let count = timers.len();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        metrics::set_active_rate_timers(0);
        info!("Stopped {} rate timers", count);
    }
}

fn spawn_rate_timer(rate_ms: u64, handler: Arc<dyn TickHandler>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(rate_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; a fresh timer
        // should wait a full period before firing
        ticker.tick().await;

        debug!("Started rate timer for {}ms", rate_ms);
        let rate_seconds = (rate_ms / 1000) as u32;

        loop {
            ticker.tick().await;
            metrics::record_schedule_tick(rate_seconds);

            // Each tick runs in its own task so a panicking or slow callback
            // never stops this rate's timer or affects other rates
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handler.handle_tick(rate_seconds).await {
                    error!("Tick handler failed for {}s rate: {}", rate_seconds, e);
                }
            });
        }
    })
}

/// Publishes a schedule event per tick for the fetch subsystem to consume
pub struct BusTickPublisher {
    bus: Arc<dyn EventBus>,
}

impl BusTickPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl TickHandler for BusTickPublisher {
    async fn handle_tick(&self, rate_seconds: u32) -> Result<()> {
        let event = ScheduleEvent {
            refresh_rate_seconds: rate_seconds,
        };
        self.bus
            .publish(topics::SCHEDULE_TICK, serde_json::to_value(event)?)
            .await
    }
}
