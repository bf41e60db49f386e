//! Prometheus metrics for the scheduling and outcome pipeline

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

lazy_static! {
    /// Number of currently running per-rate timers
    static ref ACTIVE_RATE_TIMERS: IntGauge = register_int_gauge!(
        "feedcourier_active_rate_timers",
        "Number of currently running per-rate timers"
    ).expect("Failed to create active_rate_timers metric");

    /// Schedule ticks fired, by refresh rate
    static ref SCHEDULE_TICKS: IntCounterVec = register_int_counter_vec!(
        "feedcourier_schedule_ticks_total",
        "Schedule ticks fired",
        &["rate_seconds"]
    ).expect("Failed to create schedule_ticks metric");

    /// Fetch outcome events processed, by kind
    static ref OUTCOME_EVENTS: IntCounterVec = register_int_counter_vec!(
        "feedcourier_outcome_events_total",
        "Fetch outcome events processed",
        &["kind"]
    ).expect("Failed to create outcome_events metric");

    /// Feeds disabled, by reason
    static ref FEEDS_DISABLED: IntCounterVec = register_int_counter_vec!(
        "feedcourier_feeds_disabled_total",
        "Feeds disabled",
        &["code"]
    ).expect("Failed to create feeds_disabled metric");

    /// Connections disabled, by reason
    static ref CONNECTIONS_DISABLED: IntCounterVec = register_int_counter_vec!(
        "feedcourier_connections_disabled_total",
        "Connections disabled",
        &["code"]
    ).expect("Failed to create connections_disabled metric");

    /// Delivery events emitted
    static ref DELIVERIES_EMITTED: IntCounter = register_int_counter!(
        "feedcourier_deliveries_emitted_total",
        "Delivery events emitted"
    ).expect("Failed to create deliveries_emitted metric");
}

pub fn set_active_rate_timers(count: i64) {
    ACTIVE_RATE_TIMERS.set(count);
}

pub fn record_schedule_tick(rate_seconds: u32) {
    SCHEDULE_TICKS
        .with_label_values(&[&rate_seconds.to_string()])
        .inc();
}

pub fn record_outcome_event(kind: &str) {
    OUTCOME_EVENTS.with_label_values(&[kind]).inc();
}

pub fn record_feeds_disabled(code: &str, count: u64) {
    FEEDS_DISABLED.with_label_values(&[code]).inc_by(count);
}

pub fn record_connection_disabled(code: &str) {
    CONNECTIONS_DISABLED.with_label_values(&[code]).inc();
}

pub fn record_delivery_emitted() {
    DELIVERIES_EMITTED.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        record_schedule_tick(120);
        record_schedule_tick(120);
        assert!(
            SCHEDULE_TICKS
                .with_label_values(&["120"])
                .get()
                >= 2
        );

        record_feeds_disabled("failed-requests", 3);
        assert!(
            FEEDS_DISABLED
                .with_label_values(&["failed-requests"])
                .get()
                >= 3
        );
    }
}
