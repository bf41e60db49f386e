//! Refresh-rate scheduling: per-rate timers, load distribution, periodic re-sync

pub mod slot_offset;
pub mod sync;
pub mod timers;

pub use slot_offset::calculate_slot_offset_ms;
pub use sync::{RateSyncJob, RateSyncScheduler};
pub use timers::{BusTickPublisher, ScheduleTimerManager, TickHandler};
