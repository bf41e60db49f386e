//! Fetch outcome events and their routing into durable feed state

pub mod models;
pub mod router;


pub use router::OutcomeRouter;
