//! Incident service: the public API over stored incident aggregates

mod locks;
mod service;

pub use locks::IncidentLocks;
pub use service::{BulkAckOutcome, IncidentService};
