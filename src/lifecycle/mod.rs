//! Incident lifecycle: event log, state machine, tags and acknowledgements.
//!
//! Everything here operates on a single `Incident` aggregate in memory.
//! Persistence and locking live in the incident service.

pub mod acknowledgements;
pub mod event_log;
pub mod state;
pub mod tags;

pub use event_log::sort_events;
pub use state::IncidentStatus;
pub use tags::parse_tags;
