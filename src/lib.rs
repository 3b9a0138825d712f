//! Incident ledger
//!
//! Event-sourced incident lifecycle core: incidents carry an append-only log
//! of typed events (START, ACKNOWLEDGE, CLOSE, OTHER) from which their status
//! is derived, acknowledgements expire, and incidents are found through tags
//! and comma separated search terms. The library has no transport; a host
//! drives it through the async services below.
//!
//! ```no_run
//! use incident_ledger::config::Config;
//! use incident_ledger::incidents::IncidentService;
//! use incident_ledger::models::NewIncident;
//! use incident_ledger::sources::SourceRegistry;
//! use incident_ledger::state::create_store;
//!
//! # async fn run() -> incident_ledger::error::Result<()> {
//! let config = Config::load()?;
//! let store = create_store(&config.state)?;
//!
//! let sources = SourceRegistry::new(store.clone());
//! sources.create_source_type("nav").await?;
//! let source = sources.create_source_system("nav-1", "nav", "nav-user").await?;
//!
//! let incidents = IncidentService::new(store);
//! let incident = incidents
//!     .create_incident(NewIncident::new("core switch down", 1, source.id).with_tag("host=core-1"))
//!     .await?;
//! let found = incidents.search(Some("core,switch")).await?;
//! assert_eq!(found[0].id, incident.id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod incidents;
pub mod lifecycle;
pub mod models;
pub mod notifications;
pub mod search;
pub mod sources;
pub mod state;
pub mod telemetry;

pub use error::{AppError, Result};
