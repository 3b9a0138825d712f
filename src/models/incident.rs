use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::acknowledgement::AckRecord;
use super::event::Event;
use super::tag::IncidentTagRelation;

/// Most severe incident level
pub const MIN_LEVEL: u8 = 1;

/// Least severe incident level
pub const MAX_LEVEL: u8 = 5;

/// An incident and everything it exclusively owns.
///
/// The event log is the source of truth: `end_time` is written only by a
/// CLOSE event, and acknowledgement status is recomputed from `acks` on every
/// query rather than stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier
    pub id: Uuid,

    /// Human-readable description
    pub description: String,

    /// When the problem started
    pub start_time: DateTime<Utc>,

    /// When the incident was closed; `None` while open
    pub end_time: Option<DateTime<Utc>>,

    /// Severity level, 1 (critical) to 5 (informational)
    pub level: u8,

    /// Link to an external ticket
    pub ticket_url: Option<String>,

    /// Reporting source system
    pub source_id: Uuid,

    /// The reporter's own identifier for this incident
    pub source_incident_id: String,

    /// Tag relations, in attach order
    pub tags: Vec<IncidentTagRelation>,

    /// Event log, in insertion order
    pub events: Vec<Event>,

    /// Expiration records for ACKNOWLEDGE events
    pub acks: Vec<AckRecord>,
}

impl Incident {
    /// Check if the incident is still open
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Input for creating an incident
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewIncident {
    pub description: String,

    #[validate(range(min = 1, max = 5))]
    pub level: u8,

    pub start_time: DateTime<Utc>,

    /// Tag texts of the form `key=value`
    pub tags: Vec<String>,

    pub source_id: Uuid,

    #[validate(length(max = 255))]
    pub source_incident_id: String,

    #[validate(length(min = 1, max = 1024))]
    pub ticket_url: Option<String>,
}

impl NewIncident {
    pub fn new(description: impl Into<String>, level: u8, source_id: Uuid) -> Self {
        Self {
            description: description.into(),
            level,
            start_time: Utc::now(),
            tags: Vec::new(),
            source_id,
            source_incident_id: String::new(),
            ticket_url: None,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_source_incident_id(mut self, source_incident_id: impl Into<String>) -> Self {
        self.source_incident_id = source_incident_id.into();
        self
    }

    pub fn with_ticket_url(mut self, ticket_url: impl Into<String>) -> Self {
        self.ticket_url = Some(ticket_url.into());
        self
    }
}

/// Check a level value against the allowed range
pub fn validate_level(level: u8) -> crate::error::Result<()> {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(crate::error::AppError::Validation(format!(
            "level must be between {} and {}, got {}",
            MIN_LEVEL, MAX_LEVEL, level
        )))
    }
}
