//! Incident state machine
//!
//! State is never stored. `Closed` follows from `end_time`, which only a
//! CLOSE event writes; `OpenAcked` follows from the acknowledgement records
//! and the instant the caller asks about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Event, EventType, Incident, IncidentTagRelation, NewIncident};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    OpenUnacked,
    OpenAcked,
    Closed,
}

impl IncidentStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, IncidentStatus::Closed)
    }

    pub fn is_acked(&self) -> bool {
        matches!(self, IncidentStatus::OpenAcked)
    }
}

impl Incident {
    /// Create an incident together with its START event.
    ///
    /// The START event carries the incident description, is stamped with
    /// `start_time`, and is attributed to `actor` (the source system owner).
    pub fn open(new: &NewIncident, tags: Vec<IncidentTagRelation>, actor: &str) -> Self {
        let id = Uuid::new_v4();
        let start = Event {
            id: Uuid::new_v4(),
            incident_id: id,
            seq: 0,
            timestamp: new.start_time,
            event_type: EventType::Start,
            description: new.description.clone(),
            actor: actor.to_string(),
        };

        Self {
            id,
            description: new.description.clone(),
            start_time: new.start_time,
            end_time: None,
            level: new.level,
            ticket_url: new.ticket_url.clone(),
            source_id: new.source_id,
            source_incident_id: new.source_incident_id.clone(),
            tags,
            events: vec![start],
            acks: Vec::new(),
        }
    }

    /// Derive the status as seen at `as_of`
    pub fn status_at(&self, as_of: DateTime<Utc>) -> IncidentStatus {
        if !self.is_open() {
            IncidentStatus::Closed
        } else if self.is_acked_at(as_of) {
            IncidentStatus::OpenAcked
        } else {
            IncidentStatus::OpenUnacked
        }
    }

    /// Check whether an event of `event_type` may be appended now
    pub fn check_transition(&self, event_type: EventType) -> Result<()> {
        match event_type {
            EventType::Other => Ok(()),
            EventType::Start => Err(AppError::InvalidTransition(format!(
                "incident {} already has a START event",
                self.id
            ))),
            EventType::Acknowledge | EventType::Close if !self.is_open() => {
                Err(AppError::InvalidTransition(format!(
                    "incident {} is closed; cannot append {}",
                    self.id, event_type
                )))
            }
            EventType::Acknowledge | EventType::Close => Ok(()),
        }
    }

    /// The incident's START event
    pub fn start_event(&self) -> Option<&Event> {
        self.events
            .iter()
            .find(|event| event.event_type == EventType::Start)
    }
}
