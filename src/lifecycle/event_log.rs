//! Append-only event log of an incident

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AckRecord, Event, EventType, Incident};

impl Incident {
    /// Append an event after checking it against the state machine.
    ///
    /// CLOSE stamps `end_time`; ACKNOWLEDGE opens an acknowledgement record
    /// without expiration.
    pub fn append_event(
        &mut self,
        event_type: EventType,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
    ) -> Result<Event> {
        self.check_transition(event_type)?;

        if event_type == EventType::Close && timestamp < self.start_time {
            return Err(AppError::Validation(format!(
                "close time {} precedes start time {} of incident {}",
                timestamp, self.start_time, self.id
            )));
        }

        let event = Event {
            id: Uuid::new_v4(),
            incident_id: self.id,
            seq: self.events.len() as u64,
            timestamp,
            event_type,
            description: description.into(),
            actor: actor.into(),
        };
        self.events.push(event.clone());

        match event_type {
            EventType::Close => self.end_time = Some(timestamp),
            EventType::Acknowledge => self.acks.push(AckRecord {
                event_id: event.id,
                expiration: None,
            }),
            EventType::Start | EventType::Other => {}
        }

        Ok(event)
    }

    /// Events ordered by timestamp, insertion order breaking ties
    pub fn ordered_events(&self) -> Vec<Event> {
        let mut events = self.events.clone();
        sort_events(&mut events);
        events
    }

    pub fn event(&self, event_id: &Uuid) -> Option<&Event> {
        self.events.iter().find(|event| event.id == *event_id)
    }
}

/// Sort by timestamp, then per-incident sequence, then incident id
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.seq.cmp(&b.seq))
            .then(a.incident_id.cmp(&b.incident_id))
    });
}
