//! Acknowledgement tracker

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Acknowledgement, EventType, Incident};

impl Incident {
    /// Record an ACKNOWLEDGE event with the given expiration.
    ///
    /// Every call creates a new acknowledgement, also while one is active.
    pub fn acknowledge(
        &mut self,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
        expiration: Option<DateTime<Utc>>,
        actor: impl Into<String>,
    ) -> Result<Acknowledgement> {
        let event = self.append_event(EventType::Acknowledge, description, timestamp, actor)?;
        let record = self
            .acks
            .iter_mut()
            .find(|record| record.event_id == event.id)
            .ok_or_else(|| AppError::NotFound(format!("acknowledgement {}", event.id)))?;
        record.expiration = expiration;

        Ok(Acknowledgement { event, expiration })
    }

    /// Replace the expiration of an acknowledgement; its event is untouched
    pub fn update_ack_expiration(
        &mut self,
        ack_id: &Uuid,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<Acknowledgement> {
        let record = self
            .acks
            .iter_mut()
            .find(|record| record.event_id == *ack_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "acknowledgement {} of incident {}",
                    ack_id, self.id
                ))
            })?;
        record.expiration = expiration;

        self.acknowledgement(ack_id).ok_or_else(|| {
            AppError::NotFound(format!("event of acknowledgement {}", ack_id))
        })
    }

    pub fn acknowledgement(&self, ack_id: &Uuid) -> Option<Acknowledgement> {
        let record = self.acks.iter().find(|record| record.event_id == *ack_id)?;
        let event = self.event(ack_id)?;
        Some(Acknowledgement {
            event: event.clone(),
            expiration: record.expiration,
        })
    }

    /// All acknowledgements, ordered like the event log
    pub fn acknowledgements(&self) -> Vec<Acknowledgement> {
        self.ordered_events()
            .into_iter()
            .filter(|event| event.event_type == EventType::Acknowledge)
            .filter_map(|event| {
                let record = self.acks.iter().find(|record| record.event_id == event.id)?;
                Some(Acknowledgement {
                    expiration: record.expiration,
                    event,
                })
            })
            .collect()
    }

    /// The most recent acknowledgement still active at `as_of`
    pub fn active_acknowledgement(&self, as_of: DateTime<Utc>) -> Option<Acknowledgement> {
        self.acknowledgements()
            .into_iter()
            .rev()
            .find(|ack| ack.is_active(as_of))
    }

    pub fn is_acked_at(&self, as_of: DateTime<Utc>) -> bool {
        self.active_acknowledgement(as_of).is_some()
    }
}
