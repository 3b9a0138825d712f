use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Event;

/// Stored expiration of one ACKNOWLEDGE event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRecord {
    pub event_id: Uuid,
    pub expiration: Option<DateTime<Utc>>,
}

/// A time-bounded claim that an incident is being handled.
///
/// Shares its identifier with the ACKNOWLEDGE event it wraps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub event: Event,
    pub expiration: Option<DateTime<Utc>>,
}

impl Acknowledgement {
    pub fn id(&self) -> Uuid {
        self.event.id
    }

    pub fn incident_id(&self) -> Uuid {
        self.event.incident_id
    }

    /// True iff the acknowledgement never expires or expires after `as_of`
    pub fn is_active(&self, as_of: DateTime<Utc>) -> bool {
        match self.expiration {
            None => true,
            Some(expiration) => as_of < expiration,
        }
    }
}
