use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// An immutable fact in an incident's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub incident_id: Uuid,

    /// Insertion index within the incident's log; tie-break for equal timestamps
    pub seq: u64,

    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub description: String,
    pub actor: String,
}

/// Event types, with the short codes used on the wire
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
pub enum EventType {
    #[strum(serialize = "STA")]
    #[serde(rename = "STA")]
    Start,

    #[strum(serialize = "CLO")]
    #[serde(rename = "CLO")]
    Close,

    #[strum(serialize = "ACK")]
    #[serde(rename = "ACK")]
    Acknowledge,

    #[strum(serialize = "OTH")]
    #[serde(rename = "OTH")]
    Other,
}

impl EventType {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            EventType::Start => "Incident start",
            EventType::Close => "Close",
            EventType::Acknowledge => "Acknowledge",
            EventType::Other => "Other",
        }
    }

    /// Whether this event type can move an incident between states
    pub fn is_stateful(&self) -> bool {
        !matches!(self, EventType::Other)
    }
}
