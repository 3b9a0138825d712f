use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A weekly window: a set of ISO weekdays (1 = Monday) and a time range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecurrence {
    pub days: BTreeSet<u8>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRecurrence {
    pub fn new(days: impl IntoIterator<Item = u8>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            days: days.into_iter().collect(),
            start,
            end,
        }
    }

    /// Every hour of the given days
    pub fn all_day(days: impl IntoIterator<Item = u8>) -> Self {
        Self::new(days, NaiveTime::default(), end_of_day())
    }

    pub fn validate(&self) -> Result<()> {
        if self.days.is_empty() {
            return Err(AppError::Validation(
                "time recurrence needs at least one day".to_string(),
            ));
        }
        if let Some(day) = self.days.iter().find(|day| !(1..=7).contains(*day)) {
            return Err(AppError::Validation(format!(
                "day {} is not an ISO weekday (1-7)",
                day
            )));
        }
        if self.start >= self.end {
            return Err(AppError::Validation(format!(
                "start {} must be before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Inclusive on both ends of the time range
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let weekday = at.weekday().number_from_monday() as u8;
        let time = at.time();
        self.days.contains(&weekday) && self.start <= time && time <= self.end
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).expect("23:59:59.999999 is a valid time")
}

/// Named set of recurrences during which a user wants notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeslot {
    pub id: Uuid,
    pub user: String,
    pub name: String,
    pub recurrences: Vec<TimeRecurrence>,
}

impl Timeslot {
    pub fn new(
        user: impl Into<String>,
        name: impl Into<String>,
        recurrences: Vec<TimeRecurrence>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: user.into(),
            name: name.into(),
            recurrences,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("timeslot name must not be empty".to_string()));
        }
        if self.recurrences.is_empty() {
            return Err(AppError::Validation(format!(
                "timeslot {:?} needs at least one recurrence",
                self.name
            )));
        }
        self.recurrences.iter().try_for_each(TimeRecurrence::validate)
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.recurrences.iter().any(|recurrence| recurrence.contains(at))
    }
}

/// The timeslot every new user starts with: always active
pub fn default_timeslot(user: impl Into<String>, name: impl Into<String>) -> Timeslot {
    Timeslot::new(user, name, vec![TimeRecurrence::all_day(1..=7)])
}

/// A media-specific address a user can be notified at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub id: Uuid,
    pub user: String,

    /// Slug of the media plugin, e.g. "email"
    pub media: String,

    pub label: Option<String>,

    /// Settings as normalized by the media plugin
    pub settings: serde_json::Value,
}
