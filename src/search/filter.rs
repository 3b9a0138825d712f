use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::query::SearchQuery;
use crate::models::{Incident, TagPair};

/// Criteria for listing incidents. Unset criteria match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentFilter {
    /// Comma separated search terms
    pub search: Option<String>,

    /// Only open (`true`) or only closed (`false`) incidents
    pub open: Option<bool>,

    /// Only acknowledged (`true`) or unacknowledged (`false`) incidents,
    /// judged at the listing instant
    pub acked: Option<bool>,

    /// Every tag must be attached
    pub tags: Vec<TagPair>,

    /// Reported by any of these sources
    pub sources: Vec<Uuid>,

    /// Levels up to and including this value (1 is most severe)
    pub max_level: Option<u8>,
}

impl IncidentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    pub fn with_open(mut self, open: bool) -> Self {
        self.open = Some(open);
        self
    }

    pub fn with_acked(mut self, acked: bool) -> Self {
        self.acked = Some(acked);
        self
    }

    pub fn with_tag(mut self, tag: TagPair) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_source(mut self, source_id: Uuid) -> Self {
        self.sources.push(source_id);
        self
    }

    pub fn with_max_level(mut self, level: u8) -> Self {
        self.max_level = Some(level);
        self
    }

    pub fn matches(&self, incident: &Incident, as_of: DateTime<Utc>) -> bool {
        if let Some(open) = self.open {
            if incident.is_open() != open {
                return false;
            }
        }
        if let Some(acked) = self.acked {
            if incident.is_acked_at(as_of) != acked {
                return false;
            }
        }
        if let Some(max_level) = self.max_level {
            if incident.level > max_level {
                return false;
            }
        }
        if !self.sources.is_empty() && !self.sources.contains(&incident.source_id) {
            return false;
        }
        if !self.tags.iter().all(|tag| incident.has_tag(tag)) {
            return false;
        }
        match &self.search {
            Some(raw) => SearchQuery::parse(raw).matches(incident),
            None => true,
        }
    }
}
