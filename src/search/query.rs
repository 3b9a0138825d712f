use serde::{Deserialize, Serialize};

use crate::models::Incident;

/// Separates search terms in a query string
pub const TERM_SEPARATOR: char = ',';

/// A parsed search query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub terms: Vec<String>,
}

impl SearchQuery {
    /// Split a raw query on commas. Terms are kept verbatim, so an empty
    /// query yields one empty term, which matches everything.
    pub fn parse(raw: &str) -> Self {
        Self {
            terms: raw.split(TERM_SEPARATOR).map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        self.terms.iter().all(|term| term_matches(term, incident))
    }
}

fn term_matches(term: &str, incident: &Incident) -> bool {
    incident.description.contains(term)
        || incident
            .events
            .iter()
            .any(|event| event.description.contains(term))
}
