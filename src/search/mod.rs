//! Incident search
//!
//! A query is a comma separated list of terms. An incident matches when every
//! term is a case-sensitive substring of its description or of at least one
//! of its event descriptions. `IncidentFilter` layers status, tag, source and
//! level constraints on top of the text query.

mod filter;
mod query;

pub use filter::IncidentFilter;
pub use query::{SearchQuery, TERM_SEPARATOR};

use crate::models::Incident;

/// Keep the incidents matching `query`; `None` keeps everything.
///
/// Results are newest first by start time.
pub fn search(incidents: impl IntoIterator<Item = Incident>, query: Option<&str>) -> Vec<Incident> {
    let query = query.map(SearchQuery::parse);
    let mut matched: Vec<Incident> = incidents
        .into_iter()
        .filter(|incident| query.as_ref().map_or(true, |q| q.matches(incident)))
        .collect();
    sort_newest_first(&mut matched);
    matched
}

pub(crate) fn sort_newest_first(incidents: &mut [Incident]) {
    incidents.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(a.id.cmp(&b.id)));
}
