//! Tag relations of an incident

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::error::{AppError, Result};
use crate::models::{Incident, IncidentTagRelation, Tag, TagPair};

impl Incident {
    pub fn has_tag(&self, pair: &TagPair) -> bool {
        self.tag_relation(pair).is_some()
    }

    pub fn tag_relation(&self, pair: &TagPair) -> Option<&IncidentTagRelation> {
        self.tags.iter().find(|relation| relation.tag.matches(pair))
    }

    /// Relate an interned tag to this incident
    pub fn attach_tag(
        &mut self,
        tag: Tag,
        added_by: impl Into<String>,
        added_time: DateTime<Utc>,
    ) -> Result<IncidentTagRelation> {
        if self.has_tag(&tag.pair()) {
            return Err(AppError::DuplicateTag(format!(
                "{} is already attached to incident {}",
                tag, self.id
            )));
        }

        let relation = IncidentTagRelation {
            tag,
            added_by: added_by.into(),
            added_time,
        };
        self.tags.push(relation.clone());
        Ok(relation)
    }

    /// Remove the relation; the tag entity itself stays interned
    pub fn detach_tag(&mut self, pair: &TagPair) -> Result<IncidentTagRelation> {
        let position = self
            .tags
            .iter()
            .position(|relation| relation.tag.matches(pair))
            .ok_or_else(|| {
                AppError::NotFound(format!("tag {} on incident {}", pair, self.id))
            })?;
        Ok(self.tags.remove(position))
    }

    /// Tags in their `key=value` form
    pub fn tag_strings(&self) -> BTreeSet<String> {
        self.tags
            .iter()
            .map(|relation| relation.tag.to_string())
            .collect()
    }
}

/// Parse tag texts, rejecting repeats within the same list
pub fn parse_tags<I, S>(texts: I) -> Result<Vec<TagPair>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut pairs = Vec::new();
    for text in texts {
        let pair: TagPair = text.as_ref().parse()?;
        if !seen.insert(pair.clone()) {
            return Err(AppError::DuplicateTag(format!("{} given more than once", pair)));
        }
        pairs.push(pair);
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewIncident;
    use uuid::Uuid;

    fn open_incident() -> Incident {
        let new = NewIncident::new("incident", 3, Uuid::new_v4());
        Incident::open(&new, Vec::new(), "source-user")
    }

    #[test]
    fn test_attach_twice_fails() {
        let mut incident = open_incident();
        let pair = TagPair::new("a", "b");

        incident.attach_tag(Tag::new(&pair), "alice", Utc::now()).unwrap();
        let result = incident.attach_tag(Tag::new(&pair), "alice", Utc::now());

        assert!(matches!(result, Err(AppError::DuplicateTag(_))));
        assert_eq!(incident.tags.len(), 1);
    }

    #[test]
    fn test_detach_then_reattach() {
        let mut incident = open_incident();
        let pair = TagPair::new("a", "b");
        let tag = Tag::new(&pair);

        incident.attach_tag(tag.clone(), "alice", Utc::now()).unwrap();
        let removed = incident.detach_tag(&pair).unwrap();
        assert_eq!(removed.tag, tag);
        assert!(!incident.has_tag(&pair));

        incident.attach_tag(tag, "alice", Utc::now()).unwrap();
        assert_eq!(incident.tag_strings(), BTreeSet::from(["a=b".to_string()]));
    }

    #[test]
    fn test_detach_missing_fails() {
        let mut incident = open_incident();
        let result = incident.detach_tag(&TagPair::new("c", "d"));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_parse_tags() {
        let pairs = parse_tags(["a=b", "c=d"]).unwrap();
        assert_eq!(pairs, vec![TagPair::new("a", "b"), TagPair::new("c", "d")]);

        assert!(matches!(
            parse_tags(["a=b", "a=b"]),
            Err(AppError::DuplicateTag(_))
        ));
        assert!(matches!(parse_tags(["ab"]), Err(AppError::MalformedTag(_))));
        assert!(parse_tags(Vec::<String>::new()).unwrap().is_empty());
    }
}
