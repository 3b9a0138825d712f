use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Separator between tag key and value
pub const TAG_DELIMITER: char = '=';

static TAG_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid tag key regex"));

/// A parsed `key=value` pair, not yet interned
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagPair {
    pub key: String,
    pub value: String,
}

impl TagPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl FromStr for TagPair {
    type Err = AppError;

    /// Splits on the first `=`; the value may itself contain `=`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (key, value) = text.split_once(TAG_DELIMITER).ok_or_else(|| {
            AppError::MalformedTag(format!("missing '{}' in {:?}", TAG_DELIMITER, text))
        })?;

        if !TAG_KEY.is_match(key) {
            return Err(AppError::MalformedTag(format!(
                "key {:?} must be lowercase letters, digits or underscores",
                key
            )));
        }
        if value.is_empty() {
            return Err(AppError::MalformedTag(format!("empty value in {:?}", text)));
        }

        Ok(Self::new(key, value))
    }
}

impl fmt::Display for TagPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, TAG_DELIMITER, self.value)
    }
}

/// A globally interned tag entity, shared between incidents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(pair: &TagPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: pair.key.clone(),
            value: pair.value.clone(),
        }
    }

    pub fn pair(&self) -> TagPair {
        TagPair::new(self.key.clone(), self.value.clone())
    }

    pub fn matches(&self, pair: &TagPair) -> bool {
        self.key == pair.key && self.value == pair.value
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, TAG_DELIMITER, self.value)
    }
}

/// Links a tag to one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentTagRelation {
    pub tag: Tag,
    pub added_by: String,
    pub added_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let pair: TagPair = "a=b".parse().unwrap();
        assert_eq!(pair, TagPair::new("a", "b"));
        assert_eq!(pair.to_string(), "a=b");
    }

    #[test]
    fn test_value_may_contain_delimiter() {
        let pair: TagPair = "url=https://example.com/?q=1".parse().unwrap();
        assert_eq!(pair.key, "url");
        assert_eq!(pair.value, "https://example.com/?q=1");
    }

    #[test]
    fn test_malformed_tags() {
        for text in ["ab", "", "=b", "a=", "Host=x", "bad key=x"] {
            match text.parse::<TagPair>() {
                Err(AppError::MalformedTag(_)) => {}
                other => panic!("expected MalformedTag for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_tag_display_matches_pair() {
        let pair = TagPair::new("problem_type", "stresstest");
        let tag = Tag::new(&pair);
        assert_eq!(tag.to_string(), pair.to_string());
        assert!(tag.matches(&pair));
        assert_eq!(tag.pair(), pair);
    }
}
