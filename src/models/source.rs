use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A kind of reporting system, e.g. "nav" or "zabbix"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SourceSystemType {
    #[validate(length(min = 1, max = 32))]
    pub name: String,
}

impl SourceSystemType {
    /// Type names are case-insensitive and stored lowercase
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_lowercase(),
        }
    }
}

/// The external reporter of incidents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SourceSystem {
    pub id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// Name of the owning `SourceSystemType`
    pub type_name: String,

    /// User the source reports as; actor of START events
    #[validate(length(min = 1))]
    pub owner: String,
}

impl SourceSystem {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            type_name: type_name.into(),
            owner: owner.into(),
        }
    }
}
