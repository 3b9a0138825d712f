use crate::error::{AppError, Result};
use crate::models::{
    DestinationConfig, Incident, SourceSystem, SourceSystemType, Tag, TagPair, Timeslot,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Storage of incident aggregates and the shared tag entities
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Save a new incident
    async fn save_incident(&self, incident: &Incident) -> Result<()>;

    /// Get an incident by ID
    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>>;

    /// Replace a stored incident as a whole
    async fn update_incident(&self, incident: &Incident) -> Result<()>;

    /// Delete an incident together with its events, tag relations and acknowledgements
    async fn delete_incident(&self, id: &Uuid) -> Result<()>;

    /// All stored incidents, in no particular order
    async fn list_incidents(&self) -> Result<Vec<Incident>>;

    /// Return the tag entity for `pair`, creating it on first use
    async fn intern_tag(&self, pair: &TagPair) -> Result<Tag>;

    async fn get_tag(&self, pair: &TagPair) -> Result<Option<Tag>>;

    async fn list_tags(&self) -> Result<Vec<Tag>>;
}

/// Storage of source systems and per-user notification settings.
///
/// Name uniqueness is enforced here: inserts and renames fail with
/// `DuplicateName` when the name is taken within its scope.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn insert_source_type(&self, source_type: &SourceSystemType) -> Result<()>;

    async fn get_source_type(&self, name: &str) -> Result<Option<SourceSystemType>>;

    async fn list_source_types(&self) -> Result<Vec<SourceSystemType>>;

    /// Names are unique per source type
    async fn insert_source(&self, source: &SourceSystem) -> Result<()>;

    async fn get_source(&self, id: &Uuid) -> Result<Option<SourceSystem>>;

    async fn update_source(&self, source: &SourceSystem) -> Result<()>;

    async fn list_sources(&self) -> Result<Vec<SourceSystem>>;

    /// Names are unique per user
    async fn insert_timeslot(&self, timeslot: &Timeslot) -> Result<()>;

    async fn get_timeslot(&self, id: &Uuid) -> Result<Option<Timeslot>>;

    async fn update_timeslot(&self, timeslot: &Timeslot) -> Result<()>;

    async fn delete_timeslot(&self, id: &Uuid) -> Result<()>;

    async fn list_timeslots(&self, user: &str) -> Result<Vec<Timeslot>>;

    async fn insert_destination(&self, destination: &DestinationConfig) -> Result<()>;

    async fn get_destination(&self, id: &Uuid) -> Result<Option<DestinationConfig>>;

    async fn update_destination(&self, destination: &DestinationConfig) -> Result<()>;

    async fn delete_destination(&self, id: &Uuid) -> Result<()>;

    async fn list_destinations(&self, user: &str) -> Result<Vec<DestinationConfig>>;
}

/// Everything the services need from a backend
pub trait Store: IncidentStore + RegistryStore {}

impl<T: IncidentStore + RegistryStore + ?Sized> Store for T {}

/// Key of a scoped name index: (scope, name)
type NameKey = (String, String);

/// In-memory store (for development and testing)
#[derive(Clone)]
pub struct InMemoryStore {
    incidents: Arc<DashMap<Uuid, Incident>>,
    tags: Arc<DashMap<TagPair, Tag>>,
    source_types: Arc<DashMap<String, SourceSystemType>>,
    sources: Arc<DashMap<Uuid, SourceSystem>>,
    source_names: Arc<DashMap<NameKey, Uuid>>,
    timeslots: Arc<DashMap<Uuid, Timeslot>>,
    timeslot_names: Arc<DashMap<NameKey, Uuid>>,
    destinations: Arc<DashMap<Uuid, DestinationConfig>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            incidents: Arc::new(DashMap::new()),
            tags: Arc::new(DashMap::new()),
            source_types: Arc::new(DashMap::new()),
            sources: Arc::new(DashMap::new()),
            source_names: Arc::new(DashMap::new()),
            timeslots: Arc::new(DashMap::new()),
            timeslot_names: Arc::new(DashMap::new()),
            destinations: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Claim `key` for `id`; succeeds when the key is free or already held by `id`
fn reserve_name(index: &DashMap<NameKey, Uuid>, key: NameKey, id: Uuid) -> Result<()> {
    match index.entry(key) {
        Entry::Occupied(entry) if *entry.get() != id => Err(AppError::DuplicateName(format!(
            "{:?} already exists in {:?}",
            entry.key().1,
            entry.key().0
        ))),
        Entry::Occupied(_) => Ok(()),
        Entry::Vacant(entry) => {
            entry.insert(id);
            Ok(())
        }
    }
}

/// Move a reservation from `old` to `new`, leaving `old` untouched on failure
fn rename(index: &DashMap<NameKey, Uuid>, old: NameKey, new: NameKey, id: Uuid) -> Result<()> {
    if old == new {
        return Ok(());
    }
    reserve_name(index, new, id)?;
    index.remove_if(&old, |_, holder| *holder == id);
    Ok(())
}

fn source_key(source: &SourceSystem) -> NameKey {
    (source.type_name.clone(), source.name.clone())
}

fn timeslot_key(timeslot: &Timeslot) -> NameKey {
    (timeslot.user.clone(), timeslot.name.clone())
}

#[async_trait]
impl IncidentStore for InMemoryStore {
    async fn save_incident(&self, incident: &Incident) -> Result<()> {
        self.incidents.insert(incident.id, incident.clone());
        tracing::debug!(incident_id = %incident.id, "Incident saved");
        Ok(())
    }

    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        Ok(self.incidents.get(id).map(|entry| entry.clone()))
    }

    async fn update_incident(&self, incident: &Incident) -> Result<()> {
        match self.incidents.get_mut(&incident.id) {
            Some(mut entry) => {
                *entry = incident.clone();
                tracing::debug!(incident_id = %incident.id, "Incident updated");
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident.id
            ))),
        }
    }

    async fn delete_incident(&self, id: &Uuid) -> Result<()> {
        if self.incidents.remove(id).is_some() {
            tracing::debug!(incident_id = %id, "Incident deleted");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Incident {} not found", id)))
        }
    }

    async fn list_incidents(&self) -> Result<Vec<Incident>> {
        Ok(self
            .incidents
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn intern_tag(&self, pair: &TagPair) -> Result<Tag> {
        let tag = self
            .tags
            .entry(pair.clone())
            .or_insert_with(|| Tag::new(pair))
            .clone();
        Ok(tag)
    }

    async fn get_tag(&self, pair: &TagPair) -> Result<Option<Tag>> {
        Ok(self.tags.get(pair).map(|entry| entry.clone()))
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.tags.iter().map(|entry| entry.value().clone()).collect())
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn insert_source_type(&self, source_type: &SourceSystemType) -> Result<()> {
        match self.source_types.entry(source_type.name.clone()) {
            Entry::Occupied(_) => Err(AppError::DuplicateName(format!(
                "source type {:?} already exists",
                source_type.name
            ))),
            Entry::Vacant(entry) => {
                entry.insert(source_type.clone());
                Ok(())
            }
        }
    }

    async fn get_source_type(&self, name: &str) -> Result<Option<SourceSystemType>> {
        Ok(self.source_types.get(name).map(|entry| entry.clone()))
    }

    async fn list_source_types(&self) -> Result<Vec<SourceSystemType>> {
        Ok(self
            .source_types
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_source(&self, source: &SourceSystem) -> Result<()> {
        reserve_name(&self.source_names, source_key(source), source.id)?;
        self.sources.insert(source.id, source.clone());
        Ok(())
    }

    async fn get_source(&self, id: &Uuid) -> Result<Option<SourceSystem>> {
        Ok(self.sources.get(id).map(|entry| entry.clone()))
    }

    async fn update_source(&self, source: &SourceSystem) -> Result<()> {
        let existing = self
            .sources
            .get(&source.id)
            .map(|entry| entry.clone())
            .ok_or_else(|| AppError::NotFound(format!("Source system {} not found", source.id)))?;

        rename(
            &self.source_names,
            source_key(&existing),
            source_key(source),
            source.id,
        )?;
        self.sources.insert(source.id, source.clone());
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<SourceSystem>> {
        Ok(self.sources.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn insert_timeslot(&self, timeslot: &Timeslot) -> Result<()> {
        reserve_name(&self.timeslot_names, timeslot_key(timeslot), timeslot.id)?;
        self.timeslots.insert(timeslot.id, timeslot.clone());
        Ok(())
    }

    async fn get_timeslot(&self, id: &Uuid) -> Result<Option<Timeslot>> {
        Ok(self.timeslots.get(id).map(|entry| entry.clone()))
    }

    async fn update_timeslot(&self, timeslot: &Timeslot) -> Result<()> {
        let existing = self
            .timeslots
            .get(&timeslot.id)
            .map(|entry| entry.clone())
            .ok_or_else(|| AppError::NotFound(format!("Timeslot {} not found", timeslot.id)))?;

        rename(
            &self.timeslot_names,
            timeslot_key(&existing),
            timeslot_key(timeslot),
            timeslot.id,
        )?;
        self.timeslots.insert(timeslot.id, timeslot.clone());
        Ok(())
    }

    async fn delete_timeslot(&self, id: &Uuid) -> Result<()> {
        let (_, timeslot) = self
            .timeslots
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("Timeslot {} not found", id)))?;
        self.timeslot_names
            .remove_if(&timeslot_key(&timeslot), |_, holder| holder == id);
        Ok(())
    }

    async fn list_timeslots(&self, user: &str) -> Result<Vec<Timeslot>> {
        Ok(self
            .timeslots
            .iter()
            .filter(|entry| entry.user == user)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_destination(&self, destination: &DestinationConfig) -> Result<()> {
        self.destinations.insert(destination.id, destination.clone());
        Ok(())
    }

    async fn get_destination(&self, id: &Uuid) -> Result<Option<DestinationConfig>> {
        Ok(self.destinations.get(id).map(|entry| entry.clone()))
    }

    async fn update_destination(&self, destination: &DestinationConfig) -> Result<()> {
        match self.destinations.get_mut(&destination.id) {
            Some(mut entry) => {
                *entry = destination.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Destination {} not found",
                destination.id
            ))),
        }
    }

    async fn delete_destination(&self, id: &Uuid) -> Result<()> {
        self.destinations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Destination {} not found", id)))
    }

    async fn list_destinations(&self, user: &str) -> Result<Vec<DestinationConfig>> {
        Ok(self
            .destinations
            .iter()
            .filter(|entry| entry.user == user)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
