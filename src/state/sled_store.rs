use crate::error::{AppError, Result};
use crate::models::{
    DestinationConfig, Incident, SourceSystem, SourceSystemType, Tag, TagPair, Timeslot,
};
use crate::state::{IncidentStore, RegistryStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Separates scope and name in name index keys
const NAME_KEY_SEPARATOR: u8 = 0;

/// Persistent store using the Sled embedded database.
///
/// Records are bincode encoded, except destinations whose free-form settings
/// are kept as JSON. Name uniqueness relies on compare-and-swap against the
/// `*_names` index trees.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    incidents_tree: sled::Tree,
    tags_tree: sled::Tree,
    source_types_tree: sled::Tree,
    sources_tree: sled::Tree,
    source_names_tree: sled::Tree,
    timeslots_tree: sled::Tree,
    timeslot_names_tree: sled::Tree,
    destinations_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref();
        let db = sled::open(&path).map_err(|e| {
            AppError::Storage(format!("Failed to open Sled database: {}", e))
        })?;

        let open = |name: &str| {
            db.open_tree(name).map_err(|e| {
                AppError::Storage(format!("Failed to open {} tree: {}", name, e))
            })
        };

        let store = Self {
            incidents_tree: open("incidents")?,
            tags_tree: open("tags")?,
            source_types_tree: open("source_types")?,
            sources_tree: open("sources")?,
            source_names_tree: open("source_names")?,
            timeslots_tree: open("timeslots")?,
            timeslot_names_tree: open("timeslot_names")?,
            destinations_tree: open("destinations")?,
            db: Arc::new(db),
        };

        tracing::info!("Initialized Sled store at {:?}", path_str);
        Ok(store)
    }

    fn encode<T: Serialize>(what: &str, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize {}: {}", what, e))
        })
    }

    fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize {}: {}", what, e))
        })
    }

    fn encode_destination(destination: &DestinationConfig) -> Result<Vec<u8>> {
        serde_json::to_vec(destination).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize destination: {}", e))
        })
    }

    fn decode_destination(bytes: &[u8]) -> Result<DestinationConfig> {
        serde_json::from_slice(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize destination: {}", e))
        })
    }

    fn id_key(id: &Uuid) -> Vec<u8> {
        id.as_bytes().to_vec()
    }

    fn tag_key(pair: &TagPair) -> Vec<u8> {
        pair.to_string().into_bytes()
    }

    fn name_key(scope: &str, name: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(scope.len() + name.len() + 1);
        key.extend_from_slice(scope.as_bytes());
        key.push(NAME_KEY_SEPARATOR);
        key.extend_from_slice(name.as_bytes());
        key
    }

    fn read(tree: &sled::Tree, what: &str, key: &[u8]) -> Result<Option<sled::IVec>> {
        tree.get(key)
            .map_err(|e| AppError::Storage(format!("Failed to get {}: {}", what, e)))
    }

    fn write(tree: &sled::Tree, what: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        tree.insert(key, value)
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", what, e)))?;
        Ok(())
    }

    fn scan<T>(
        tree: &sled::Tree,
        what: &str,
        decode: impl Fn(&[u8]) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for result in tree.iter() {
            let (_, value) = result.map_err(|e| {
                AppError::Storage(format!("Failed to iterate {}: {}", what, e))
            })?;
            values.push(decode(value.as_ref())?);
        }
        Ok(values)
    }

    /// Claim `key` for `id`; succeeds when free or already held by `id`
    fn reserve_name(tree: &sled::Tree, key: &[u8], id: &Uuid, name: &str) -> Result<()> {
        let outcome = tree
            .compare_and_swap(key, None::<&[u8]>, Some(Self::id_key(id)))
            .map_err(|e| AppError::Storage(format!("Failed to reserve name: {}", e)))?;

        match outcome {
            Ok(()) => Ok(()),
            Err(conflict) if conflict.current.as_deref() == Some(id.as_bytes().as_slice()) => {
                Ok(())
            }
            Err(_) => Err(AppError::DuplicateName(format!("{:?} already exists", name))),
        }
    }

    /// Drop the reservation of `key` if `id` still holds it
    fn release_name(tree: &sled::Tree, key: &[u8], id: &Uuid) -> Result<()> {
        tree.compare_and_swap(key, Some(id.as_bytes().as_slice()), None::<&[u8]>)
            .map_err(|e| AppError::Storage(format!("Failed to release name: {}", e)))?
            .ok();
        Ok(())
    }

    fn rename(tree: &sled::Tree, old: &[u8], new: &[u8], id: &Uuid, name: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        Self::reserve_name(tree, new, id, name)?;
        Self::release_name(tree, old, id)
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Storage(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }

    fn flush_incidents(&self) -> Result<()> {
        self.incidents_tree.flush().map_err(|e| {
            AppError::Storage(format!("Failed to flush incidents tree: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for SledStore {
    async fn save_incident(&self, incident: &Incident) -> Result<()> {
        let value = Self::encode("incident", incident)?;
        Self::write(&self.incidents_tree, "incident", Self::id_key(&incident.id), value)?;
        self.flush_incidents()?;

        tracing::debug!(incident_id = %incident.id, "Incident saved to Sled");
        Ok(())
    }

    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        Self::read(&self.incidents_tree, "incident", &Self::id_key(id))?
            .map(|bytes| Self::decode("incident", &bytes))
            .transpose()
    }

    async fn update_incident(&self, incident: &Incident) -> Result<()> {
        let key = Self::id_key(&incident.id);

        if !self.incidents_tree.contains_key(&key).map_err(|e| {
            AppError::Storage(format!("Failed to check incident existence: {}", e))
        })? {
            return Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident.id
            )));
        }

        let value = Self::encode("incident", incident)?;
        Self::write(&self.incidents_tree, "incident", key, value)?;
        self.flush_incidents()?;

        tracing::debug!(incident_id = %incident.id, "Incident updated in Sled");
        Ok(())
    }

    async fn delete_incident(&self, id: &Uuid) -> Result<()> {
        let removed = self.incidents_tree.remove(Self::id_key(id)).map_err(|e| {
            AppError::Storage(format!("Failed to delete incident: {}", e))
        })?;
        if removed.is_none() {
            return Err(AppError::NotFound(format!("Incident {} not found", id)));
        }
        self.flush_incidents()?;

        tracing::debug!(incident_id = %id, "Incident deleted from Sled");
        Ok(())
    }

    async fn list_incidents(&self) -> Result<Vec<Incident>> {
        Self::scan(&self.incidents_tree, "incidents", |bytes| {
            Self::decode("incident", bytes)
        })
    }

    async fn intern_tag(&self, pair: &TagPair) -> Result<Tag> {
        let key = Self::tag_key(pair);
        let candidate = Tag::new(pair);
        let value = Self::encode("tag", &candidate)?;

        let outcome = self
            .tags_tree
            .compare_and_swap(&key, None::<&[u8]>, Some(value))
            .map_err(|e| AppError::Storage(format!("Failed to intern tag: {}", e)))?;

        match outcome {
            Ok(()) => {
                tracing::debug!(tag = %pair, "Tag interned in Sled");
                Ok(candidate)
            }
            Err(conflict) => match conflict.current {
                Some(existing) => Self::decode("tag", &existing),
                None => Err(AppError::Storage(format!(
                    "Tag {} vanished while interning",
                    pair
                ))),
            },
        }
    }

    async fn get_tag(&self, pair: &TagPair) -> Result<Option<Tag>> {
        Self::read(&self.tags_tree, "tag", &Self::tag_key(pair))?
            .map(|bytes| Self::decode("tag", &bytes))
            .transpose()
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        Self::scan(&self.tags_tree, "tags", |bytes| Self::decode("tag", bytes))
    }
}

#[async_trait]
impl RegistryStore for SledStore {
    async fn insert_source_type(&self, source_type: &SourceSystemType) -> Result<()> {
        let value = Self::encode("source type", source_type)?;
        let outcome = self
            .source_types_tree
            .compare_and_swap(source_type.name.as_bytes(), None::<&[u8]>, Some(value))
            .map_err(|e| AppError::Storage(format!("Failed to insert source type: {}", e)))?;

        outcome.map_err(|_| {
            AppError::DuplicateName(format!(
                "source type {:?} already exists",
                source_type.name
            ))
        })
    }

    async fn get_source_type(&self, name: &str) -> Result<Option<SourceSystemType>> {
        Self::read(&self.source_types_tree, "source type", name.as_bytes())?
            .map(|bytes| Self::decode("source type", &bytes))
            .transpose()
    }

    async fn list_source_types(&self) -> Result<Vec<SourceSystemType>> {
        Self::scan(&self.source_types_tree, "source types", |bytes| {
            Self::decode("source type", bytes)
        })
    }

    async fn insert_source(&self, source: &SourceSystem) -> Result<()> {
        let name_key = Self::name_key(&source.type_name, &source.name);
        Self::reserve_name(&self.source_names_tree, &name_key, &source.id, &source.name)?;

        let value = Self::encode("source system", source)?;
        Self::write(&self.sources_tree, "source system", Self::id_key(&source.id), value)
    }

    async fn get_source(&self, id: &Uuid) -> Result<Option<SourceSystem>> {
        Self::read(&self.sources_tree, "source system", &Self::id_key(id))?
            .map(|bytes| Self::decode("source system", &bytes))
            .transpose()
    }

    async fn update_source(&self, source: &SourceSystem) -> Result<()> {
        let existing = self
            .get_source(&source.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Source system {} not found", source.id)))?;

        Self::rename(
            &self.source_names_tree,
            &Self::name_key(&existing.type_name, &existing.name),
            &Self::name_key(&source.type_name, &source.name),
            &source.id,
            &source.name,
        )?;

        let value = Self::encode("source system", source)?;
        Self::write(&self.sources_tree, "source system", Self::id_key(&source.id), value)
    }

    async fn list_sources(&self) -> Result<Vec<SourceSystem>> {
        Self::scan(&self.sources_tree, "source systems", |bytes| {
            Self::decode("source system", bytes)
        })
    }

    async fn insert_timeslot(&self, timeslot: &Timeslot) -> Result<()> {
        let name_key = Self::name_key(&timeslot.user, &timeslot.name);
        Self::reserve_name(&self.timeslot_names_tree, &name_key, &timeslot.id, &timeslot.name)?;

        let value = Self::encode("timeslot", timeslot)?;
        Self::write(&self.timeslots_tree, "timeslot", Self::id_key(&timeslot.id), value)
    }

    async fn get_timeslot(&self, id: &Uuid) -> Result<Option<Timeslot>> {
        Self::read(&self.timeslots_tree, "timeslot", &Self::id_key(id))?
            .map(|bytes| Self::decode("timeslot", &bytes))
            .transpose()
    }

    async fn update_timeslot(&self, timeslot: &Timeslot) -> Result<()> {
        let existing = self
            .get_timeslot(&timeslot.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Timeslot {} not found", timeslot.id)))?;

        Self::rename(
            &self.timeslot_names_tree,
            &Self::name_key(&existing.user, &existing.name),
            &Self::name_key(&timeslot.user, &timeslot.name),
            &timeslot.id,
            &timeslot.name,
        )?;

        let value = Self::encode("timeslot", timeslot)?;
        Self::write(&self.timeslots_tree, "timeslot", Self::id_key(&timeslot.id), value)
    }

    async fn delete_timeslot(&self, id: &Uuid) -> Result<()> {
        let removed = self.timeslots_tree.remove(Self::id_key(id)).map_err(|e| {
            AppError::Storage(format!("Failed to delete timeslot: {}", e))
        })?;
        let timeslot: Timeslot = match removed {
            Some(bytes) => Self::decode("timeslot", &bytes)?,
            None => return Err(AppError::NotFound(format!("Timeslot {} not found", id))),
        };

        Self::release_name(
            &self.timeslot_names_tree,
            &Self::name_key(&timeslot.user, &timeslot.name),
            id,
        )
    }

    async fn list_timeslots(&self, user: &str) -> Result<Vec<Timeslot>> {
        let timeslots = Self::scan(&self.timeslots_tree, "timeslots", |bytes| {
            Self::decode::<Timeslot>("timeslot", bytes)
        })?;
        Ok(timeslots.into_iter().filter(|t| t.user == user).collect())
    }

    async fn insert_destination(&self, destination: &DestinationConfig) -> Result<()> {
        let value = Self::encode_destination(destination)?;
        Self::write(
            &self.destinations_tree,
            "destination",
            Self::id_key(&destination.id),
            value,
        )
    }

    async fn get_destination(&self, id: &Uuid) -> Result<Option<DestinationConfig>> {
        Self::read(&self.destinations_tree, "destination", &Self::id_key(id))?
            .map(|bytes| Self::decode_destination(&bytes))
            .transpose()
    }

    async fn update_destination(&self, destination: &DestinationConfig) -> Result<()> {
        let key = Self::id_key(&destination.id);
        if Self::read(&self.destinations_tree, "destination", &key)?.is_none() {
            return Err(AppError::NotFound(format!(
                "Destination {} not found",
                destination.id
            )));
        }

        let value = Self::encode_destination(destination)?;
        Self::write(&self.destinations_tree, "destination", key, value)
    }

    async fn delete_destination(&self, id: &Uuid) -> Result<()> {
        let removed = self.destinations_tree.remove(Self::id_key(id)).map_err(|e| {
            AppError::Storage(format!("Failed to delete destination: {}", e))
        })?;
        removed
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Destination {} not found", id)))
    }

    async fn list_destinations(&self, user: &str) -> Result<Vec<DestinationConfig>> {
        let destinations = Self::scan(
            &self.destinations_tree,
            "destinations",
            Self::decode_destination,
        )?;
        Ok(destinations.into_iter().filter(|d| d.user == user).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_timeslot, EventType, NewIncident};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SledStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn create_test_incident() -> Incident {
        let new = NewIncident::new("Test incident", 2, Uuid::new_v4());
        Incident::open(&new, Vec::new(), "source-user")
    }

    #[tokio::test]
    async fn test_save_and_get_incident() {
        let (store, _temp_dir) = create_test_store();
        let mut incident = create_test_incident();
        let at = incident.start_time + Duration::minutes(1);
        incident
            .acknowledge("on it", at, Some(at + Duration::hours(1)), "alice")
            .unwrap();

        store.save_incident(&incident).await.unwrap();

        let retrieved = store.get_incident(&incident.id).await.unwrap();
        assert_eq!(retrieved, Some(incident));
    }

    #[tokio::test]
    async fn test_update_and_delete_incident() {
        let (store, _temp_dir) = create_test_store();
        let mut incident = create_test_incident();
        store.save_incident(&incident).await.unwrap();

        incident
            .append_event(EventType::Close, "fixed", Utc::now(), "alice")
            .unwrap();
        store.update_incident(&incident).await.unwrap();

        let retrieved = store.get_incident(&incident.id).await.unwrap().unwrap();
        assert!(!retrieved.is_open());

        store.delete_incident(&incident.id).await.unwrap();
        assert!(store.get_incident(&incident.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_incident(&incident.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_path_buf();
        let incident = create_test_incident();

        {
            let store = SledStore::new(&path).unwrap();
            store.save_incident(&incident).await.unwrap();
            store.intern_tag(&TagPair::new("a", "b")).await.unwrap();
            store.flush().await.unwrap();
        }

        {
            let store = SledStore::new(&path).unwrap();
            let incidents = store.list_incidents().await.unwrap();
            assert_eq!(incidents.len(), 1);
            assert_eq!(incidents[0].description, "Test incident");
            assert!(store.get_tag(&TagPair::new("a", "b")).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_intern_tag_reuses_entity() {
        let (store, _temp_dir) = create_test_store();
        let pair = TagPair::new("host", "core-1");

        let first = store.intern_tag(&pair).await.unwrap();
        let second = store.intern_tag(&pair).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_timeslot_names_unique_per_user() {
        let (store, _temp_dir) = create_test_store();
        let timeslot = default_timeslot("alice", "All the time");
        store.insert_timeslot(&timeslot).await.unwrap();

        let duplicate = store
            .insert_timeslot(&default_timeslot("alice", "All the time"))
            .await;
        assert!(matches!(duplicate, Err(AppError::DuplicateName(_))));

        store
            .insert_timeslot(&default_timeslot("bob", "All the time"))
            .await
            .unwrap();

        store.delete_timeslot(&timeslot.id).await.unwrap();
        store
            .insert_timeslot(&default_timeslot("alice", "All the time"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_destination_settings_round_trip() {
        let (store, _temp_dir) = create_test_store();
        let destination = DestinationConfig {
            id: Uuid::new_v4(),
            user: "alice".to_string(),
            media: "email".to_string(),
            label: None,
            settings: json!({"email_address": "alice@example.com", "synced": false}),
        };

        store.insert_destination(&destination).await.unwrap();
        let listed = store.list_destinations("alice").await.unwrap();
        assert_eq!(listed, vec![destination]);
        assert!(store.list_destinations("bob").await.unwrap().is_empty());
    }
}
