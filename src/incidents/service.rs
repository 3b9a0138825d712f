use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::locks::IncidentLocks;
use crate::error::{AppError, Result};
use crate::lifecycle::{parse_tags, sort_events, IncidentStatus};
use crate::models::{
    Acknowledgement, Event, EventType, Incident, IncidentTagRelation, NewIncident, TagPair,
};
use crate::search::{self, IncidentFilter};
use crate::state::{IncidentStore, RegistryStore, Store};

/// Longest accepted ticket URL
const MAX_TICKET_URL_LEN: usize = 1024;

/// Blank URLs become `None`; the length limit counts characters
fn normalize_ticket_url(url: Option<String>) -> Result<Option<String>> {
    let url = url.filter(|url| !url.trim().is_empty());
    if let Some(url) = &url {
        if url.chars().count() > MAX_TICKET_URL_LEN {
            return Err(AppError::Validation(format!(
                "ticket url is longer than {} characters",
                MAX_TICKET_URL_LEN
            )));
        }
    }
    Ok(url)
}

/// Result of acknowledging one incident of a bulk request
#[derive(Debug)]
pub struct BulkAckOutcome {
    pub incident_id: Uuid,
    pub result: Result<Acknowledgement>,
}

/// Incident lifecycle operations over a store.
///
/// Every mutation holds the incident's lock, applies the change to a copy of
/// the stored aggregate and writes the copy back, so a failed mutation leaves
/// storage untouched. Reads take no lock.
pub struct IncidentService {
    store: Arc<dyn Store>,
    locks: IncidentLocks,
}

impl IncidentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: IncidentLocks::new(),
        }
    }

    /// Get a reference to the store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Create an incident with its START event, attributed to the source owner
    pub async fn create_incident(&self, mut new: NewIncident) -> Result<Incident> {
        new.ticket_url = normalize_ticket_url(new.ticket_url.take())?;
        new.validate()?;

        let source = self
            .store
            .get_source(&new.source_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Source system {} not found", new.source_id))
            })?;

        let pairs = parse_tags(&new.tags)?;
        let added_time = Utc::now();
        let mut relations = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            relations.push(IncidentTagRelation {
                tag: self.store.intern_tag(pair).await?,
                added_by: source.owner.clone(),
                added_time,
            });
        }

        let incident = Incident::open(&new, relations, &source.owner);
        self.store.save_incident(&incident).await?;

        tracing::info!(
            incident_id = %incident.id,
            source = %source.name,
            level = incident.level,
            "Created new incident"
        );

        Ok(incident)
    }

    pub async fn get_incident(&self, id: &Uuid) -> Result<Incident> {
        self.store
            .get_incident(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))
    }

    /// Delete an incident with everything it owns; tags stay interned
    pub async fn delete_incident(&self, id: &Uuid) -> Result<()> {
        let guard = self.locks.acquire(*id).await;
        let deleted = self.store.delete_incident(id).await;
        drop(guard);
        self.locks.release(id);
        deleted?;

        tracing::info!(incident_id = %id, "Deleted incident");
        Ok(())
    }

    /// Apply `change` to the stored incident under its lock
    async fn mutate<T>(
        &self,
        id: &Uuid,
        change: impl FnOnce(&mut Incident) -> Result<T>,
    ) -> Result<(Incident, T)> {
        let guard = self.locks.acquire(*id).await;
        let outcome = self.apply(id, change).await;
        drop(guard);
        self.locks.release(id);
        outcome
    }

    async fn apply<T>(
        &self,
        id: &Uuid,
        change: impl FnOnce(&mut Incident) -> Result<T>,
    ) -> Result<(Incident, T)> {
        let mut incident = self.get_incident(id).await?;
        let output = change(&mut incident)?;
        self.store.update_incident(&incident).await?;

        Ok((incident, output))
    }

    pub async fn close_incident(
        &self,
        id: &Uuid,
        timestamp: DateTime<Utc>,
        actor: &str,
    ) -> Result<Incident> {
        let (incident, event) = self
            .mutate(id, |incident| {
                incident.append_event(EventType::Close, String::new(), timestamp, actor)
            })
            .await?;

        tracing::info!(incident_id = %id, event_id = %event.id, actor = %actor, "Closed incident");
        Ok(incident)
    }

    pub async fn acknowledge_incident(
        &self,
        id: &Uuid,
        description: &str,
        timestamp: DateTime<Utc>,
        expiration: Option<DateTime<Utc>>,
        actor: &str,
    ) -> Result<Acknowledgement> {
        let (_, ack) = self
            .mutate(id, |incident| {
                incident.acknowledge(description, timestamp, expiration, actor)
            })
            .await?;

        tracing::info!(
            incident_id = %id,
            ack_id = %ack.id(),
            expiration = ?expiration,
            "Acknowledged incident"
        );
        Ok(ack)
    }

    /// Change the expiration of an acknowledgement; its event is untouched
    pub async fn update_acknowledgement(
        &self,
        id: &Uuid,
        ack_id: &Uuid,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<Acknowledgement> {
        let (_, ack) = self
            .mutate(id, |incident| incident.update_ack_expiration(ack_id, expiration))
            .await?;

        tracing::debug!(
            incident_id = %id,
            ack_id = %ack_id,
            expiration = ?expiration,
            "Updated acknowledgement"
        );
        Ok(ack)
    }

    /// Set or clear the ticket URL; an empty URL clears it
    pub async fn update_ticket_url(&self, id: &Uuid, url: Option<String>) -> Result<Incident> {
        let url = normalize_ticket_url(url)?;

        let (incident, _) = self
            .mutate(id, |incident| {
                incident.ticket_url = url;
                Ok(())
            })
            .await?;

        tracing::debug!(
            incident_id = %id,
            ticket_url = ?incident.ticket_url,
            "Updated ticket url"
        );
        Ok(incident)
    }

    pub async fn update_level(&self, id: &Uuid, level: u8) -> Result<Incident> {
        crate::models::validate_level(level)?;

        let (incident, _) = self
            .mutate(id, |incident| {
                incident.level = level;
                Ok(())
            })
            .await?;

        tracing::debug!(incident_id = %id, level = level, "Updated level");
        Ok(incident)
    }

    /// Attach a `key=value` tag, interning the tag entity on first use
    pub async fn attach_tag(
        &self,
        id: &Uuid,
        tag_text: &str,
        added_by: &str,
    ) -> Result<IncidentTagRelation> {
        let pair: TagPair = tag_text.parse()?;
        // Unknown incidents must not leave a new tag entity behind
        self.get_incident(id).await?;
        let tag = self.store.intern_tag(&pair).await?;

        let (_, relation) = self
            .mutate(id, |incident| incident.attach_tag(tag, added_by, Utc::now()))
            .await?;

        tracing::debug!(incident_id = %id, tag = %pair, "Attached tag");
        Ok(relation)
    }

    pub async fn detach_tag(&self, id: &Uuid, tag_text: &str) -> Result<IncidentTagRelation> {
        let pair: TagPair = tag_text.parse()?;

        let (_, relation) = self
            .mutate(id, |incident| incident.detach_tag(&pair))
            .await?;

        tracing::debug!(incident_id = %id, tag = %pair, "Detached tag");
        Ok(relation)
    }

    pub async fn list_tags(&self, id: &Uuid) -> Result<BTreeSet<String>> {
        Ok(self.get_incident(id).await?.tag_strings())
    }

    pub async fn get_tag(&self, id: &Uuid, tag_text: &str) -> Result<IncidentTagRelation> {
        let pair: TagPair = tag_text.parse()?;
        let incident = self.get_incident(id).await?;

        incident
            .tag_relation(&pair)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("tag {} on incident {}", pair, id)))
    }

    /// Incidents matching every comma separated term, newest first
    pub async fn search(&self, query: Option<&str>) -> Result<Vec<Incident>> {
        let incidents = self.store.list_incidents().await?;
        Ok(search::search(incidents, query))
    }

    /// Append an OTHER or CLOSE event.
    ///
    /// START only exists at creation and ACKNOWLEDGE needs an expiration
    /// record, so both are rejected here.
    pub async fn add_event(
        &self,
        id: &Uuid,
        event_type: EventType,
        description: &str,
        timestamp: DateTime<Utc>,
        actor: &str,
    ) -> Result<Event> {
        match event_type {
            EventType::Start => {
                return Err(AppError::InvalidTransition(format!(
                    "incident {} already has a START event",
                    id
                )))
            }
            EventType::Acknowledge => {
                return Err(AppError::InvalidTransition(
                    "acknowledgements are created through acknowledge_incident".to_string(),
                ))
            }
            EventType::Close | EventType::Other => {}
        }

        let (_, event) = self
            .mutate(id, |incident| {
                incident.append_event(event_type, description, timestamp, actor)
            })
            .await?;

        tracing::debug!(
            incident_id = %id,
            event_id = %event.id,
            event_type = %event_type,
            "Added event"
        );
        Ok(event)
    }

    pub async fn list_events(&self, id: &Uuid) -> Result<Vec<Event>> {
        Ok(self.get_incident(id).await?.ordered_events())
    }

    pub async fn get_event(&self, id: &Uuid, event_id: &Uuid) -> Result<Event> {
        let incident = self.get_incident(id).await?;
        incident
            .event(event_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Event {} of incident {} not found", event_id, id))
            })
    }

    /// Events of all incidents, ordered by timestamp
    pub async fn list_all_events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .store
            .list_incidents()
            .await?
            .into_iter()
            .flat_map(|incident| incident.events)
            .collect();
        sort_events(&mut events);
        Ok(events)
    }

    pub async fn list_acknowledgements(&self, id: &Uuid) -> Result<Vec<Acknowledgement>> {
        Ok(self.get_incident(id).await?.acknowledgements())
    }

    pub async fn get_acknowledgement(&self, id: &Uuid, ack_id: &Uuid) -> Result<Acknowledgement> {
        let incident = self.get_incident(id).await?;
        incident.acknowledgement(ack_id).ok_or_else(|| {
            AppError::NotFound(format!("Acknowledgement {} of incident {} not found", ack_id, id))
        })
    }

    pub async fn status(&self, id: &Uuid, as_of: DateTime<Utc>) -> Result<IncidentStatus> {
        Ok(self.get_incident(id).await?.status_at(as_of))
    }

    /// Incidents matching `filter` as seen at `as_of`, newest first
    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self
            .store
            .list_incidents()
            .await?
            .into_iter()
            .filter(|incident| filter.matches(incident, as_of))
            .collect();
        search::sort_newest_first(&mut incidents);
        Ok(incidents)
    }

    /// Incidents carrying exactly this tag
    pub async fn incidents_with_tag(&self, tag_text: &str) -> Result<Vec<Incident>> {
        let pair: TagPair = tag_text.parse()?;
        let filter = IncidentFilter::new().with_tag(pair);
        self.list_incidents(&filter, Utc::now()).await
    }

    /// Incidents reported by source systems that `user` owns
    pub async fn incidents_for_user(&self, user: &str) -> Result<Vec<Incident>> {
        let owned: HashSet<Uuid> = self
            .store
            .list_sources()
            .await?
            .into_iter()
            .filter(|source| source.owner == user)
            .map(|source| source.id)
            .collect();

        if owned.is_empty() {
            return Ok(Vec::new());
        }

        let filter = IncidentFilter {
            sources: owned.into_iter().collect(),
            ..IncidentFilter::default()
        };
        self.list_incidents(&filter, Utc::now()).await
    }

    /// Acknowledge several incidents concurrently; each outcome stands alone
    pub async fn bulk_acknowledge(
        &self,
        ids: &[Uuid],
        description: &str,
        timestamp: DateTime<Utc>,
        expiration: Option<DateTime<Utc>>,
        actor: &str,
    ) -> Vec<BulkAckOutcome> {
        let outcomes = join_all(ids.iter().map(|id| async move {
            BulkAckOutcome {
                incident_id: *id,
                result: self
                    .acknowledge_incident(id, description, timestamp, expiration, actor)
                    .await,
            }
        }))
        .await;

        let failed = outcomes.iter().filter(|outcome| outcome.result.is_err()).count();
        tracing::info!(
            requested = ids.len(),
            failed = failed,
            actor = %actor,
            "Bulk acknowledged incidents"
        );

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceSystem, SourceSystemType};
    use crate::state::create_in_memory_store;
    use chrono::Duration;

    async fn create_test_service() -> (IncidentService, SourceSystem) {
        let store = create_in_memory_store();
        store
            .insert_source_type(&SourceSystemType::new("nav"))
            .await
            .unwrap();
        let source = SourceSystem::new("nav-1", "nav", "nav-user");
        store.insert_source(&source).await.unwrap();
        (IncidentService::new(store), source)
    }

    #[tokio::test]
    async fn test_create_incident() {
        let (service, source) = create_test_service().await;
        let new = NewIncident::new("incident1", 2, source.id).with_tag("a=b");

        let incident = service.create_incident(new).await.unwrap();

        let events = service.list_events(&incident.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Start);
        assert_eq!(events[0].actor, "nav-user");
        assert_eq!(
            service.list_tags(&incident.id).await.unwrap(),
            BTreeSet::from(["a=b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_create_incident_rejects_bad_input() {
        let (service, source) = create_test_service().await;

        let unknown_source = NewIncident::new("x", 2, Uuid::new_v4());
        assert!(matches!(
            service.create_incident(unknown_source).await,
            Err(AppError::NotFound(_))
        ));

        let bad_level = NewIncident::new("x", 9, source.id);
        assert!(matches!(
            service.create_incident(bad_level).await,
            Err(AppError::Validation(_))
        ));

        let bad_tag = NewIncident::new("x", 2, source.id).with_tag("ab");
        assert!(matches!(
            service.create_incident(bad_tag).await,
            Err(AppError::MalformedTag(_))
        ));

        assert!(service.search(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_event_rejects_start_and_ack() {
        let (service, source) = create_test_service().await;
        let incident = service
            .create_incident(NewIncident::new("incident", 3, source.id))
            .await
            .unwrap();

        for event_type in [EventType::Start, EventType::Acknowledge] {
            let result = service
                .add_event(&incident.id, event_type, "nope", Utc::now(), "alice")
                .await;
            assert!(matches!(result, Err(AppError::InvalidTransition(_))));
        }

        service
            .add_event(&incident.id, EventType::Other, "note", Utc::now(), "alice")
            .await
            .unwrap();
        assert_eq!(service.list_events(&incident.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_store_untouched() {
        let (service, source) = create_test_service().await;
        let incident = service
            .create_incident(NewIncident::new("incident", 3, source.id))
            .await
            .unwrap();
        let closed_at = incident.start_time + Duration::minutes(5);
        service.close_incident(&incident.id, closed_at, "alice").await.unwrap();

        let before = service.get_incident(&incident.id).await.unwrap();
        let result = service
            .acknowledge_incident(&incident.id, "late", closed_at, None, "bob")
            .await;
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
        assert_eq!(service.get_incident(&incident.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_ticket_url_and_level_updates() {
        let (service, source) = create_test_service().await;
        let incident = service
            .create_incident(NewIncident::new("incident", 3, source.id))
            .await
            .unwrap();

        let updated = service
            .update_ticket_url(&incident.id, Some("www.example.com".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.ticket_url.as_deref(), Some("www.example.com"));

        let cleared = service
            .update_ticket_url(&incident.id, Some(String::new()))
            .await
            .unwrap();
        assert!(cleared.ticket_url.is_none());

        assert_eq!(service.update_level(&incident.id, 1).await.unwrap().level, 1);
        assert!(matches!(
            service.update_level(&incident.id, 0).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_ticket_url_rules_match_on_create_and_update() {
        let (service, source) = create_test_service().await;

        let blank = service
            .create_incident(NewIncident::new("incident", 3, source.id).with_ticket_url("  "))
            .await
            .unwrap();
        assert!(blank.ticket_url.is_none());

        // 1024 characters but more than 1024 bytes
        let wide = "é".repeat(MAX_TICKET_URL_LEN);
        let created = service
            .create_incident(NewIncident::new("incident", 3, source.id).with_ticket_url(&wide))
            .await
            .unwrap();
        service
            .update_ticket_url(&created.id, Some(wide.clone()))
            .await
            .unwrap();

        let too_long = format!("{}é", wide);
        let new = NewIncident::new("incident", 3, source.id).with_ticket_url(&too_long);
        assert!(matches!(
            service.create_incident(new).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.update_ticket_url(&created.id, Some(too_long)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_to_missing_incidents_release_locks() {
        let (service, source) = create_test_service().await;
        let now = Utc::now();

        for _ in 0..100 {
            let id = Uuid::new_v4();
            assert!(service.close_incident(&id, now, "alice").await.is_err());
            assert!(service.delete_incident(&id).await.is_err());
            assert!(service.acknowledge_incident(&id, "ack", now, None, "alice").await.is_err());
        }
        let stale: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
        service.bulk_acknowledge(&stale, "ack", now, None, "alice").await;
        assert!(service.locks.is_empty());

        let incident = service
            .create_incident(NewIncident::new("incident", 3, source.id))
            .await
            .unwrap();
        service.update_level(&incident.id, 1).await.unwrap();
        service.delete_incident(&incident.id).await.unwrap();
        assert!(service.locks.is_empty());
    }

    #[tokio::test]
    async fn test_attach_to_missing_incident_interns_nothing() {
        let (service, _) = create_test_service().await;

        let result = service.attach_tag(&Uuid::new_v4(), "a=b", "alice").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(service.store().list_tags().await.unwrap().is_empty());
        assert!(service.locks.is_empty());
    }

    #[tokio::test]
    async fn test_delete_keeps_tags_interned() {
        let (service, source) = create_test_service().await;
        let incident = service
            .create_incident(NewIncident::new("incident", 3, source.id).with_tag("a=b"))
            .await
            .unwrap();

        service.delete_incident(&incident.id).await.unwrap();

        assert!(matches!(
            service.get_incident(&incident.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(service
            .store()
            .get_tag(&TagPair::new("a", "b"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_incidents_for_user() {
        let (service, source) = create_test_service().await;
        service
            .create_incident(NewIncident::new("mine", 3, source.id))
            .await
            .unwrap();

        assert_eq!(service.incidents_for_user("nav-user").await.unwrap().len(), 1);
        assert!(service.incidents_for_user("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_acknowledge_reports_each_incident() {
        let (service, source) = create_test_service().await;
        let first = service
            .create_incident(NewIncident::new("one", 3, source.id))
            .await
            .unwrap();
        let second = service
            .create_incident(NewIncident::new("two", 3, source.id))
            .await
            .unwrap();
        let missing = Uuid::new_v4();

        let outcomes = service
            .bulk_acknowledge(&[first.id, second.id, missing], "bulk", Utc::now(), None, "alice")
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_ok());
        assert_eq!(outcomes[2].incident_id, missing);
        assert!(matches!(outcomes[2].result, Err(AppError::NotFound(_))));
        assert_eq!(
            service.status(&first.id, Utc::now()).await.unwrap(),
            IncidentStatus::OpenAcked
        );
    }
}
