//! Shared setup for the integration tests
#![allow(dead_code)]

use incident_ledger::{
    incidents::IncidentService,
    models::{Incident, NewIncident, SourceSystem},
    sources::SourceRegistry,
    state::{create_in_memory_store, SledStore, Store},
};
use std::sync::Arc;
use tempfile::TempDir;

/// A sled backed store living in a temporary directory
pub fn create_sled_store() -> (Arc<dyn Store>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = SledStore::new(temp_dir.path()).unwrap();
    (Arc::new(store), temp_dir)
}

/// Register the "nav" type and one source system owned by `nav-user`
pub async fn register_source(store: &Arc<dyn Store>) -> SourceSystem {
    let registry = SourceRegistry::new(store.clone());
    registry.create_source_type("nav").await.unwrap();
    registry
        .create_source_system("nav-1", "nav", "nav-user")
        .await
        .unwrap()
}

/// Incident service over an in-memory store with one registered source
pub async fn create_test_service() -> (Arc<IncidentService>, SourceSystem) {
    let store = create_in_memory_store();
    let source = register_source(&store).await;
    (Arc::new(IncidentService::new(store)), source)
}

/// Create an incident with the given description and tags
pub async fn create_test_incident(
    service: &IncidentService,
    source: &SourceSystem,
    description: &str,
    tags: &[&str],
) -> Incident {
    let mut new = NewIncident::new(description, 3, source.id);
    new.tags = tags.iter().map(|tag| tag.to_string()).collect();
    service.create_incident(new).await.unwrap()
}
