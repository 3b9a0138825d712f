use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{SourceSystem, SourceSystemType};
use crate::state::{RegistryStore, Store};

/// Registers source system types and source systems.
///
/// Type names are unique; source system names are unique per type. Both are
/// enforced by the store.
pub struct SourceRegistry {
    store: Arc<dyn Store>,
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_source_type(&self, name: &str) -> Result<SourceSystemType> {
        let source_type = SourceSystemType::new(name);
        source_type.validate()?;

        self.store.insert_source_type(&source_type).await?;

        tracing::info!(source_type = %source_type.name, "Created source system type");
        Ok(source_type)
    }

    pub async fn get_source_type(&self, name: &str) -> Result<SourceSystemType> {
        let name = SourceSystemType::new(name).name;
        self.store
            .get_source_type(&name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Source system type {:?} not found", name)))
    }

    /// All types, ordered by name
    pub async fn list_source_types(&self) -> Result<Vec<SourceSystemType>> {
        let mut types = self.store.list_source_types().await?;
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    /// Register a source system of an existing type
    pub async fn create_source_system(
        &self,
        name: &str,
        type_name: &str,
        owner: &str,
    ) -> Result<SourceSystem> {
        let source_type = self.get_source_type(type_name).await?;
        let source = SourceSystem::new(name.trim(), source_type.name, owner);
        source.validate()?;

        self.store.insert_source(&source).await?;

        tracing::info!(
            source_id = %source.id,
            source = %source.name,
            source_type = %source.type_name,
            owner = %source.owner,
            "Created source system"
        );
        Ok(source)
    }

    pub async fn get_source_system(&self, id: &Uuid) -> Result<SourceSystem> {
        self.store
            .get_source(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Source system {} not found", id)))
    }

    pub async fn rename_source_system(&self, id: &Uuid, name: &str) -> Result<SourceSystem> {
        let mut source = self.get_source_system(id).await?;
        source.name = name.trim().to_string();
        source.validate()?;

        self.store.update_source(&source).await?;

        tracing::debug!(source_id = %id, source = %source.name, "Renamed source system");
        Ok(source)
    }

    /// All source systems, ordered by type then name
    pub async fn list_source_systems(&self) -> Result<Vec<SourceSystem>> {
        let mut sources = self.store.list_sources().await?;
        sources.sort_by(|a, b| (&a.type_name, &a.name).cmp(&(&b.type_name, &b.name)));
        Ok(sources)
    }

    pub async fn sources_owned_by(&self, owner: &str) -> Result<Vec<SourceSystem>> {
        Ok(self
            .list_source_systems()
            .await?
            .into_iter()
            .filter(|source| source.owner == owner)
            .collect())
    }
}
