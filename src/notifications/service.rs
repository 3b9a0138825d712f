use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::media::MediaRegistry;
use crate::config::NotificationConfig;
use crate::error::{AppError, Result};
use crate::models::{default_timeslot, DestinationConfig, TimeRecurrence, Timeslot};
use crate::state::{RegistryStore, Store};

/// Per-user notification settings: timeslots and destinations
pub struct NotificationService {
    store: Arc<dyn Store>,
    media: MediaRegistry,
    default_timeslot_name: String,
    /// Serializes destination writes so duplicate checks see each other
    destinations_guard: Mutex<()>,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn Store>,
        media: MediaRegistry,
        default_timeslot_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            media,
            default_timeslot_name: default_timeslot_name.into(),
            destinations_guard: Mutex::new(()),
        }
    }

    /// Create a notification service with the media enabled in `config`
    pub fn from_config(store: Arc<dyn Store>, config: &NotificationConfig) -> Result<Self> {
        let media = MediaRegistry::from_config(config)?;
        Ok(Self::new(store, media, config.default_timeslot_name.clone()))
    }

    pub fn media(&self) -> &MediaRegistry {
        &self.media
    }

    /// Give a new user the default always-active timeslot.
    ///
    /// Provisioning an already provisioned user returns the existing timeslot.
    pub async fn provision_user(&self, user: &str) -> Result<Timeslot> {
        let timeslot = default_timeslot(user, self.default_timeslot_name.as_str());

        match self.store.insert_timeslot(&timeslot).await {
            Ok(()) => {
                tracing::info!(
                    user = %user,
                    timeslot_id = %timeslot.id,
                    "Provisioned default timeslot"
                );
                Ok(timeslot)
            }
            Err(AppError::DuplicateName(_)) => self
                .list_timeslots(user)
                .await?
                .into_iter()
                .find(|existing| existing.name == self.default_timeslot_name)
                .ok_or_else(|| {
                    AppError::NotFound(format!("default timeslot of {}", user))
                }),
            Err(e) => Err(e),
        }
    }

    pub async fn create_timeslot(
        &self,
        user: &str,
        name: &str,
        recurrences: Vec<TimeRecurrence>,
    ) -> Result<Timeslot> {
        let timeslot = Timeslot::new(user, name.trim(), recurrences);
        timeslot.validate()?;

        self.store.insert_timeslot(&timeslot).await?;

        tracing::debug!(
            user = %user,
            timeslot_id = %timeslot.id,
            name = %timeslot.name,
            "Created timeslot"
        );
        Ok(timeslot)
    }

    pub async fn get_timeslot(&self, id: &Uuid) -> Result<Timeslot> {
        self.store
            .get_timeslot(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Timeslot {} not found", id)))
    }

    /// Replace name and recurrences of a timeslot
    pub async fn update_timeslot(
        &self,
        id: &Uuid,
        name: &str,
        recurrences: Vec<TimeRecurrence>,
    ) -> Result<Timeslot> {
        let mut timeslot = self.get_timeslot(id).await?;
        timeslot.name = name.trim().to_string();
        timeslot.recurrences = recurrences;
        timeslot.validate()?;

        self.store.update_timeslot(&timeslot).await?;

        tracing::debug!(timeslot_id = %id, name = %timeslot.name, "Updated timeslot");
        Ok(timeslot)
    }

    pub async fn delete_timeslot(&self, id: &Uuid) -> Result<()> {
        self.store.delete_timeslot(id).await?;
        tracing::debug!(timeslot_id = %id, "Deleted timeslot");
        Ok(())
    }

    /// Timeslots of `user`, ordered by name
    pub async fn list_timeslots(&self, user: &str) -> Result<Vec<Timeslot>> {
        let mut timeslots = self.store.list_timeslots(user).await?;
        timeslots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(timeslots)
    }

    /// Timeslots of `user` with a recurrence covering `at`
    pub async fn active_timeslots(&self, user: &str, at: DateTime<Utc>) -> Result<Vec<Timeslot>> {
        Ok(self
            .list_timeslots(user)
            .await?
            .into_iter()
            .filter(|timeslot| timeslot.is_active_at(at))
            .collect())
    }

    /// Fail when `user` already has a `media` destination with the same address
    async fn check_unique_address(
        &self,
        user: &str,
        media: &str,
        settings: &Value,
        except: Option<Uuid>,
    ) -> Result<()> {
        let plugin = self.media.get(media)?;
        let Some(address) = plugin.address(settings) else {
            return Ok(());
        };

        let taken = self
            .store
            .list_destinations(user)
            .await?
            .into_iter()
            .filter(|existing| existing.media == media && Some(existing.id) != except)
            .any(|existing| plugin.address(&existing.settings) == Some(address));

        if taken {
            return Err(AppError::DuplicateName(format!(
                "{} destination {:?} already exists",
                media, address
            )));
        }
        Ok(())
    }

    /// Validate settings through the media plugin and store the destination
    pub async fn create_destination(
        &self,
        user: &str,
        media: &str,
        label: Option<String>,
        settings: &Value,
    ) -> Result<DestinationConfig> {
        let settings = self.media.get(media)?.clean_settings(settings)?;

        let _guard = self.destinations_guard.lock().await;
        self.check_unique_address(user, media, &settings, None).await?;

        let destination = DestinationConfig {
            id: Uuid::new_v4(),
            user: user.to_string(),
            media: media.to_string(),
            label,
            settings,
        };
        self.store.insert_destination(&destination).await?;

        tracing::info!(
            user = %user,
            media = %media,
            destination_id = %destination.id,
            "Created destination"
        );
        Ok(destination)
    }

    pub async fn get_destination(&self, id: &Uuid) -> Result<DestinationConfig> {
        self.store
            .get_destination(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Destination {} not found", id)))
    }

    /// Replace label and settings; the media of a destination never changes
    pub async fn update_destination(
        &self,
        id: &Uuid,
        label: Option<String>,
        settings: &Value,
    ) -> Result<DestinationConfig> {
        let _guard = self.destinations_guard.lock().await;

        let mut destination = self.get_destination(id).await?;
        let settings = self.media.get(&destination.media)?.clean_settings(settings)?;
        self.check_unique_address(&destination.user, &destination.media, &settings, Some(*id))
            .await?;

        destination.label = label;
        destination.settings = settings;
        self.store.update_destination(&destination).await?;

        tracing::debug!(destination_id = %id, "Updated destination");
        Ok(destination)
    }

    pub async fn delete_destination(&self, id: &Uuid) -> Result<()> {
        let _guard = self.destinations_guard.lock().await;
        self.store.delete_destination(id).await?;
        tracing::debug!(destination_id = %id, "Deleted destination");
        Ok(())
    }

    /// Destinations of `user`, ordered by media then label
    pub async fn list_destinations(&self, user: &str) -> Result<Vec<DestinationConfig>> {
        let mut destinations = self.store.list_destinations(user).await?;
        destinations.sort_by(|a, b| (&a.media, &a.label).cmp(&(&b.media, &b.label)));
        Ok(destinations)
    }
}
