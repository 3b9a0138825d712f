use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per incident, created on first use.
///
/// Writers of the same incident queue up; writers of different incidents
/// never block each other.
#[derive(Clone, Default)]
pub struct IncidentLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl IncidentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `incident_id`
    pub async fn acquire(&self, incident_id: Uuid) -> OwnedMutexGuard<()> {
        // Clone out of the map so no shard lock is held across the await
        let lock = self.locks.entry(incident_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the mutex of `incident_id` once no guard or waiter holds it.
    ///
    /// Call after the guard from `acquire` is dropped.
    pub fn release(&self, incident_id: &Uuid) {
        self.locks
            .remove_if(incident_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
