// PostgreSQL-backed reminder store

use crate::db::repositories::{EventRepository, RegistrationRepository};
use crate::db::DbPool;
use crate::errors::StorageError;
use crate::models::{Event, EventMetadata, Registration};
use crate::reminder::store::ReminderStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `ReminderStore` over the `events` and `registrations` tables
#[derive(Clone)]
pub struct PgReminderStore {
    pool: DbPool,
    events: EventRepository,
    registrations: RegistrationRepository,
}

impl PgReminderStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            events: EventRepository::new(pool.clone()),
            registrations: RegistrationRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn events(&self) -> &EventRepository {
        &self.events
    }

    pub fn registrations(&self) -> &RegistrationRepository {
        &self.registrations
    }
}

#[async_trait]
impl ReminderStore for PgReminderStore {
    async fn find_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        active_only: bool,
    ) -> Result<Vec<Event>, StorageError> {
        Ok(self.events.find_in_range(start, end, active_only).await?)
    }

    async fn find_confirmed_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<Registration>, StorageError> {
        Ok(self.registrations.find_confirmed_by_event(event_id).await?)
    }

    async fn merge_event_metadata(
        &self,
        event_id: Uuid,
        partial: EventMetadata,
    ) -> Result<(), StorageError> {
        Ok(self.events.merge_metadata(event_id, partial).await?)
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(self.pool.health_check().await?)
    }
}
