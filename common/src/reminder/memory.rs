// In-memory store and dispatch ledger
//
// Backs tests and local runs that have no PostgreSQL instance. Each call
// takes the lock once, so a single call is atomic but read-then-write
// sequences across calls are not, same as the database-backed store.

use crate::errors::{LedgerError, StorageError};
use crate::models::{
    DispatchKey, DispatchRecord, DispatchStatus, Event, EventMetadata, Registration,
};
use crate::reminder::outcome::DispatchOutcome;
use crate::reminder::store::{ClaimOutcome, DispatchLedger, ReminderStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryReminderStore {
    events: RwLock<HashMap<Uuid, Event>>,
    registrations: RwLock<Vec<Registration>>,
    records: Mutex<HashMap<DispatchKey, DispatchRecord>>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.events.write().await.insert(event.id, event);
    }

    pub async fn insert_registration(&self, registration: Registration) {
        self.registrations.write().await.push(registration);
    }

    pub async fn set_confirmed(&self, registration_id: Uuid, confirmed: bool) {
        let mut registrations = self.registrations.write().await;
        if let Some(registration) = registrations.iter_mut().find(|r| r.id == registration_id) {
            registration.confirmed = confirmed;
        }
    }

    pub async fn event(&self, event_id: Uuid) -> Option<Event> {
        self.events.read().await.get(&event_id).cloned()
    }

    pub async fn record(&self, key: &DispatchKey) -> Option<DispatchRecord> {
        self.records.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn find_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        active_only: bool,
    ) -> Result<Vec<Event>, StorageError> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events
            .values()
            .filter(|e| !active_only || e.is_active)
            .filter(|e| e.scheduled_start >= start && e.scheduled_start <= end)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.scheduled_start
                .cmp(&b.scheduled_start)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matched)
    }

    async fn find_confirmed_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<Registration>, StorageError> {
        let registrations = self.registrations.read().await;
        let mut confirmed: Vec<Registration> = registrations
            .iter()
            .filter(|r| r.event_id == event_id && r.confirmed)
            .cloned()
            .collect();
        confirmed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(confirmed)
    }

    async fn merge_event_metadata(
        &self,
        event_id: Uuid,
        partial: EventMetadata,
    ) -> Result<(), StorageError> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(&event_id)
            .ok_or_else(|| StorageError::NotFound(format!("event {}", event_id)))?;
        event.metadata.extend(partial);
        Ok(())
    }
}

#[async_trait]
impl DispatchLedger for InMemoryReminderStore {
    async fn get(&self, key: &DispatchKey) -> Result<Option<DispatchRecord>, LedgerError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn claim(
        &self,
        key: &DispatchKey,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<ClaimOutcome, LedgerError> {
        let mut records = self.records.lock().await;

        let existing = match records.entry(key.clone()) {
            Entry::Vacant(slot) => {
                let record = DispatchRecord {
                    key: key.clone(),
                    status: DispatchStatus::Dispatching,
                    attempts: 1,
                    version: 1,
                    claimed_at: Some(now),
                    completed_at: None,
                    sent: 0,
                    failed: 0,
                };
                slot.insert(record.clone());
                return Ok(ClaimOutcome::Claimed(record));
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        match existing.status {
            DispatchStatus::Sent => Ok(ClaimOutcome::AlreadySent(existing.clone())),
            DispatchStatus::Dispatching
                if existing.claimed_at.map(|t| t > stale_before).unwrap_or(false) =>
            {
                Ok(ClaimOutcome::InFlight(existing.clone()))
            }
            _ => {
                existing.status = DispatchStatus::Dispatching;
                existing.attempts += 1;
                existing.version += 1;
                existing.claimed_at = Some(now);
                Ok(ClaimOutcome::Claimed(existing.clone()))
            }
        }
    }

    async fn complete(
        &self,
        claim: &DispatchRecord,
        outcome: &DispatchOutcome,
        now: DateTime<Utc>,
    ) -> Result<DispatchRecord, LedgerError> {
        let mut records = self.records.lock().await;
        match records.get_mut(&claim.key) {
            Some(current)
                if current.version == claim.version
                    && current.status == DispatchStatus::Dispatching =>
            {
                current.status = DispatchStatus::Sent;
                current.version += 1;
                current.completed_at = Some(now);
                current.sent = outcome.sent as i32;
                current.failed = outcome.failed as i32;
                Ok(current.clone())
            }
            _ => Err(LedgerError::VersionConflict {
                key: claim.key.ledger_key(),
                expected: claim.version,
            }),
        }
    }

    async fn release(&self, claim: &DispatchRecord) -> Result<DispatchRecord, LedgerError> {
        let mut records = self.records.lock().await;
        match records.get_mut(&claim.key) {
            Some(current)
                if current.version == claim.version
                    && current.status == DispatchStatus::Dispatching =>
            {
                current.status = DispatchStatus::Pending;
                current.version += 1;
                current.claimed_at = None;
                Ok(current.clone())
            }
            _ => Err(LedgerError::VersionConflict {
                key: claim.key.ledger_key(),
                expected: claim.version,
            }),
        }
    }
}
