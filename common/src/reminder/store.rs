// Persistence contracts consumed by the reminder pipeline

use crate::errors::{LedgerError, StorageError};
use crate::models::{DispatchKey, DispatchRecord, Event, EventMetadata, Registration};
use crate::reminder::outcome::DispatchOutcome;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Read/merge access to events and registrations
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Events whose scheduled start lies in `[start, end]` (both inclusive),
    /// ordered by scheduled start
    async fn find_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        active_only: bool,
    ) -> Result<Vec<Event>, StorageError>;

    /// Confirmed registrations of one event, read at call time
    async fn find_confirmed_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<Registration>, StorageError>;

    /// Atomically shallow-merge `partial` into the event's metadata map
    async fn merge_event_metadata(
        &self,
        event_id: Uuid,
        partial: EventMetadata,
    ) -> Result<(), StorageError>;

    /// Cheap liveness check for the backing store
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Result of trying to claim a dispatch record
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This caller moved the record to DISPATCHING and owns the pass
    Claimed(DispatchRecord),
    /// A pass already completed for this key
    AlreadySent(DispatchRecord),
    /// Another caller holds a live DISPATCHING claim
    InFlight(DispatchRecord),
}

/// Versioned per-(event, stage, date) dispatch records
///
/// Every transition is a compare-and-swap on the record version, so two
/// overlapping runs can never both own a DISPATCHING claim.
#[async_trait]
pub trait DispatchLedger: Send + Sync {
    async fn get(&self, key: &DispatchKey) -> Result<Option<DispatchRecord>, LedgerError>;

    /// PENDING, absent, or DISPATCHING claimed before `stale_before` → DISPATCHING
    async fn claim(
        &self,
        key: &DispatchKey,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<ClaimOutcome, LedgerError>;

    /// DISPATCHING → SENT for the claim's version
    async fn complete(
        &self,
        claim: &DispatchRecord,
        outcome: &DispatchOutcome,
        now: DateTime<Utc>,
    ) -> Result<DispatchRecord, LedgerError>;

    /// DISPATCHING → PENDING for the claim's version
    async fn release(&self, claim: &DispatchRecord) -> Result<DispatchRecord, LedgerError>;
}
