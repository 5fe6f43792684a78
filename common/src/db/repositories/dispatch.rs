// Dispatch ledger backed by the reminder_dispatches table
//
// Every transition is a conditional UPDATE on (key, version), so the
// database decides which of two overlapping runs owns a claim.

use crate::db::DbPool;
use crate::errors::{LedgerError, StorageError};
use crate::models::{DispatchKey, DispatchRecord, DispatchStatus};
use crate::reminder::outcome::DispatchOutcome;
use crate::reminder::store::{ClaimOutcome, DispatchLedger};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, instrument, warn};

const RECORD_COLUMNS: &str =
    "event_id, stage_id, dispatch_date, status, attempts, version, claimed_at, completed_at, sent, failed";

// A claim that loses a CAS race re-reads and re-decides this many times
const MAX_CLAIM_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct DispatchRepository {
    pool: DbPool,
}

fn record_from_row(row: &PgRow) -> Result<DispatchRecord, LedgerError> {
    let status: String = row.try_get("status").map_err(StorageError::from)?;
    let status = status
        .parse::<DispatchStatus>()
        .map_err(LedgerError::InvalidStatus)?;

    let get = |e: sqlx::Error| LedgerError::Storage(StorageError::from(e));

    Ok(DispatchRecord {
        key: DispatchKey {
            event_id: row.try_get("event_id").map_err(get)?,
            stage_id: row.try_get("stage_id").map_err(get)?,
            dispatch_date: row.try_get("dispatch_date").map_err(get)?,
        },
        status,
        attempts: row.try_get("attempts").map_err(get)?,
        version: row.try_get("version").map_err(get)?,
        claimed_at: row.try_get("claimed_at").map_err(get)?,
        completed_at: row.try_get("completed_at").map_err(get)?,
        sent: row.try_get("sent").map_err(get)?,
        failed: row.try_get("failed").map_err(get)?,
    })
}

fn is_live_claim(record: &DispatchRecord, stale_before: DateTime<Utc>) -> bool {
    record.status == DispatchStatus::Dispatching
        && record.claimed_at.map(|t| t > stale_before).unwrap_or(false)
}

impl DispatchRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_claim(
        &self,
        key: &DispatchKey,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchRecord>, LedgerError> {
        let sql = format!(
            r#"
            INSERT INTO reminder_dispatches
                (event_id, stage_id, dispatch_date, status, attempts, version, claimed_at)
            VALUES ($1, $2, $3, 'DISPATCHING', 1, 1, $4)
            ON CONFLICT (event_id, stage_id, dispatch_date) DO NOTHING
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(key.event_id)
            .bind(&key.stage_id)
            .bind(key.dispatch_date)
            .bind(now)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(StorageError::from)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn reclaim(
        &self,
        current: &DispatchRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchRecord>, LedgerError> {
        let sql = format!(
            r#"
            UPDATE reminder_dispatches
            SET status = 'DISPATCHING',
                attempts = attempts + 1,
                version = version + 1,
                claimed_at = $5
            WHERE event_id = $1 AND stage_id = $2 AND dispatch_date = $3
              AND version = $4
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(current.key.event_id)
            .bind(&current.key.stage_id)
            .bind(current.key.dispatch_date)
            .bind(current.version)
            .bind(now)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(StorageError::from)?;

        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl DispatchLedger for DispatchRepository {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &DispatchKey) -> Result<Option<DispatchRecord>, LedgerError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM reminder_dispatches
            WHERE event_id = $1 AND stage_id = $2 AND dispatch_date = $3
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(key.event_id)
            .bind(&key.stage_id)
            .bind(key.dispatch_date)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(StorageError::from)?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn claim(
        &self,
        key: &DispatchKey,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<ClaimOutcome, LedgerError> {
        if let Some(record) = self.insert_claim(key, now).await? {
            debug!(version = record.version, "Dispatch record created and claimed");
            return Ok(ClaimOutcome::Claimed(record));
        }

        let mut last_seen = None;
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let current = match self.get(key).await? {
                Some(record) => record,
                None => match self.insert_claim(key, now).await? {
                    Some(record) => return Ok(ClaimOutcome::Claimed(record)),
                    None => continue,
                },
            };

            if current.status == DispatchStatus::Sent {
                return Ok(ClaimOutcome::AlreadySent(current));
            }
            if is_live_claim(&current, stale_before) {
                return Ok(ClaimOutcome::InFlight(current));
            }

            if let Some(record) = self.reclaim(&current, now).await? {
                debug!(
                    version = record.version,
                    attempts = record.attempts,
                    "Dispatch record claimed"
                );
                return Ok(ClaimOutcome::Claimed(record));
            }
            last_seen = Some(current);
        }

        // Lost every CAS round: someone else is actively claiming this key
        match last_seen {
            Some(record) => {
                warn!("Claim contention exhausted, treating dispatch as in flight");
                Ok(ClaimOutcome::InFlight(record))
            }
            None => Err(LedgerError::Storage(StorageError::QueryFailed(format!(
                "could not read or create dispatch record {}",
                key
            )))),
        }
    }

    #[instrument(skip(self, claim, outcome), fields(key = %claim.key, version = claim.version))]
    async fn complete(
        &self,
        claim: &DispatchRecord,
        outcome: &DispatchOutcome,
        now: DateTime<Utc>,
    ) -> Result<DispatchRecord, LedgerError> {
        let sql = format!(
            r#"
            UPDATE reminder_dispatches
            SET status = 'SENT',
                version = version + 1,
                completed_at = $5,
                sent = $6,
                failed = $7
            WHERE event_id = $1 AND stage_id = $2 AND dispatch_date = $3
              AND version = $4 AND status = 'DISPATCHING'
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(claim.key.event_id)
            .bind(&claim.key.stage_id)
            .bind(claim.key.dispatch_date)
            .bind(claim.version)
            .bind(now)
            .bind(outcome.sent as i32)
            .bind(outcome.failed as i32)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(StorageError::from)?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(LedgerError::VersionConflict {
                key: claim.key.ledger_key(),
                expected: claim.version,
            }),
        }
    }

    #[instrument(skip(self, claim), fields(key = %claim.key, version = claim.version))]
    async fn release(&self, claim: &DispatchRecord) -> Result<DispatchRecord, LedgerError> {
        let sql = format!(
            r#"
            UPDATE reminder_dispatches
            SET status = 'PENDING',
                version = version + 1,
                claimed_at = NULL
            WHERE event_id = $1 AND stage_id = $2 AND dispatch_date = $3
              AND version = $4 AND status = 'DISPATCHING'
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(claim.key.event_id)
            .bind(&claim.key.stage_id)
            .bind(claim.key.dispatch_date)
            .bind(claim.version)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(StorageError::from)?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(LedgerError::VersionConflict {
                key: claim.key.ledger_key(),
                expected: claim.version,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use uuid::Uuid;

    fn record(status: DispatchStatus, claimed_at: Option<DateTime<Utc>>) -> DispatchRecord {
        DispatchRecord {
            key: DispatchKey::new(
                Uuid::new_v4(),
                "near-lead",
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            ),
            status,
            attempts: 1,
            version: 1,
            claimed_at,
            completed_at: None,
            sent: 0,
            failed: 0,
        }
    }

    #[test]
    fn test_fresh_dispatching_claim_is_live() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let stale_before = now - Duration::minutes(15);
        let rec = record(DispatchStatus::Dispatching, Some(now - Duration::minutes(1)));
        assert!(is_live_claim(&rec, stale_before));
    }

    #[test]
    fn test_old_dispatching_claim_is_stale() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let stale_before = now - Duration::minutes(15);
        let rec = record(DispatchStatus::Dispatching, Some(now - Duration::minutes(30)));
        assert!(!is_live_claim(&rec, stale_before));
    }

    #[test]
    fn test_pending_record_is_never_live() {
        let now = Utc::now();
        let rec = record(DispatchStatus::Pending, Some(now));
        assert!(!is_live_claim(&rec, now - Duration::minutes(15)));
    }
}
