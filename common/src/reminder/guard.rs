// Idempotency guard for (event, stage, calendar day)

use crate::config::LedgerMode;
use crate::errors::LedgerError;
use crate::models::{DispatchKey, DispatchRecord, Event};
use crate::reminder::outcome::DispatchOutcome;
use crate::reminder::stage::StageConfig;
use crate::reminder::store::{ClaimOutcome, DispatchLedger};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Why an event was not dispatched for a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger key is already set in the event metadata
    MetadataFlagged,
    /// The dispatch record is SENT
    AlreadySent,
    /// Another run holds a live DISPATCHING claim
    InFlight,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MetadataFlagged => "metadata_flagged",
            SkipReason::AlreadySent => "already_sent",
            SkipReason::InFlight => "in_flight",
        }
    }
}

/// Permission to run one dispatch pass
#[derive(Debug, Clone)]
pub struct DispatchTicket {
    pub key: DispatchKey,
    /// Held claim when the record ledger is in use
    pub claim: Option<DispatchRecord>,
}

#[derive(Debug, Clone)]
pub enum GuardDecision {
    Proceed(DispatchTicket),
    Skip(SkipReason),
}

/// Decides whether a stage may dispatch for an event today
///
/// The metadata flag is always honored. With [`LedgerMode::Metadata`] that
/// flag is the only check, so two runs that read it before either writes it
/// will both dispatch. With [`LedgerMode::Record`] a versioned dispatch
/// record is claimed before any send.
#[derive(Clone)]
pub struct IdempotencyGuard {
    timezone: Tz,
    ledger: Option<Arc<dyn DispatchLedger>>,
    claim_timeout: Duration,
}

impl IdempotencyGuard {
    /// Metadata-flag-only guard
    pub fn metadata(timezone: Tz) -> Self {
        Self {
            timezone,
            ledger: None,
            claim_timeout: Duration::zero(),
        }
    }

    /// Guard backed by a compare-and-swap dispatch ledger
    pub fn record(timezone: Tz, ledger: Arc<dyn DispatchLedger>, claim_timeout: Duration) -> Self {
        Self {
            timezone,
            ledger: Some(ledger),
            claim_timeout,
        }
    }

    pub fn mode(&self) -> LedgerMode {
        if self.ledger.is_some() {
            LedgerMode::Record
        } else {
            LedgerMode::Metadata
        }
    }

    /// Calendar day of `now` in the ledger time zone
    pub fn ledger_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn key_for(&self, event: &Event, stage: &StageConfig, now: DateTime<Utc>) -> DispatchKey {
        DispatchKey::new(event.id, stage.id(), self.ledger_date(now))
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, stage = %stage.kind))]
    pub async fn check(
        &self,
        event: &Event,
        stage: &StageConfig,
        now: DateTime<Utc>,
    ) -> Result<GuardDecision, LedgerError> {
        let key = self.key_for(event, stage, now);

        if event.has_flag(&key.ledger_key()) {
            debug!(ledger_key = %key, "Ledger key already set, skipping event");
            return Ok(GuardDecision::Skip(SkipReason::MetadataFlagged));
        }

        let Some(ledger) = &self.ledger else {
            return Ok(GuardDecision::Proceed(DispatchTicket { key, claim: None }));
        };

        let stale_before = now - self.claim_timeout;
        match ledger.claim(&key, now, stale_before).await? {
            ClaimOutcome::Claimed(record) => {
                if record.attempts > 1 {
                    warn!(
                        ledger_key = %key,
                        attempts = record.attempts,
                        "Reclaimed dispatch record, recipients may be notified again"
                    );
                }
                Ok(GuardDecision::Proceed(DispatchTicket {
                    key,
                    claim: Some(record),
                }))
            }
            ClaimOutcome::AlreadySent(_) => {
                debug!(ledger_key = %key, "Dispatch record already sent, skipping event");
                Ok(GuardDecision::Skip(SkipReason::AlreadySent))
            }
            ClaimOutcome::InFlight(record) => {
                debug!(
                    ledger_key = %key,
                    claimed_at = ?record.claimed_at,
                    "Dispatch in flight elsewhere, skipping event"
                );
                Ok(GuardDecision::Skip(SkipReason::InFlight))
            }
        }
    }

    /// Mark the ticket's record SENT. No-op without a record ledger.
    pub async fn commit(
        &self,
        ticket: &DispatchTicket,
        outcome: &DispatchOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if let (Some(ledger), Some(claim)) = (&self.ledger, &ticket.claim) {
            ledger.complete(claim, outcome, now).await?;
        }
        Ok(())
    }

    /// Return a held claim to PENDING after an aborted pass
    pub async fn abandon(&self, ticket: &DispatchTicket) {
        if let (Some(ledger), Some(claim)) = (&self.ledger, &ticket.claim) {
            if let Err(e) = ledger.release(claim).await {
                warn!(
                    ledger_key = %ticket.key,
                    error = %e,
                    "Failed to release dispatch claim"
                );
            }
        }
    }
}
