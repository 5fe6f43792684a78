// Reminder engine: one parameterized pipeline for every stage

use crate::config::{LedgerMode, RemindersConfig};
use crate::delivery::DeliveryAdapter;
use crate::errors::{LedgerError, ReminderError};
use crate::models::Event;
use crate::rate_limit::SendPacer;
use crate::reminder::dispatch::DispatchLoop;
use crate::reminder::guard::{DispatchTicket, GuardDecision, IdempotencyGuard};
use crate::reminder::metadata::mark_sent;
use crate::reminder::outcome::{DispatchOutcome, RunSummary};
use crate::reminder::resolver::resolve_recipients;
use crate::reminder::stage::{StageConfig, StageKind};
use crate::reminder::store::{DispatchLedger, ReminderStore};
use crate::reminder::window::find_due_events;
use crate::telemetry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Runs the window → guard → resolve → dispatch → mark pipeline for a stage
///
/// Events are processed one after another. An infrastructure error aborts
/// the run; metadata already written for earlier events is kept.
#[derive(Clone)]
pub struct ReminderEngine {
    store: Arc<dyn ReminderStore>,
    guard: IdempotencyGuard,
    dispatch: DispatchLoop,
    stages: Vec<StageConfig>,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        guard: IdempotencyGuard,
        dispatch: DispatchLoop,
        stages: Vec<StageConfig>,
    ) -> Self {
        Self {
            store,
            guard,
            dispatch,
            stages,
        }
    }

    /// Build an engine from the reminder settings
    pub fn from_config(
        config: &RemindersConfig,
        store: Arc<dyn ReminderStore>,
        ledger: Arc<dyn DispatchLedger>,
        adapter: Arc<dyn DeliveryAdapter>,
        pacer: Arc<dyn SendPacer>,
    ) -> Result<Self, ReminderError> {
        config.validate().map_err(ReminderError::InvalidStage)?;
        let timezone = config.timezone().map_err(ReminderError::InvalidStage)?;
        let guard = match config.ledger_mode {
            LedgerMode::Metadata => IdempotencyGuard::metadata(timezone),
            LedgerMode::Record => IdempotencyGuard::record(
                timezone,
                ledger,
                config.claim_timeout().map_err(ReminderError::InvalidStage)?,
            ),
        };

        Ok(Self::new(
            store,
            guard,
            DispatchLoop::new(adapter, pacer),
            config.stage_table(),
        ))
    }

    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn store(&self) -> &Arc<dyn ReminderStore> {
        &self.store
    }

    /// Run one configured stage by kind
    pub async fn run_stage_kind(
        &self,
        kind: StageKind,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, ReminderError> {
        let stage = *self
            .stage(kind)
            .ok_or_else(|| ReminderError::UnknownStage(kind.to_string()))?;
        self.run_stage(&stage, now).await
    }

    /// Run every configured stage in table order; one stage's failure does not stop the others
    pub async fn run_all(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(StageKind, Result<RunSummary, ReminderError>)> {
        let mut results = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            results.push((stage.kind, self.run_stage(stage, now).await));
        }
        results
    }

    #[instrument(skip(self, stage), fields(stage = %stage.kind, ledger_mode = ?self.guard.mode()))]
    pub async fn run_stage(
        &self,
        stage: &StageConfig,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, ReminderError> {
        let started = std::time::Instant::now();
        let mut summary = RunSummary::new(stage.kind, now);

        let events = find_due_events(self.store.as_ref(), stage, now).await?;

        for event in &events {
            let ticket = match self.guard.check(event, stage, now).await? {
                GuardDecision::Proceed(ticket) => ticket,
                GuardDecision::Skip(reason) => {
                    summary.record_skip();
                    telemetry::record_event_skipped(stage.id(), reason.as_str());
                    continue;
                }
            };

            match self.dispatch_pass(event, stage, &ticket, now).await {
                Ok(outcome) => {
                    telemetry::record_dispatch_outcome(stage.id(), &outcome);
                    summary.record_event(event, outcome);
                }
                Err(e) => {
                    error!(event_id = %event.id, error = %e, "Dispatch pass aborted");
                    self.guard.abandon(&ticket).await;
                    return Err(e);
                }
            }
        }

        telemetry::record_run_duration(stage.id(), started.elapsed().as_secs_f64());
        info!(
            matched = events.len(),
            processed = summary.events_processed,
            skipped = summary.events_skipped,
            sent = summary.sent,
            failed = summary.failed,
            "Reminder stage run finished"
        );

        Ok(summary)
    }

    async fn dispatch_pass(
        &self,
        event: &Event,
        stage: &StageConfig,
        ticket: &DispatchTicket,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, ReminderError> {
        let recipients = resolve_recipients(self.store.as_ref(), event).await?;
        let outcome = self.dispatch.run(event, stage, &recipients).await;

        mark_sent(self.store.as_ref(), &ticket.key, stage, now).await?;

        match self.guard.commit(ticket, &outcome, now).await {
            Ok(()) => {}
            // Another run reclaimed the stale claim while this pass was sending.
            // The sends are done and the event is flagged, so the pass still counts.
            Err(LedgerError::VersionConflict { .. }) => {
                warn!(
                    event_id = %event.id,
                    ledger_key = %ticket.key,
                    "Dispatch claim was taken over before commit"
                );
            }
            Err(e) => return Err(e.into()),
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemindersConfig;
    use crate::errors::DeliveryError;
    use crate::models::{EventMetadata, Registration};
    use crate::rate_limit::NoPacing;
    use crate::reminder::memory::InMemoryReminderStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    struct AlwaysOk;

    #[async_trait]
    impl DeliveryAdapter for AlwaysOk {
        async fn send(
            &self,
            _event: &Event,
            _registration: &Registration,
            _stage: &StageConfig,
        ) -> Result<bool, DeliveryError> {
            Ok(true)
        }
    }

    fn engine(store: Arc<InMemoryReminderStore>, mode: LedgerMode) -> ReminderEngine {
        let config = RemindersConfig {
            ledger_mode: mode,
            ..Default::default()
        };
        ReminderEngine::from_config(
            &config,
            store.clone(),
            store,
            Arc::new(AlwaysOk),
            Arc::new(NoPacing),
        )
        .unwrap()
    }

    #[test]
    fn test_from_config_builds_full_stage_table() {
        let store = Arc::new(InMemoryReminderStore::new());
        let engine = engine(store, LedgerMode::Record);
        assert_eq!(engine.stages().len(), 4);
        assert!(engine.stage(StageKind::AtStart).is_some());
    }

    #[test]
    fn test_from_config_rejects_bad_timezone() {
        let store = Arc::new(InMemoryReminderStore::new());
        let config = RemindersConfig {
            ledger_timezone: "Nowhere/Special".to_string(),
            ..Default::default()
        };
        let result = ReminderEngine::from_config(
            &config,
            store.clone(),
            store,
            Arc::new(AlwaysOk),
            Arc::new(NoPacing),
        );
        assert!(matches!(result, Err(ReminderError::InvalidStage(_))));
    }

    #[test]
    fn test_from_config_rejects_out_of_range_values() {
        let store = Arc::new(InMemoryReminderStore::new());

        let mut config = RemindersConfig::default();
        config.stages[0].lead_minutes = 1_000_000_000_000;
        let result = ReminderEngine::from_config(
            &config,
            store.clone(),
            store.clone(),
            Arc::new(AlwaysOk),
            Arc::new(NoPacing),
        );
        assert!(matches!(result, Err(ReminderError::InvalidStage(_))));

        let config = RemindersConfig {
            claim_timeout_seconds: u64::MAX,
            ..Default::default()
        };
        let result = ReminderEngine::from_config(
            &config,
            store.clone(),
            store,
            Arc::new(AlwaysOk),
            Arc::new(NoPacing),
        );
        assert!(matches!(result, Err(ReminderError::InvalidStage(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_stage_is_unknown() {
        let store = Arc::new(InMemoryReminderStore::new());
        let engine = ReminderEngine::new(
            store.clone(),
            IdempotencyGuard::metadata(chrono_tz::UTC),
            DispatchLoop::new(Arc::new(AlwaysOk), Arc::new(NoPacing)),
            vec![StageKind::FarLead.default_config()],
        );
        let result = engine.run_stage_kind(StageKind::AtStart, Utc::now()).await;
        assert!(matches!(result, Err(ReminderError::UnknownStage(_))));
    }

    #[tokio::test]
    async fn test_event_without_recipients_is_processed_and_flagged() {
        let store = Arc::new(InMemoryReminderStore::new());
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let event = Event {
            id: Uuid::new_v4(),
            title: "Empty room".to_string(),
            scheduled_start: now + Duration::minutes(30),
            is_active: true,
            metadata: EventMetadata::new(),
        };
        store.insert_event(event.clone()).await;

        let engine = engine(store.clone(), LedgerMode::Record);
        let summary = engine.run_stage_kind(StageKind::NearLead, now).await.unwrap();
        assert_eq!(summary.events_processed, 1);
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.events[0].outcome.recipients_total, 0);

        let stored = store.event(event.id).await.unwrap();
        assert!(stored.has_flag(&format!("near-lead:{}:2024-06-01", event.id)));
    }

    #[tokio::test]
    async fn test_run_all_covers_each_stage() {
        let store = Arc::new(InMemoryReminderStore::new());
        let engine = engine(store, LedgerMode::Metadata);
        let results = engine.run_all(Utc::now()).await;
        assert_eq!(results.len(), 4);
        for (_, result) in results {
            assert!(result.unwrap().is_empty());
        }
    }
}
