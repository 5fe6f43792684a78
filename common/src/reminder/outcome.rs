// Per-event and per-run dispatch accounting

use crate::models::Event;
use crate::reminder::stage::StageKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Counts for one dispatch pass over an event's recipients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub recipients_total: usize,
    pub sent: usize,
    pub failed: usize,
}

impl DispatchOutcome {
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }
}

/// One event's line in a run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventReport {
    pub event_id: Uuid,
    pub title: String,
    pub scheduled_start: DateTime<Utc>,
    pub outcome: DispatchOutcome,
}

/// Aggregated result of one stage invocation. Returned to the caller, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub stage: StageKind,
    pub started_at: DateTime<Utc>,
    /// Events a dispatch pass ran for; guard skips are not counted
    pub events_processed: usize,
    pub events_skipped: usize,
    pub sent: usize,
    pub failed: usize,
    pub events: Vec<EventReport>,
}

impl RunSummary {
    pub fn new(stage: StageKind, started_at: DateTime<Utc>) -> Self {
        Self {
            stage,
            started_at,
            events_processed: 0,
            events_skipped: 0,
            sent: 0,
            failed: 0,
            events: Vec::new(),
        }
    }

    /// Fold a completed dispatch pass into the totals
    pub fn record_event(&mut self, event: &Event, outcome: DispatchOutcome) {
        self.events_processed += 1;
        self.sent += outcome.sent;
        self.failed += outcome.failed;
        self.events.push(EventReport {
            event_id: event.id,
            title: event.title.clone(),
            scheduled_start: event.scheduled_start,
            outcome,
        });
    }

    pub fn record_skip(&mut self) {
        self.events_skipped += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.events_processed == 0
    }
}
