use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use common::errors::ReminderError;
use common::reminder::{EventReport, RunSummary, StageKind};
use serde::Serialize;

use super::ErrorResponse;
use crate::state::AppState;

/// Body of a successful stage run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunResponse {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub stage_type: String,
    pub results: RunResults,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    pub webinars_processed: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub webinars: Vec<WebinarResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebinarResult {
    pub title: String,
    pub date_time: DateTime<Utc>,
    pub registrations: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
}

impl From<&EventReport> for WebinarResult {
    fn from(report: &EventReport) -> Self {
        Self {
            title: report.title.clone(),
            date_time: report.scheduled_start,
            registrations: report.outcome.recipients_total,
            emails_sent: report.outcome.sent,
            emails_failed: report.outcome.failed,
        }
    }
}

impl From<RunSummary> for ReminderRunResponse {
    fn from(summary: RunSummary) -> Self {
        Self {
            success: true,
            timestamp: summary.started_at,
            stage_type: summary.stage.id().to_string(),
            results: RunResults {
                webinars_processed: summary.events_processed,
                emails_sent: summary.sent,
                emails_failed: summary.failed,
                webinars: summary.events.iter().map(WebinarResult::from).collect(),
            },
        }
    }
}

fn unknown_stage(stage: &str) -> ErrorResponse {
    ErrorResponse::new(StatusCode::NOT_FOUND, "Unknown reminder stage")
        .with_details(format!("No reminder stage named '{}'", stage))
}

/// Run one reminder stage
///
/// GET /api/cron/reminders/:stage
#[tracing::instrument(skip(state))]
pub async fn run_stage(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Result<Json<ReminderRunResponse>, ErrorResponse> {
    let kind: StageKind = stage.parse().map_err(|_| unknown_stage(&stage))?;

    match state.engine.run_stage_kind(kind, Utc::now()).await {
        Ok(summary) => {
            tracing::info!(
                stage = %kind,
                processed = summary.events_processed,
                sent = summary.sent,
                failed = summary.failed,
                "Reminder stage completed"
            );
            Ok(Json(ReminderRunResponse::from(summary)))
        }
        Err(ReminderError::UnknownStage(_)) => Err(unknown_stage(&stage)),
        Err(e) => {
            tracing::error!(stage = %kind, error = %e, category = e.category(), "Reminder stage failed");
            Err(
                ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process reminders")
                    .with_details(e.to_string()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::reminder::DispatchOutcome;
    use uuid::Uuid;

    #[test]
    fn test_response_uses_camel_case_keys() {
        let started_at = Utc::now();
        let summary = RunSummary {
            stage: StageKind::FarLead,
            started_at,
            events_processed: 1,
            events_skipped: 0,
            sent: 3,
            failed: 0,
            events: vec![EventReport {
                event_id: Uuid::new_v4(),
                title: "Lifetimes explained".to_string(),
                scheduled_start: started_at,
                outcome: DispatchOutcome {
                    recipients_total: 3,
                    sent: 3,
                    failed: 0,
                },
            }],
        };

        let body = serde_json::to_value(ReminderRunResponse::from(summary)).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["stageType"], "far-lead");
        assert_eq!(body["results"]["webinarsProcessed"], 1);
        assert_eq!(body["results"]["emailsSent"], 3);
        assert_eq!(body["results"]["emailsFailed"], 0);
        assert_eq!(body["results"]["webinars"][0]["title"], "Lifetimes explained");
        assert_eq!(body["results"]["webinars"][0]["registrations"], 3);
        assert!(body["results"]["webinars"][0]["dateTime"].is_string());
    }

    #[test]
    fn test_unknown_stage_error_shape() {
        let err = unknown_stage("tomorrow");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["details"].as_str().unwrap().contains("tomorrow"));
        assert!(body.get("status").is_none());
    }
}
