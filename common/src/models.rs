use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Event Models
// ============================================================================

/// Free-form JSON metadata attached to an event.
///
/// Holds the per-day ledger keys and the audit timestamps written after each
/// dispatch pass. Keys are merged or overwritten, never removed.
pub type EventMetadata = Map<String, Value>;

/// A scheduled live session that reminders are sent for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub scheduled_start: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Returns true when `metadata[key]` holds a truthy value
    pub fn has_flag(&self, key: &str) -> bool {
        self.metadata.get(key).map(is_truthy).unwrap_or(false)
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// An attendee's registration for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Dispatch Ledger Models
// ============================================================================

/// Status of one (event, stage, date) dispatch record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    Pending,
    Dispatching,
    Sent,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Pending => "PENDING",
            DispatchStatus::Dispatching => "DISPATCHING",
            DispatchStatus::Sent => "SENT",
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DispatchStatus::Pending),
            "DISPATCHING" => Ok(DispatchStatus::Dispatching),
            "SENT" => Ok(DispatchStatus::Sent),
            other => Err(format!("unknown dispatch status '{}'", other)),
        }
    }
}

/// Identity of a dispatch record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchKey {
    pub event_id: Uuid,
    pub stage_id: String,
    pub dispatch_date: NaiveDate,
}

impl DispatchKey {
    pub fn new(event_id: Uuid, stage_id: impl Into<String>, dispatch_date: NaiveDate) -> Self {
        Self {
            event_id,
            stage_id: stage_id.into(),
            dispatch_date,
        }
    }

    /// The `stage:event:date` ledger key also written into event metadata
    pub fn ledger_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.stage_id,
            self.event_id,
            self.dispatch_date.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ledger_key())
    }
}

/// Persisted dispatch state for one (event, stage, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub key: DispatchKey,
    pub status: DispatchStatus,
    pub attempts: i32,
    /// Optimistic-concurrency token, bumped on every transition
    pub version: i64,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sent: i32,
    pub failed: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with(metadata: Value) -> Event {
        Event {
            id: Uuid::nil(),
            title: "Intro to Rust".to_string(),
            scheduled_start: Utc::now(),
            is_active: true,
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_truthiness_matches_json_semantics() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("2024-01-01T00:00:00Z")));
        assert!(is_truthy(&json!({"a": 1})));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!([])));
    }

    #[test]
    fn test_event_has_flag() {
        let event = event_with(json!({"far-lead:x:2024-01-01": true, "other": false}));
        assert!(event.has_flag("far-lead:x:2024-01-01"));
        assert!(!event.has_flag("other"));
        assert!(!event.has_flag("missing"));
    }

    #[test]
    fn test_ledger_key_format() {
        let event_id = Uuid::parse_str("6f1c2a4e-9b7d-4c1e-8f3a-2d5b6c7e8f90").unwrap();
        let key = DispatchKey::new(
            event_id,
            "near-lead",
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        );
        assert_eq!(
            key.ledger_key(),
            "near-lead:6f1c2a4e-9b7d-4c1e-8f3a-2d5b6c7e8f90:2024-03-09"
        );
    }

    #[test]
    fn test_dispatch_status_round_trips_through_str() {
        for status in [
            DispatchStatus::Pending,
            DispatchStatus::Dispatching,
            DispatchStatus::Sent,
        ] {
            assert_eq!(status.as_str().parse::<DispatchStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<DispatchStatus>().is_err());
    }
}
