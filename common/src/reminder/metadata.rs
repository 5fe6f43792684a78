// Writes the ledger flag and audit timestamp back into event metadata

use crate::errors::StorageError;
use crate::models::{DispatchKey, EventMetadata};
use crate::reminder::stage::StageConfig;
use crate::reminder::store::ReminderStore;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{info, instrument};

/// The partial map merged after a completed dispatch pass
pub fn sent_marker(key: &DispatchKey, stage: &StageConfig, now: DateTime<Utc>) -> EventMetadata {
    let mut partial = EventMetadata::new();
    partial.insert(key.ledger_key(), Value::Bool(true));
    partial.insert(
        stage.last_sent_key(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    partial
}

/// Shallow-merge the sent marker into the event's persisted metadata.
///
/// Existing keys are kept; only the ledger key and the stage's
/// `last_sent_at` entry are added or overwritten.
#[instrument(skip(store, stage), fields(ledger_key = %key))]
pub async fn mark_sent(
    store: &dyn ReminderStore,
    key: &DispatchKey,
    stage: &StageConfig,
    now: DateTime<Utc>,
) -> Result<(), StorageError> {
    store
        .merge_event_metadata(key.event_id, sent_marker(key, stage, now))
        .await?;
    info!("Ledger key committed to event metadata");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use crate::reminder::memory::InMemoryReminderStore;
    use crate::reminder::stage::StageKind;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_sent_marker_contents() {
        let stage = StageKind::FarLead.default_config();
        let key = DispatchKey::new(
            Uuid::nil(),
            stage.id(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 10, 0).unwrap();
        let marker = sent_marker(&key, &stage, now);

        assert_eq!(marker.len(), 2);
        assert_eq!(marker.get(&key.ledger_key()), Some(&json!(true)));
        assert_eq!(
            marker.get("far-lead:last_sent_at"),
            Some(&json!("2024-06-01T09:10:00.000Z"))
        );
    }

    #[tokio::test]
    async fn test_mark_sent_preserves_other_keys() {
        let store = InMemoryReminderStore::new();
        let stage = StageKind::NearLead.default_config();
        let mut event = Event {
            id: Uuid::new_v4(),
            title: "Iterators".to_string(),
            scheduled_start: Utc::now(),
            is_active: true,
            metadata: EventMetadata::new(),
        };
        event
            .metadata
            .insert("far-lead:last_sent_at".to_string(), json!("earlier"));
        store.insert_event(event.clone()).await;

        let now = Utc::now();
        let key = DispatchKey::new(event.id, stage.id(), now.date_naive());
        mark_sent(&store, &key, &stage, now).await.unwrap();

        let stored = store.event(event.id).await.unwrap();
        assert!(stored.has_flag(&key.ledger_key()));
        assert_eq!(
            stored.metadata.get("far-lead:last_sent_at"),
            Some(&json!("earlier"))
        );
        assert!(stored.metadata.contains_key("near-lead:last_sent_at"));
    }
}
