// Event repository: window queries and metadata merges

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Event, EventMetadata};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// Repository for event-related database operations
#[derive(Clone)]
pub struct EventRepository {
    pool: DbPool,
}

fn event_from_row(row: &PgRow) -> Result<Event, DatabaseError> {
    let metadata = match row.try_get::<Value, _>("metadata")? {
        Value::Object(map) => map,
        Value::Null => EventMetadata::new(),
        other => {
            return Err(DatabaseError::QueryFailed(format!(
                "Event metadata is not a JSON object: {}",
                other
            )))
        }
    };

    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        scheduled_start: row.try_get("scheduled_start")?,
        is_active: row.try_get("is_active")?,
        metadata,
    })
}

impl EventRepository {
    /// Create a new EventRepository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find events starting inside `[start, end]`, ordered by start time
    #[instrument(skip(self))]
    pub async fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        active_only: bool,
    ) -> Result<Vec<Event>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, scheduled_start, is_active, metadata
            FROM events
            WHERE scheduled_start >= $1
              AND scheduled_start <= $2
              AND ($3 = false OR is_active = true)
            ORDER BY scheduled_start ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(active_only)
        .fetch_all(self.pool.pool())
        .await?;

        let events = rows
            .iter()
            .map(event_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = events.len(), "Found events in range");
        Ok(events)
    }

    /// Find an event by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, scheduled_start, is_active, metadata
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    /// Shallow-merge `partial` into the stored metadata in a single statement
    #[instrument(skip(self, partial), fields(keys = partial.len()))]
    pub async fn merge_metadata(
        &self,
        id: Uuid,
        partial: EventMetadata,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET metadata = COALESCE(metadata, '{}'::jsonb) || $2::jsonb,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Value::Object(partial))
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("event {}", id)));
        }

        tracing::debug!(event_id = %id, "Event metadata merged");
        Ok(())
    }

    /// Insert an event (used by seeding tools and tests)
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn create(&self, event: &Event) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO events (id, title, scheduled_start, is_active, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(event.scheduled_start)
        .bind(event.is_active)
        .bind(Value::Object(event.metadata.clone()))
        .execute(self.pool.pool())
        .await?;

        tracing::info!(event_id = %event.id, title = %event.title, "Event created");
        Ok(())
    }
}
