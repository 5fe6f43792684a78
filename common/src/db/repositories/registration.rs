// Registration repository

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::Registration;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// Repository for registration-related database operations
#[derive(Clone)]
pub struct RegistrationRepository {
    pool: DbPool,
}

impl RegistrationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Confirmed registrations of an event in sign-up order
    #[instrument(skip(self))]
    pub async fn find_confirmed_by_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<Registration>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, email, name, confirmed, created_at
            FROM registrations
            WHERE event_id = $1 AND confirmed = true
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(self.pool.pool())
        .await?;

        let mut registrations = Vec::with_capacity(rows.len());
        for row in rows {
            registrations.push(Registration {
                id: row.try_get("id")?,
                event_id: row.try_get("event_id")?,
                email: row.try_get("email")?,
                name: row.try_get("name")?,
                confirmed: row.try_get("confirmed")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok(registrations)
    }

    /// Insert a registration (used by seeding tools and tests)
    #[instrument(skip(self, registration), fields(registration_id = %registration.id))]
    pub async fn create(&self, registration: &Registration) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO registrations (id, event_id, email, name, confirmed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(registration.id)
        .bind(registration.event_id)
        .bind(&registration.email)
        .bind(&registration.name)
        .bind(registration.confirmed)
        .bind(registration.created_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }
}
