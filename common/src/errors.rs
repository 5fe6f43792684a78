// Error handling framework

use thiserror::Error;

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Storage errors surfaced by reminder store implementations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

/// Dispatch ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Stale ledger version for {key}: expected {expected}")]
    VersionConflict { key: String, expected: i64 },

    #[error("Invalid ledger status: {0}")]
    InvalidStatus(String),
}

/// Errors raised by a delivery adapter for a single recipient
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Delivery client configuration error: {0}")]
    Configuration(String),
}

/// Authentication errors at the trigger boundary
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Invalid Authorization header format")]
    MalformedHeader,

    #[error("Bearer token does not match the configured secret")]
    InvalidToken,
}

/// Errors that abort a reminder run
#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Unknown reminder stage: {0}")]
    UnknownStage(String),

    #[error("Invalid stage configuration: {0}")]
    InvalidStage(String),

    #[error("Store operation failed: {0}")]
    Store(#[from] StorageError),

    #[error("Dispatch ledger operation failed: {0}")]
    Ledger(#[from] LedgerError),
}

impl ReminderError {
    /// Short machine-readable category, used as the `error` field of failure responses
    pub fn category(&self) -> &'static str {
        match self {
            ReminderError::UnknownStage(_) => "unknown_stage",
            ReminderError::InvalidStage(_) => "invalid_stage",
            ReminderError::Store(_) => "store_error",
            ReminderError::Ledger(_) => "ledger_error",
        }
    }
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // Check for specific database error codes
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            sqlx::Error::Migrate(e) => DatabaseError::MigrationFailed(e.to_string()),
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(DatabaseError::from(err).to_string())
    }
}

impl From<DatabaseError> for StorageError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => StorageError::NotFound(what),
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::RequestFailed(err.to_string())
    }
}
