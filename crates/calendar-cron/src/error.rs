//! Unified error type for the calendar cron.
//!
//! Not-found is an ordinary kind of this enum rather than a property checked
//! at runtime, so callers branch on it with a plain `match`.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    /// Record does not exist (a normal outcome for event and policy lookups)
    #[error("{0} not found")]
    NotFound(String),

    /// Database connection pool error
    #[error("Database connection error")]
    ConnectionPool(#[source] diesel_async::pooled_connection::deadpool::PoolError),

    /// Database query error
    #[error("Database error: {0}")]
    Database(#[source] diesel::result::Error),

    /// Stored or provider JSON could not be (de)serialized
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote calendar provider rejected or failed a request
    #[error("Calendar provider error: {0}")]
    Provider(String),

    /// Distributed lock backend failed (not the same as contention)
    #[error("Lock error: {0}")]
    Lock(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The cycle ran past its overall deadline
    #[error("Cycle exceeded deadline of {0:?}")]
    Deadline(Duration),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl CronError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        CronError::NotFound(resource.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        CronError::Provider(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        CronError::Config(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CronError::NotFound(_))
    }
}

impl From<diesel::result::Error> for CronError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => CronError::NotFound("Record".to_string()),
            other => CronError::Database(other),
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for CronError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        CronError::ConnectionPool(err)
    }
}

pub type CronResult<T> = Result<T, CronError>;
