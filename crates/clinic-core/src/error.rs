//! Scheduling errors.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::db::DbError;
use crate::models::AppointmentStatus;

/// Errors returned by the directory, ledger and reminder components.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The backing store failed; never reported as a lookup miss.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Slot conflict for provider {provider_id} on {date} at {time}")]
    SlotConflict {
        provider_id: String,
        date: NaiveDate,
        time: NaiveTime,
    },

    #[error("Invalid status transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<rusqlite::Error> for SchedulerError {
    fn from(e: rusqlite::Error) -> Self {
        SchedulerError::StorageUnavailable(DbError::Sqlite(e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for SchedulerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        SchedulerError::StorageUnavailable(DbError::Poisoned(e.to_string()))
    }
}
