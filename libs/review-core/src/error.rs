//! Error types for review-core.

use thiserror::Error;

/// Result type alias using ScheduleError.
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Programmer errors in scheduling input.
///
/// I/O and consistency problems never show up here; they are recovered by
/// the stores and the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid category value: {0}")]
    InvalidCategory(i64),

    #[error("negative repetition count: {0}")]
    NegativeRepetitionCount(i64),

    #[error("next review precedes last review for {0}")]
    InconsistentSchedule(String),
}
