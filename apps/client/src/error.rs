//! Errors surfaced by the schedule service.

use review_core::ScheduleError;
use thiserror::Error;

use crate::store::StoreError;

/// Failures callers must handle. Remote failures are never reported here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("local store: {0}")]
    Local(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
