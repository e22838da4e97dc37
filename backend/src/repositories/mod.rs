//! Storage access behind traits so services can run against Postgres or the
//! in-memory store.

use std::time::Duration;
use thiserror::Error;

pub mod activity_log;
pub mod attendance;
pub mod common;
pub mod memory;
pub mod session;
pub mod student;

pub use activity_log::{ActivityLogRepository, ActivityLogRepositoryTrait};
pub use attendance::{AttendanceRepository, AttendanceRepositoryTrait};
pub use memory::InMemoryRepositories;
pub use session::{SessionRepository, SessionRepositoryTrait};
pub use student::{StudentRepository, StudentRepositoryTrait};

#[cfg(test)]
pub use activity_log::MockActivityLogRepositoryTrait;
#[cfg(test)]
pub use attendance::MockAttendanceRepositoryTrait;
#[cfg(test)]
pub use session::MockSessionRepositoryTrait;
#[cfg(test)]
pub use student::MockStudentRepositoryTrait;

/// Failures shared by every repository.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("storage call exceeded {0:?}")]
    Timeout(Duration),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    /// Unavailable and timed-out calls may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Timeout(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
