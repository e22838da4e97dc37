//! Turns a classified scan into at most one attendance row per
//! `(student, session)`.
//!
//! Uniqueness is left to storage: a write that loses a race comes back as
//! `None` from the upsert and is re-read to decide which conflict it was.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{attendance::AttendanceRecord, scan::ScanKind, session::Session};
use crate::repositories::{
    common::with_timeout, AttendanceRepositoryTrait, SessionRepositoryTrait, StorageError,
};
use crate::types::{OrganizerId, SessionId, StudentId};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("scan is outside the session's windows")]
    OutsideWindow,
    #[error("session is not accepting scans")]
    InvalidSession,
    #[error("attendance already recorded")]
    DuplicateScan { existing: Box<AttendanceRecord> },
    #[error("time-out scanned without a prior time-in")]
    MissingTimeIn,
    #[error("session not found")]
    SessionNotFound,
    #[error("stored time-in no longer falls inside the session's time-in window")]
    WindowIntegrity { record: Box<AttendanceRecord> },
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),
}

impl RecordError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecordError::StorageUnavailable(_))
    }
}

impl From<StorageError> for RecordError {
    fn from(err: StorageError) -> Self {
        RecordError::StorageUnavailable(err)
    }
}

pub struct AttendanceRecorder {
    sessions: Arc<dyn SessionRepositoryTrait>,
    attendance: Arc<dyn AttendanceRepositoryTrait>,
    timeout: Duration,
}

impl AttendanceRecorder {
    pub fn new(
        sessions: Arc<dyn SessionRepositoryTrait>,
        attendance: Arc<dyn AttendanceRepositoryTrait>,
        timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            attendance,
            timeout,
        }
    }

    pub async fn record(
        &self,
        student_id: StudentId,
        session_id: SessionId,
        scan_kind: ScanKind,
        organizer_id: OrganizerId,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, RecordError> {
        match scan_kind {
            ScanKind::OutsideWindow => return Err(RecordError::OutsideWindow),
            ScanKind::Invalid => return Err(RecordError::InvalidSession),
            ScanKind::TimeIn | ScanKind::TimeOut => {}
        }

        let session = with_timeout(self.timeout, self.sessions.find_session(session_id))
            .await?
            .ok_or(RecordError::SessionNotFound)?;
        let existing = with_timeout(
            self.timeout,
            self.attendance.find_attendance(student_id, session_id),
        )
        .await?;

        match scan_kind {
            ScanKind::TimeIn => {
                self.record_time_in(&session, student_id, organizer_id, existing, now)
                    .await
            }
            _ => self.record_time_out(&session, organizer_id, existing, now).await,
        }
    }

    async fn record_time_in(
        &self,
        session: &Session,
        student_id: StudentId,
        organizer_id: OrganizerId,
        existing: Option<AttendanceRecord>,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, RecordError> {
        if let Some(existing) = existing {
            return Err(RecordError::DuplicateScan {
                existing: Box::new(existing),
            });
        }

        let record =
            AttendanceRecord::time_in(student_id, session.id, session.event_id, organizer_id, now);
        match with_timeout(self.timeout, self.attendance.upsert_attendance(&record)).await? {
            Some(saved) => {
                tracing::info!(
                    record_id = %saved.id,
                    student_id = %student_id,
                    session_id = %session.id,
                    "Recorded time-in"
                );
                Ok(saved)
            }
            None => Err(self.resolve_conflict(student_id, session.id).await),
        }
    }

    async fn record_time_out(
        &self,
        session: &Session,
        organizer_id: OrganizerId,
        existing: Option<AttendanceRecord>,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, RecordError> {
        let Some(existing) = existing else {
            return Err(RecordError::MissingTimeIn);
        };
        let Some(time_in) = existing.time_in else {
            return Err(RecordError::MissingTimeIn);
        };
        if existing.time_out.is_some() {
            return Err(RecordError::DuplicateScan {
                existing: Box::new(existing),
            });
        }

        let time_in_matches = session
            .windows()
            .map(|windows| windows.time_in.contains(time_in))
            .unwrap_or(false);
        if !time_in_matches {
            tracing::warn!(
                record_id = %existing.id,
                session_id = %session.id,
                time_in = %time_in,
                "Stored time-in falls outside the session's time-in window; refusing time-out"
            );
            return Err(RecordError::WindowIntegrity {
                record: Box::new(existing),
            });
        }

        let updated = existing.with_time_out(organizer_id, now);
        match with_timeout(self.timeout, self.attendance.upsert_attendance(&updated)).await? {
            Some(saved) => {
                tracing::info!(
                    record_id = %saved.id,
                    student_id = %saved.student_id,
                    session_id = %session.id,
                    "Recorded time-out"
                );
                Ok(saved)
            }
            None => Err(self.resolve_conflict(existing.student_id, session.id).await),
        }
    }

    /// Maps a write that did not apply onto the conflict that caused it.
    async fn resolve_conflict(&self, student_id: StudentId, session_id: SessionId) -> RecordError {
        let current = with_timeout(
            self.timeout,
            self.attendance.find_attendance(student_id, session_id),
        )
        .await;
        match current {
            Ok(Some(record)) if record.time_in.is_some() => RecordError::DuplicateScan {
                existing: Box::new(record),
            },
            Ok(_) => RecordError::MissingTimeIn,
            Err(err) => RecordError::StorageUnavailable(err),
        }
    }
}
