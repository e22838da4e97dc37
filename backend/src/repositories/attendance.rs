//! Attendance record repository.
//!
//! Uniqueness on `(student_id, session_id)` is enforced by the table; the
//! upsert only ever fills in a missing time-out on an existing row.

use async_trait::async_trait;

use super::{StorageError, StorageResult};
use crate::db::connection::DbPool;
use crate::models::attendance::AttendanceRecord;
use crate::types::{SessionId, StudentId};

const SELECT_COLUMNS: &str = "id, student_id, session_id, event_id, time_in, time_out, \
     scanned_by, time_out_scanned_by, created_at, updated_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttendanceRepositoryTrait: Send + Sync {
    /// Find the record for a student in a session, if any.
    async fn find_attendance(
        &self,
        student_id: StudentId,
        session_id: SessionId,
    ) -> StorageResult<Option<AttendanceRecord>>;

    /// Insert a new record, or stamp the time-out on the existing one.
    ///
    /// Returns `None` when the row already exists and the write does not
    /// apply to it (a second time-in, or a time-out on a row that already
    /// has one or lacks a time-in).
    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> StorageResult<Option<AttendanceRecord>>;

    /// Records for a session ordered by time-in.
    async fn list_for_session(
        &self,
        session_id: SessionId,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<AttendanceRecord>>;

    async fn count_for_session(&self, session_id: SessionId) -> StorageResult<i64>;
}

#[derive(Debug, Clone)]
pub struct AttendanceRepository {
    pool: DbPool,
}

impl AttendanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceRepositoryTrait for AttendanceRepository {
    async fn find_attendance(
        &self,
        student_id: StudentId,
        session_id: SessionId,
    ) -> StorageResult<Option<AttendanceRecord>> {
        let query = format!(
            "SELECT {} FROM attendance_records WHERE student_id = $1 AND session_id = $2",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttendanceRecord>(&query)
            .bind(student_id)
            .bind(session_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row)
    }

    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> StorageResult<Option<AttendanceRecord>> {
        let query = format!(
            "INSERT INTO attendance_records \
             (id, student_id, session_id, event_id, time_in, time_out, scanned_by, \
              time_out_scanned_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (student_id, session_id) DO UPDATE SET \
                 time_out = EXCLUDED.time_out, \
                 time_out_scanned_by = EXCLUDED.time_out_scanned_by, \
                 updated_at = EXCLUDED.updated_at \
             WHERE attendance_records.time_out IS NULL \
               AND attendance_records.time_in IS NOT NULL \
               AND EXCLUDED.time_out IS NOT NULL \
             RETURNING {}",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttendanceRecord>(&query)
            .bind(record.id)
            .bind(record.student_id)
            .bind(record.session_id)
            .bind(record.event_id)
            .bind(record.time_in)
            .bind(record.time_out)
            .bind(record.scanned_by)
            .bind(record.time_out_scanned_by)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row)
    }

    async fn list_for_session(
        &self,
        session_id: SessionId,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<AttendanceRecord>> {
        let query = format!(
            "SELECT {} FROM attendance_records WHERE session_id = $1 \
             ORDER BY time_in ASC NULLS LAST, id ASC LIMIT $2 OFFSET $3",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttendanceRecord>(&query)
            .bind(session_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_for_session(&self, session_id: SessionId) -> StorageResult<i64> {
        let total =
            sqlx::query_scalar("SELECT COUNT(*) FROM attendance_records WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&*self.pool)
                .await?;
        Ok(total)
    }
}
