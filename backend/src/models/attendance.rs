use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::{AttendanceRecordId, EventId, OrganizerId, SessionId, StudentId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
/// One row per `(student_id, session_id)`; a time-out scan fills in the
/// existing row.
pub struct AttendanceRecord {
    pub id: AttendanceRecordId,
    pub student_id: StudentId,
    pub session_id: SessionId,
    pub event_id: EventId,
    pub time_in: Option<DateTime<Utc>>,
    pub time_out: Option<DateTime<Utc>>,
    pub scanned_by: OrganizerId,
    pub time_out_scanned_by: Option<OrganizerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn time_in(
        student_id: StudentId,
        session_id: SessionId,
        event_id: EventId,
        scanned_by: OrganizerId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AttendanceRecordId::new(),
            student_id,
            session_id,
            event_id,
            time_in: Some(now),
            time_out: None,
            scanned_by,
            time_out_scanned_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this record with the time-out stamped.
    pub fn with_time_out(&self, scanned_by: OrganizerId, now: DateTime<Utc>) -> Self {
        Self {
            time_out: Some(now),
            time_out_scanned_by: Some(scanned_by),
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.time_in.is_some() && self.time_out.is_some()
    }
}
