use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;

use crate::models::scan::{ScanKind, SessionStatus};
use crate::types::{ActivityLogId, AttendanceRecordId, PrincipalId, SessionId, StudentId};

/// Result of one scan attempt, one fixed shape per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    Recorded {
        scan_kind: ScanKind,
        record_id: AttendanceRecordId,
    },
    Duplicate {
        scan_kind: ScanKind,
        record_id: AttendanceRecordId,
    },
    MissingTimeIn,
    OutsideWindow {
        status: SessionStatus,
    },
    InvalidSession {
        status: SessionStatus,
    },
    InvalidPayload {
        reason: String,
    },
    WindowIntegrity {
        record_id: AttendanceRecordId,
    },
    StorageUnavailable,
}

impl ScanOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            ScanOutcome::Recorded { .. } => "recorded",
            ScanOutcome::Duplicate { .. } => "duplicate",
            ScanOutcome::MissingTimeIn => "missing_time_in",
            ScanOutcome::OutsideWindow { .. } => "outside_window",
            ScanOutcome::InvalidSession { .. } => "invalid_session",
            ScanOutcome::InvalidPayload { .. } => "invalid_payload",
            ScanOutcome::WindowIntegrity { .. } => "window_integrity",
            ScanOutcome::StorageUnavailable => "storage_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ScanActivity {
    pub id: ActivityLogId,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<PrincipalId>,
    pub session_id: Option<SessionId>,
    pub student_id: Option<StudentId>,
    /// SHA-256 hex of the scanned text; the raw text is never stored.
    pub payload_digest: String,
    pub ip: Option<String>,
    pub request_id: Option<String>,
    #[schema(value_type = ScanOutcome)]
    pub outcome: Json<ScanOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let outcome = ScanOutcome::OutsideWindow {
            status: SessionStatus::Ended,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "outside_window", "status": "ended"}));

        let json = serde_json::to_value(ScanOutcome::MissingTimeIn).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "missing_time_in"}));
    }

    #[test]
    fn outcome_kind_matches_tag() {
        let outcome = ScanOutcome::Recorded {
            scan_kind: ScanKind::TimeIn,
            record_id: AttendanceRecordId::new(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], outcome.kind());
    }
}
