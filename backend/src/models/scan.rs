use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::attendance::AttendanceRecord;
use crate::models::qr_payload::QrPayload;
use crate::types::{OrganizerId, PrincipalId, SessionId};

/// Where an instant falls relative to a session's windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Upcoming,
    ActiveTimeIn,
    ActiveTimeOut,
    Ended,
    Inactive,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Upcoming => "upcoming",
            SessionStatus::ActiveTimeIn => "active_time_in",
            SessionStatus::ActiveTimeOut => "active_time_out",
            SessionStatus::Ended => "ended",
            SessionStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    TimeIn,
    TimeOut,
    OutsideWindow,
    Invalid,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::TimeIn => "time_in",
            ScanKind::TimeOut => "time_out",
            ScanKind::OutsideWindow => "outside_window",
            ScanKind::Invalid => "invalid",
        }
    }
}

impl From<SessionStatus> for ScanKind {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::ActiveTimeIn => ScanKind::TimeIn,
            SessionStatus::ActiveTimeOut => ScanKind::TimeOut,
            SessionStatus::Inactive => ScanKind::Invalid,
            SessionStatus::Upcoming | SessionStatus::Ended => ScanKind::OutsideWindow,
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Classification {
    pub status: SessionStatus,
    pub scan_kind: ScanKind,
}

impl From<SessionStatus> for Classification {
    fn from(status: SessionStatus) -> Self {
        Self {
            status,
            scan_kind: status.into(),
        }
    }
}

/// A decoded scan as received by the server. Never persisted as-is.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub payload: QrPayload,
    /// Raw scanned text, kept only long enough to compute its digest.
    pub raw: String,
    pub received_at: DateTime<Utc>,
    pub requester: PrincipalId,
    pub ip: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Organizer scan of a student identity code.
pub struct OrganizerScanRequest {
    #[validate(length(min = 1, max = 4096, message = "payload must be 1-4096 characters"))]
    pub payload: String,
    pub session_id: SessionId,
    pub organizer_id: OrganizerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Student self-scan of a session context code.
pub struct SelfScanRequest {
    #[validate(length(min = 1, max = 4096, message = "payload must be 1-4096 characters"))]
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanResultStatus {
    Recorded,
    Duplicate,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanRejectReason {
    InvalidPayload,
    UnknownStudent,
    SessionMismatch,
    OutsideWindow,
    InvalidSession,
    MissingTimeIn,
    WindowIntegrity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScanResponse {
    pub status: ScanResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ScanRejectReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_kind: Option<ScanKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
}

impl ScanResponse {
    pub fn recorded(scan_kind: ScanKind, record: AttendanceRecord) -> Self {
        Self {
            status: ScanResultStatus::Recorded,
            reason: None,
            scan_kind: Some(scan_kind),
            record: Some(record),
        }
    }

    pub fn duplicate(scan_kind: ScanKind, record: AttendanceRecord) -> Self {
        Self {
            status: ScanResultStatus::Duplicate,
            reason: None,
            scan_kind: Some(scan_kind),
            record: Some(record),
        }
    }

    pub fn rejected(reason: ScanRejectReason, scan_kind: Option<ScanKind>) -> Self {
        Self {
            status: ScanResultStatus::Rejected,
            reason: Some(reason),
            scan_kind,
            record: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionStatusResponse {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub scan_kind: ScanKind,
    pub evaluated_at: DateTime<Utc>,
}
