//! The two QR payload shapes. Field names are camelCase on the wire because
//! printed codes outlive any one server release.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::{EventId, OrganizerId, SessionId, StudentId};

/// Identity code carried by a student and scanned by an organizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdentity {
    pub student_id: StudentId,
    pub student_id_number: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i16>,
    pub issued_at: DateTime<Utc>,
}

/// Session code displayed by an organizer and scanned by students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: SessionId,
    pub event_id: EventId,
    pub event_name: String,
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub organizer_id: OrganizerId,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPayload {
    Student(StudentIdentity),
    Session(SessionContext),
}

impl QrPayload {
    pub fn issued_at(&self) -> DateTime<Utc> {
        match self {
            QrPayload::Student(identity) => identity.issued_at,
            QrPayload::Session(context) => context.issued_at,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            QrPayload::Student(_) => PayloadKind::Student,
            QrPayload::Session(_) => PayloadKind::Session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Student,
    Session,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Student => "student",
            PayloadKind::Session => "session",
        }
    }
}
