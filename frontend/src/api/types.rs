use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Upcoming,
    ActiveTimeIn,
    ActiveTimeOut,
    Ended,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    TimeIn,
    TimeOut,
    OutsideWindow,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanResultStatus {
    Recorded,
    Duplicate,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub session_id: Uuid,
    pub event_id: Uuid,
    pub time_in: Option<DateTime<Utc>>,
    pub time_out: Option<DateTime<Utc>>,
    pub scanned_by: Uuid,
    #[serde(default)]
    pub time_out_scanned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Organizer scan of a student identity code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSubmission {
    pub payload: String,
    pub session_id: Uuid,
    pub organizer_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfScanSubmission {
    pub payload: String,
}

/// Wire body of a scan response (201, 200 and 422 all carry it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub status: ScanResultStatus,
    #[serde(default)]
    pub reason: Option<ScanRejectReason>,
    #[serde(default)]
    pub scan_kind: Option<ScanKind>,
    #[serde(default)]
    pub record: Option<AttendanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub scan_kind: ScanKind,
    pub evaluated_at: DateTime<Utc>,
}

/// What the operator sees after a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    Recorded {
        scan_kind: ScanKind,
        record: AttendanceRecord,
    },
    Duplicate {
        scan_kind: ScanKind,
        record: AttendanceRecord,
    },
    Rejected {
        reason: ScanRejectReason,
        scan_kind: Option<ScanKind>,
    },
}

impl ScanResult {
    pub fn is_recorded(&self) -> bool {
        matches!(self, ScanResult::Recorded { .. })
    }
}

impl TryFrom<ScanResponse> for ScanResult {
    type Error = ApiError;

    fn try_from(body: ScanResponse) -> Result<Self, Self::Error> {
        match (body.status, body.scan_kind, body.record, body.reason) {
            (ScanResultStatus::Recorded, Some(scan_kind), Some(record), _) => {
                Ok(ScanResult::Recorded { scan_kind, record })
            }
            (ScanResultStatus::Duplicate, Some(scan_kind), Some(record), _) => {
                Ok(ScanResult::Duplicate { scan_kind, record })
            }
            (ScanResultStatus::Rejected, scan_kind, _, Some(reason)) => {
                Ok(ScanResult::Rejected { reason, scan_kind })
            }
            (status, ..) => Err(ApiError::Decode(format!(
                "incomplete scan response with status {:?}",
                status
            ))),
        }
    }
}

/// Error body returned by the backend for every non-scan failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("sign-in required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<String>,
    },
    #[error("too many requests, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("service unavailable, please try again")]
    Unavailable,
    #[error("unexpected response {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the same request may succeed later without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Request(_) | ApiError::RateLimited { .. } | ApiError::Unavailable
        )
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Builds the error for a failed response from its status, the
    /// `Retry-After` header and the raw body.
    pub fn from_response(status: u16, retry_after: Option<u64>, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .map(|body| body.error.clone())
            .unwrap_or_else(|| format!("HTTP {}", status));

        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            400 if parsed.as_ref().is_some_and(|b| b.code == "VALIDATION_ERROR") => {
                let errors = parsed
                    .as_ref()
                    .and_then(|b| b.details.as_ref())
                    .and_then(|details| details.get("errors"))
                    .and_then(|errors| serde_json::from_value(errors.clone()).ok())
                    .unwrap_or_default();
                ApiError::Validation { message, errors }
            }
            429 => {
                let from_body = parsed
                    .as_ref()
                    .and_then(|b| b.details.as_ref())
                    .and_then(|details| details.get("retry_after"))
                    .and_then(Value::as_u64);
                ApiError::RateLimited {
                    retry_after: retry_after.or(from_body).unwrap_or(1),
                }
            }
            500..=599 => ApiError::Unavailable,
            _ => ApiError::Http { status, message },
        }
    }
}
