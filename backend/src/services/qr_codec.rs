//! Text encoding of the two QR payload shapes.
//!
//! Payloads are unsigned; freshness is bounded by a per-kind staleness
//! ceiling and a small allowance for clocks running ahead.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{Config, MAX_DURATION_SECONDS};
use crate::models::qr_payload::{PayloadKind, QrPayload, SessionContext, StudentIdentity};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON")]
    NotJson,
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has neither studentId nor sessionId")]
    UnknownShape,
    #[error("payload carries both studentId and sessionId")]
    AmbiguousShape,
    #[error("expected a {expected} payload, found a {found} payload")]
    WrongShape {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid field: {0}")]
    InvalidField(String),
    #[error("payload issued {age_seconds}s ago exceeds the {max_age_seconds}s limit")]
    Stale {
        age_seconds: i64,
        max_age_seconds: i64,
    },
    #[error("payload issued {ahead_seconds}s in the future")]
    IssuedInFuture { ahead_seconds: i64 },
    #[error("payload could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

impl PayloadError {
    /// Stable machine-readable reason recorded in the activity log.
    pub fn reason(&self) -> &'static str {
        match self {
            PayloadError::NotJson => "not_json",
            PayloadError::NotAnObject => "not_an_object",
            PayloadError::UnknownShape => "unknown_shape",
            PayloadError::AmbiguousShape => "ambiguous_shape",
            PayloadError::WrongShape { .. } => "wrong_shape",
            PayloadError::InvalidField(_) => "invalid_field",
            PayloadError::Stale { .. } => "stale",
            PayloadError::IssuedInFuture { .. } => "issued_in_future",
            PayloadError::Encode(_) => "encode_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrCodecSettings {
    pub student_max_age: Duration,
    pub session_max_age: Duration,
    pub clock_skew: Duration,
}

impl Default for QrCodecSettings {
    fn default() -> Self {
        Self {
            student_max_age: Duration::seconds(86_400),
            session_max_age: Duration::seconds(300),
            clock_skew: Duration::seconds(60),
        }
    }
}

impl From<&Config> for QrCodecSettings {
    fn from(config: &Config) -> Self {
        Self {
            student_max_age: bounded_seconds(config.qr_student_max_age_seconds),
            session_max_age: bounded_seconds(config.qr_session_max_age_seconds),
            clock_skew: bounded_seconds(config.qr_clock_skew_seconds),
        }
    }
}

fn bounded_seconds(value: i64) -> Duration {
    Duration::seconds(value.clamp(0, MAX_DURATION_SECONDS as i64))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QrPayloadCodec {
    settings: QrCodecSettings,
}

impl QrPayloadCodec {
    pub fn new(settings: QrCodecSettings) -> Self {
        Self { settings }
    }

    pub fn encode_student(&self, identity: &StudentIdentity) -> Result<String, PayloadError> {
        serde_json::to_string(identity).map_err(PayloadError::Encode)
    }

    pub fn encode_session(&self, context: &SessionContext) -> Result<String, PayloadError> {
        serde_json::to_string(context).map_err(PayloadError::Encode)
    }

    /// Decode either payload shape, checking freshness against `now`.
    pub fn decode(&self, raw: &str, now: DateTime<Utc>) -> Result<QrPayload, PayloadError> {
        let value: Value = serde_json::from_str(raw.trim()).map_err(|_| PayloadError::NotJson)?;
        let Value::Object(object) = value else {
            return Err(PayloadError::NotAnObject);
        };

        let payload = match detect_shape(&object)? {
            PayloadKind::Student => {
                let identity: StudentIdentity = parse_fields(object)?;
                require_text("studentIdNumber", &identity.student_id_number)?;
                require_text("firstName", &identity.first_name)?;
                require_text("lastName", &identity.last_name)?;
                QrPayload::Student(identity)
            }
            PayloadKind::Session => {
                let context: SessionContext = parse_fields(object)?;
                require_text("eventName", &context.event_name)?;
                require_text("sessionName", &context.session_name)?;
                if context.start_time >= context.end_time {
                    return Err(PayloadError::InvalidField(
                        "startTime must precede endTime".to_string(),
                    ));
                }
                QrPayload::Session(context)
            }
        };

        self.check_freshness(&payload, now)?;
        Ok(payload)
    }

    pub fn decode_student(
        &self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<StudentIdentity, PayloadError> {
        match self.decode(raw, now)? {
            QrPayload::Student(identity) => Ok(identity),
            other => Err(PayloadError::WrongShape {
                expected: PayloadKind::Student.as_str(),
                found: other.kind().as_str(),
            }),
        }
    }

    pub fn decode_session(
        &self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionContext, PayloadError> {
        match self.decode(raw, now)? {
            QrPayload::Session(context) => Ok(context),
            other => Err(PayloadError::WrongShape {
                expected: PayloadKind::Session.as_str(),
                found: other.kind().as_str(),
            }),
        }
    }

    fn check_freshness(&self, payload: &QrPayload, now: DateTime<Utc>) -> Result<(), PayloadError> {
        let issued_at = payload.issued_at();
        let ahead = issued_at - now;
        if ahead > self.settings.clock_skew {
            return Err(PayloadError::IssuedInFuture {
                ahead_seconds: ahead.num_seconds(),
            });
        }

        let max_age = match payload.kind() {
            PayloadKind::Student => self.settings.student_max_age,
            PayloadKind::Session => self.settings.session_max_age,
        };
        let age = now - issued_at;
        if age > max_age {
            return Err(PayloadError::Stale {
                age_seconds: age.num_seconds(),
                max_age_seconds: max_age.num_seconds(),
            });
        }
        Ok(())
    }
}

fn detect_shape(object: &Map<String, Value>) -> Result<PayloadKind, PayloadError> {
    match (object.contains_key("studentId"), object.contains_key("sessionId")) {
        (true, false) => Ok(PayloadKind::Student),
        (false, true) => Ok(PayloadKind::Session),
        (true, true) => Err(PayloadError::AmbiguousShape),
        (false, false) => Err(PayloadError::UnknownShape),
    }
}

fn parse_fields<T: serde::de::DeserializeOwned>(
    object: Map<String, Value>,
) -> Result<T, PayloadError> {
    serde_json::from_value(Value::Object(object))
        .map_err(|err| PayloadError::InvalidField(err.to_string()))
}

fn require_text(field: &str, value: &str) -> Result<(), PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::InvalidField(format!("{} must not be empty", field)));
    }
    Ok(())
}
