//! The two scan flows exposed over HTTP.
//!
//! Organizers scan a student's identity code against a session they run;
//! students scan a session's context code themselves. Both end in the
//! [`AttendanceRecorder`] and leave one activity-log row per attempt.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::AppError;
use crate::models::{
    activity_log::ScanOutcome,
    principal::Principal,
    qr_payload::QrPayload,
    scan::{
        Classification, OrganizerScanRequest, ScanKind, ScanRejectReason, ScanRequest,
        ScanResponse, SelfScanRequest, SessionStatus,
    },
    session::Session,
};
use crate::repositories::{
    common::with_timeout, SessionRepositoryTrait, StorageError, StudentRepositoryTrait,
};
use crate::services::{
    activity_log::{ActivityLogService, ScanActivityEntry},
    attendance_recorder::{AttendanceRecorder, RecordError},
    qr_codec::QrPayloadCodec,
    session_window::SessionWindowClassifier,
};
use crate::types::{OrganizerId, SessionId, StudentId};

/// Failures that end a scan without a scan result body.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StorageError> for ScanError {
    fn from(err: StorageError) -> Self {
        ScanError::StorageUnavailable(err.to_string())
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::SessionNotFound(_) => AppError::NotFound("Session not found".to_string()),
            ScanError::Forbidden(msg) => AppError::Forbidden(msg.to_string()),
            ScanError::StorageUnavailable(detail) => AppError::ServiceUnavailable(detail),
        }
    }
}

/// Who sent the scan and from where.
#[derive(Debug, Clone)]
pub struct ScanOrigin {
    pub principal: Principal,
    pub ip: Option<String>,
    pub request_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ScanService {
    sessions: Arc<dyn SessionRepositoryTrait>,
    students: Arc<dyn StudentRepositoryTrait>,
    recorder: Arc<AttendanceRecorder>,
    activity: ActivityLogService,
    codec: QrPayloadCodec,
    classifier: SessionWindowClassifier,
    timeout: Duration,
}

impl ScanService {
    pub fn new(
        sessions: Arc<dyn SessionRepositoryTrait>,
        students: Arc<dyn StudentRepositoryTrait>,
        recorder: Arc<AttendanceRecorder>,
        activity: ActivityLogService,
        codec: QrPayloadCodec,
        classifier: SessionWindowClassifier,
        timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            students,
            recorder,
            activity,
            codec,
            classifier,
            timeout,
        }
    }

    /// Organizer scan of a student identity code.
    pub async fn scan_student(
        &self,
        origin: ScanOrigin,
        request: OrganizerScanRequest,
    ) -> Result<ScanResponse, ScanError> {
        let now = origin.received_at;
        let identity = match self.codec.decode_student(&request.payload, now) {
            Ok(identity) => identity,
            Err(err) => {
                tracing::debug!(reason = err.reason(), error = %err, "Rejected student payload");
                self.log_unparsed(&origin, &request.payload, Some(request.session_id), err.reason())
                    .await;
                return Ok(ScanResponse::rejected(
                    ScanRejectReason::InvalidPayload,
                    Some(ScanKind::Invalid),
                ));
            }
        };
        let student_id = identity.student_id;
        let student_id_number = identity.student_id_number.clone();
        let scan = ScanRequest {
            payload: QrPayload::Student(identity),
            raw: request.payload,
            received_at: now,
            requester: origin.principal.id,
            ip: origin.ip,
            request_id: origin.request_id,
        };

        let session = self.load_session(&scan, request.session_id, Some(student_id)).await?;

        let known = self
            .lookup(&scan, Some(session.id), Some(student_id), self.students.find_student(student_id))
            .await?;
        if !known.is_some_and(|student| student.student_id_number == student_id_number) {
            self.log(
                &scan,
                Some(session.id),
                None,
                ScanOutcome::InvalidPayload {
                    reason: "unknown_student".to_string(),
                },
            )
            .await;
            return Ok(ScanResponse::rejected(
                ScanRejectReason::UnknownStudent,
                Some(ScanKind::Invalid),
            ));
        }

        self.classify_and_record(&scan, &session, student_id, request.organizer_id)
            .await
    }

    /// Student self-scan of a session context code.
    pub async fn self_scan(
        &self,
        origin: ScanOrigin,
        request: SelfScanRequest,
    ) -> Result<ScanResponse, ScanError> {
        let student_id = origin
            .principal
            .student_id()
            .ok_or(ScanError::Forbidden("Only students can self-scan"))?;
        let now = origin.received_at;

        let context = match self.codec.decode_session(&request.payload, now) {
            Ok(context) => context,
            Err(err) => {
                tracing::debug!(reason = err.reason(), error = %err, "Rejected session payload");
                self.log_unparsed(&origin, &request.payload, None, err.reason())
                    .await;
                return Ok(ScanResponse::rejected(
                    ScanRejectReason::InvalidPayload,
                    Some(ScanKind::Invalid),
                ));
            }
        };
        let session_id = context.session_id;
        let event_id = context.event_id;
        let organizer_id = context.organizer_id;
        let scan = ScanRequest {
            payload: QrPayload::Session(context),
            raw: request.payload,
            received_at: now,
            requester: origin.principal.id,
            ip: origin.ip,
            request_id: origin.request_id,
        };

        let session = self.load_session(&scan, session_id, Some(student_id)).await?;
        if session.event_id != event_id {
            self.log(
                &scan,
                Some(session.id),
                Some(student_id),
                ScanOutcome::InvalidPayload {
                    reason: "session_mismatch".to_string(),
                },
            )
            .await;
            return Ok(ScanResponse::rejected(
                ScanRejectReason::SessionMismatch,
                Some(ScanKind::Invalid),
            ));
        }

        let known = self
            .lookup(&scan, Some(session.id), Some(student_id), self.students.find_student(student_id))
            .await?;
        if known.is_none() {
            self.log(
                &scan,
                Some(session.id),
                None,
                ScanOutcome::InvalidPayload {
                    reason: "unknown_student".to_string(),
                },
            )
            .await;
            return Ok(ScanResponse::rejected(
                ScanRejectReason::UnknownStudent,
                Some(ScanKind::Invalid),
            ));
        }

        self.classify_and_record(&scan, &session, student_id, organizer_id)
            .await
    }

    async fn load_session(
        &self,
        scan: &ScanRequest,
        session_id: SessionId,
        student_id: Option<StudentId>,
    ) -> Result<Session, ScanError> {
        let session = self
            .lookup(scan, Some(session_id), student_id, self.sessions.find_session(session_id))
            .await?;
        match session {
            Some(session) => Ok(session),
            None => {
                self.log(
                    scan,
                    Some(session_id),
                    student_id,
                    ScanOutcome::InvalidSession {
                        status: SessionStatus::Inactive,
                    },
                )
                .await;
                Err(ScanError::SessionNotFound(session_id))
            }
        }
    }

    async fn classify_and_record(
        &self,
        scan: &ScanRequest,
        session: &Session,
        student_id: StudentId,
        organizer_id: OrganizerId,
    ) -> Result<ScanResponse, ScanError> {
        let event = self
            .lookup(
                scan,
                Some(session.id),
                Some(student_id),
                self.sessions.find_event(session.event_id),
            )
            .await?;
        let classification = match event {
            Some(event) => self.classifier.classify(session, &event, scan.received_at),
            None => {
                tracing::warn!(
                    session_id = %session.id,
                    event_id = %session.event_id,
                    "Session references a missing event; treating as inactive"
                );
                Classification::from(SessionStatus::Inactive)
            }
        };

        let result = self
            .recorder
            .record(
                student_id,
                session.id,
                classification.scan_kind,
                organizer_id,
                scan.received_at,
            )
            .await;
        let (outcome, response) = match result {
            Ok(record) => (
                ScanOutcome::Recorded {
                    scan_kind: classification.scan_kind,
                    record_id: record.id,
                },
                ScanResponse::recorded(classification.scan_kind, record),
            ),
            Err(err) => match self.rejection(classification, err) {
                Ok(pair) => pair,
                Err(err) => {
                    self.log(scan, Some(session.id), Some(student_id), ScanOutcome::StorageUnavailable)
                        .await;
                    return Err(err);
                }
            },
        };

        self.log(scan, Some(session.id), Some(student_id), outcome)
            .await;
        Ok(response)
    }

    fn rejection(
        &self,
        classification: Classification,
        err: RecordError,
    ) -> Result<(ScanOutcome, ScanResponse), ScanError> {
        let kind = classification.scan_kind;
        let pair = match err {
            RecordError::OutsideWindow => (
                ScanOutcome::OutsideWindow {
                    status: classification.status,
                },
                ScanResponse::rejected(ScanRejectReason::OutsideWindow, Some(kind)),
            ),
            RecordError::InvalidSession | RecordError::SessionNotFound => (
                ScanOutcome::InvalidSession {
                    status: classification.status,
                },
                ScanResponse::rejected(ScanRejectReason::InvalidSession, Some(kind)),
            ),
            RecordError::DuplicateScan { existing } => (
                ScanOutcome::Duplicate {
                    scan_kind: kind,
                    record_id: existing.id,
                },
                ScanResponse::duplicate(kind, *existing),
            ),
            RecordError::MissingTimeIn => (
                ScanOutcome::MissingTimeIn,
                ScanResponse::rejected(ScanRejectReason::MissingTimeIn, Some(kind)),
            ),
            RecordError::WindowIntegrity { record } => (
                ScanOutcome::WindowIntegrity {
                    record_id: record.id,
                },
                ScanResponse::rejected(ScanRejectReason::WindowIntegrity, Some(kind)),
            ),
            RecordError::StorageUnavailable(err) => return Err(err.into()),
        };
        Ok(pair)
    }

    /// Runs a bounded lookup; a storage failure is logged as an outcome
    /// before it is returned.
    async fn lookup<T, F>(
        &self,
        scan: &ScanRequest,
        session_id: Option<SessionId>,
        student_id: Option<StudentId>,
        call: F,
    ) -> Result<T, ScanError>
    where
        F: std::future::Future<Output = Result<T, StorageError>>,
    {
        match with_timeout(self.timeout, call).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.log(scan, session_id, student_id, ScanOutcome::StorageUnavailable)
                    .await;
                Err(err.into())
            }
        }
    }

    async fn log_unparsed(
        &self,
        origin: &ScanOrigin,
        raw: &str,
        session_id: Option<SessionId>,
        reason: &str,
    ) {
        self.write_activity(ScanActivityEntry {
            occurred_at: origin.received_at,
            actor_id: Some(origin.principal.id),
            session_id,
            student_id: None,
            raw_payload: raw.to_string(),
            ip: origin.ip.clone(),
            request_id: origin.request_id.clone(),
            outcome: ScanOutcome::InvalidPayload {
                reason: reason.to_string(),
            },
        })
        .await;
    }

    async fn log(
        &self,
        scan: &ScanRequest,
        session_id: Option<SessionId>,
        student_id: Option<StudentId>,
        outcome: ScanOutcome,
    ) {
        self.write_activity(ScanActivityEntry {
            occurred_at: scan.received_at,
            actor_id: Some(scan.requester),
            session_id,
            student_id,
            raw_payload: scan.raw.clone(),
            ip: scan.ip.clone(),
            request_id: scan.request_id.clone(),
            outcome,
        })
        .await;
    }

    async fn write_activity(&self, entry: ScanActivityEntry) {
        let kind = entry.outcome.kind();
        tracing::info!(
            outcome = kind,
            session_id = ?entry.session_id,
            student_id = ?entry.student_id,
            request_id = ?entry.request_id,
            "Scan processed"
        );
        if let Err(err) = with_timeout(self.timeout, self.activity.record_scan(entry)).await {
            tracing::error!(error = %err, outcome = kind, "Failed to write scan activity log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        event::Event,
        principal::Role,
        scan::ScanResultStatus,
        session::SessionWindows,
        student::Student,
    };
    use crate::repositories::{
        ActivityLogRepositoryTrait, AttendanceRepositoryTrait, InMemoryRepositories,
        MockSessionRepositoryTrait,
    };
    use crate::repositories::activity_log::ActivityLogFilters;
    use crate::services::qr_codec::QrCodecSettings;
    use crate::types::PrincipalId;
    use chrono::{NaiveDate, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, hour, minute, 0).unwrap()
    }

    struct Fixture {
        repos: InMemoryRepositories,
        service: ScanService,
        session: Session,
        student: Student,
        organizer: PrincipalId,
    }

    fn service_over(repos: &InMemoryRepositories, sessions: Arc<dyn SessionRepositoryTrait>) -> ScanService {
        let timeout = Duration::from_secs(1);
        let recorder = AttendanceRecorder::new(sessions.clone(), Arc::new(repos.clone()), timeout);
        ScanService::new(
            sessions,
            Arc::new(repos.clone()),
            Arc::new(recorder),
            ActivityLogService::new(Arc::new(repos.clone())),
            QrPayloadCodec::new(QrCodecSettings::default()),
            SessionWindowClassifier::new(chrono_tz::UTC),
            timeout,
        )
    }

    async fn fixture() -> Fixture {
        let repos = InMemoryRepositories::new();
        let organizer = PrincipalId::new();
        let day = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let event = Event::new("Orientation".into(), day, day, organizer, at(0, 0));
        let windows =
            SessionWindows::new(at(9, 0), at(9, 30), Some(at(16, 0)), Some(at(16, 30))).unwrap();
        let session = Session::new(event.id, "Main hall".into(), None, windows, organizer, at(0, 0));
        repos.create_event(&event).await.unwrap();
        repos.create_session(&session).await.unwrap();

        let student = Student {
            id: StudentId::new(),
            student_id_number: "2021-00042".into(),
            first_name: "Ana".into(),
            last_name: "Reyes".into(),
            program_name: None,
            year: Some(2),
            created_at: at(0, 0),
        };
        repos.create_student(&student).await.unwrap();

        let service = service_over(&repos, Arc::new(repos.clone()));
        Fixture {
            repos,
            service,
            session,
            student,
            organizer,
        }
    }

    fn organizer_origin(organizer: PrincipalId, now: DateTime<Utc>) -> ScanOrigin {
        ScanOrigin {
            principal: Principal {
                id: organizer,
                role: Role::Organizer,
            },
            ip: Some("192.0.2.10".into()),
            request_id: Some("req-1".into()),
            received_at: now,
        }
    }

    fn student_scan(fx: &Fixture, issued_at: DateTime<Utc>) -> OrganizerScanRequest {
        let payload = QrPayloadCodec::default()
            .encode_student(&fx.student.identity(issued_at))
            .unwrap();
        OrganizerScanRequest {
            payload,
            session_id: fx.session.id,
            organizer_id: fx.organizer,
        }
    }

    async fn outcomes(fx: &Fixture) -> Vec<String> {
        let mut logs = ActivityLogRepositoryTrait::list_for_session(
            &fx.repos,
            fx.session.id,
            ActivityLogFilters::default(),
            100,
            0,
        )
        .await
        .unwrap();
        logs.sort_by_key(|log| log.occurred_at);
        logs.iter().map(|log| log.outcome.0.kind().to_string()).collect()
    }

    #[tokio::test]
    async fn organizer_scan_records_time_in_then_duplicate() {
        let fx = fixture().await;

        let first = fx
            .service
            .scan_student(organizer_origin(fx.organizer, at(9, 5)), student_scan(&fx, at(9, 4)))
            .await
            .unwrap();
        assert_eq!(first.status, ScanResultStatus::Recorded);
        assert_eq!(first.scan_kind, Some(ScanKind::TimeIn));

        let second = fx
            .service
            .scan_student(organizer_origin(fx.organizer, at(9, 6)), student_scan(&fx, at(9, 4)))
            .await
            .unwrap();
        assert_eq!(second.status, ScanResultStatus::Duplicate);
        assert_eq!(
            second.record.map(|record| record.id),
            first.record.map(|record| record.id)
        );
        assert_eq!(fx.repos.count_for_session(fx.session.id).await.unwrap(), 1);
        assert_eq!(outcomes(&fx).await, vec!["recorded", "duplicate"]);
    }

    #[tokio::test]
    async fn scan_between_windows_is_rejected_without_write() {
        let fx = fixture().await;
        let response = fx
            .service
            .scan_student(organizer_origin(fx.organizer, at(12, 0)), student_scan(&fx, at(11, 59)))
            .await
            .unwrap();
        assert_eq!(response.status, ScanResultStatus::Rejected);
        assert_eq!(response.reason, Some(ScanRejectReason::OutsideWindow));
        assert_eq!(fx.repos.count_for_session(fx.session.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn garbage_payload_is_logged_by_digest() {
        let fx = fixture().await;
        let request = OrganizerScanRequest {
            payload: "definitely not json".into(),
            session_id: fx.session.id,
            organizer_id: fx.organizer,
        };
        let response = fx
            .service
            .scan_student(organizer_origin(fx.organizer, at(9, 5)), request)
            .await
            .unwrap();
        assert_eq!(response.reason, Some(ScanRejectReason::InvalidPayload));

        let logs = ActivityLogRepositoryTrait::list_for_session(
            &fx.repos,
            fx.session.id,
            ActivityLogFilters::default(),
            10,
            0,
        )
        .await
        .unwrap();
        assert_eq!(logs.len(), 1);
        assert_ne!(logs[0].payload_digest, "definitely not json");
        assert_eq!(
            logs[0].outcome.0,
            ScanOutcome::InvalidPayload {
                reason: "not_json".into()
            }
        );
    }

    #[tokio::test]
    async fn unregistered_student_is_rejected() {
        let fx = fixture().await;
        let mut stranger = fx.student.clone();
        stranger.id = StudentId::new();
        let payload = QrPayloadCodec::default()
            .encode_student(&stranger.identity(at(9, 0)))
            .unwrap();

        let response = fx
            .service
            .scan_student(
                organizer_origin(fx.organizer, at(9, 5)),
                OrganizerScanRequest {
                    payload,
                    session_id: fx.session.id,
                    organizer_id: fx.organizer,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.reason, Some(ScanRejectReason::UnknownStudent));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let fx = fixture().await;
        let mut request = student_scan(&fx, at(9, 4));
        request.session_id = SessionId::new();
        let err = fx
            .service
            .scan_student(organizer_origin(fx.organizer, at(9, 5)), request)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn self_scan_records_against_session_organizer() {
        let fx = fixture().await;
        let context = crate::models::qr_payload::SessionContext {
            session_id: fx.session.id,
            event_id: fx.session.event_id,
            event_name: "Orientation".into(),
            session_name: fx.session.name.clone(),
            start_time: fx.session.time_in_start,
            end_time: at(16, 30),
            location: None,
            organizer_id: fx.organizer,
            issued_at: at(9, 1),
        };
        let payload = QrPayloadCodec::default().encode_session(&context).unwrap();
        let origin = ScanOrigin {
            principal: Principal {
                id: PrincipalId::from_uuid(*fx.student.id.as_uuid()),
                role: Role::Student,
            },
            ip: None,
            request_id: None,
            received_at: at(9, 2),
        };

        let response = fx
            .service
            .self_scan(origin.clone(), SelfScanRequest { payload: payload.clone() })
            .await
            .unwrap();
        assert_eq!(response.status, ScanResultStatus::Recorded);
        let record = response.record.unwrap();
        assert_eq!(record.student_id, fx.student.id);
        assert_eq!(record.scanned_by, fx.organizer);

        let mut mismatched = context.clone();
        mismatched.event_id = crate::types::EventId::new();
        let payload = QrPayloadCodec::default().encode_session(&mismatched).unwrap();
        let response = fx
            .service
            .self_scan(origin, SelfScanRequest { payload })
            .await
            .unwrap();
        assert_eq!(response.reason, Some(ScanRejectReason::SessionMismatch));
    }

    #[tokio::test]
    async fn organizers_cannot_self_scan() {
        let fx = fixture().await;
        let err = fx
            .service
            .self_scan(
                organizer_origin(fx.organizer, at(9, 5)),
                SelfScanRequest {
                    payload: "{}".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Forbidden(_)));
    }

    #[tokio::test]
    async fn storage_outage_surfaces_as_unavailable() {
        let fx = fixture().await;
        let mut sessions = MockSessionRepositoryTrait::new();
        sessions
            .expect_find_session()
            .returning(|_| Err(StorageError::Unavailable(sqlx::Error::PoolTimedOut)));
        let service = service_over(&fx.repos, Arc::new(sessions));

        let err = service
            .scan_student(organizer_origin(fx.organizer, at(9, 5)), student_scan(&fx, at(9, 4)))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::StorageUnavailable(_)));
        assert_eq!(outcomes(&fx).await, vec!["storage_unavailable"]);

        let app_error: AppError = err.into();
        assert!(matches!(app_error, AppError::ServiceUnavailable(_)));
    }
}
