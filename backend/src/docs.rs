#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    handlers::{
        attendance::ActivityQuery, health::HealthResponse, sessions::SessionQrResponse,
        students::StudentRegistrationResponse,
    },
    models::{
        activity_log::{ScanActivity, ScanOutcome},
        attendance::AttendanceRecord,
        event::{CreateEventRequest, Event},
        principal::Role,
        qr_payload::{SessionContext, StudentIdentity},
        scan::{
            OrganizerScanRequest, ScanKind, ScanRejectReason, ScanResponse, ScanResultStatus,
            SelfScanRequest, SessionStatus, SessionStatusResponse,
        },
        session::{CreateSessionRequest, Session, UpdateSessionWindowsRequest},
        student::{RegisterStudentRequest, Student},
        PaginatedResponse, PaginationQuery,
    },
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        scan_attendance_doc,
        self_scan_doc,
        session_status_doc,
        session_qr_doc,
        session_attendance_doc,
        session_attendance_export_doc,
        session_activity_doc,
        update_session_doc,
        deactivate_session_doc,
        create_event_doc,
        create_session_doc,
        register_student_doc,
        health_doc
    ),
    components(
        schemas(
            // scanning
            OrganizerScanRequest,
            SelfScanRequest,
            ScanResponse,
            ScanResultStatus,
            ScanRejectReason,
            ScanKind,
            SessionStatus,
            SessionStatusResponse,
            // payloads
            StudentIdentity,
            SessionContext,
            // events & sessions
            CreateEventRequest,
            Event,
            CreateSessionRequest,
            UpdateSessionWindowsRequest,
            Session,
            SessionQrResponse,
            // attendance
            AttendanceRecord,
            ScanActivity,
            ScanOutcome,
            ActivityQuery,
            PaginationQuery,
            // students
            RegisterStudentRequest,
            Student,
            StudentRegistrationResponse,
            Role,
            HealthResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Attendance", description = "Scanning and attendance records"),
        (name = "Sessions", description = "Session windows, status and QR codes"),
        (name = "Events", description = "Events and their sessions"),
        (name = "Students", description = "Student registration"),
        (name = "Health", description = "Liveness")
    ),
    security(("BearerAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    post,
    path = "/api/attendance/scan",
    request_body = OrganizerScanRequest,
    responses(
        (status = 201, description = "Scan recorded", body = ScanResponse),
        (status = 200, description = "Already recorded", body = ScanResponse),
        (status = 422, description = "Scan rejected", body = ScanResponse),
        (status = 404, description = "Unknown session"),
        (status = 429, description = "Rate limited"),
        (status = 503, description = "Storage unavailable")
    ),
    tag = "Attendance"
)]
fn scan_attendance_doc() {}

#[utoipa::path(
    post,
    path = "/api/attendance/self-scan",
    request_body = SelfScanRequest,
    responses(
        (status = 201, description = "Scan recorded", body = ScanResponse),
        (status = 200, description = "Already recorded", body = ScanResponse),
        (status = 422, description = "Scan rejected", body = ScanResponse)
    ),
    tag = "Attendance"
)]
fn self_scan_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/status",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, body = SessionStatusResponse),
        (status = 404, description = "Unknown session")
    ),
    tag = "Sessions",
    security(())
)]
fn session_status_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/qr",
    params(("id" = String, Path, description = "Session id")),
    responses((status = 200, body = SessionQrResponse)),
    tag = "Sessions"
)]
fn session_qr_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/attendance",
    params(("id" = String, Path, description = "Session id"), PaginationQuery),
    responses((status = 200, body = PaginatedResponse<AttendanceRecord>)),
    tag = "Attendance"
)]
fn session_attendance_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/attendance/export",
    params(("id" = String, Path, description = "Session id")),
    responses((status = 200, description = "CSV export", content_type = "text/csv", body = String)),
    tag = "Attendance"
)]
fn session_attendance_export_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/activity",
    params(("id" = String, Path, description = "Session id"), PaginationQuery, ActivityQuery),
    responses((status = 200, body = PaginatedResponse<ScanActivity>)),
    tag = "Attendance"
)]
fn session_activity_doc() {}

#[utoipa::path(
    put,
    path = "/api/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    request_body = UpdateSessionWindowsRequest,
    responses(
        (status = 200, body = Session),
        (status = 409, description = "Attendance already recorded")
    ),
    tag = "Sessions"
)]
fn update_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/deactivate",
    params(("id" = String, Path, description = "Session id")),
    responses((status = 200, body = Session)),
    tag = "Sessions"
)]
fn deactivate_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/events",
    request_body = CreateEventRequest,
    responses((status = 201, body = Event)),
    tag = "Events"
)]
fn create_event_doc() {}

#[utoipa::path(
    post,
    path = "/api/events/{id}/sessions",
    params(("id" = String, Path, description = "Event id")),
    request_body = CreateSessionRequest,
    responses((status = 201, body = Session)),
    tag = "Events"
)]
fn create_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/students/register",
    request_body = RegisterStudentRequest,
    responses(
        (status = 201, body = StudentRegistrationResponse),
        (status = 409, description = "Student number already registered"),
        (status = 429, description = "Rate limited")
    ),
    tag = "Students",
    security(())
)]
fn register_student_doc() {}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, body = HealthResponse)),
    tag = "Health",
    security(())
)]
fn health_doc() {}
