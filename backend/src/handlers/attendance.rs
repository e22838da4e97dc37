use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::{rate_limit::ClientOrigin, request_id::RequestId},
    models::{
        activity_log::ScanActivity,
        attendance::AttendanceRecord,
        principal::{Principal, Role},
        scan::{OrganizerScanRequest, ScanResponse, ScanResultStatus, SelfScanRequest},
        student::Student,
        PaginatedResponse, PaginationQuery,
    },
    repositories::{activity_log::ActivityLogFilters, common::with_timeout},
    services::scan::ScanOrigin,
    state::AppState,
    types::{SessionId, StudentId},
    utils::csv::attendance_csv,
};

use super::sessions::require_session;

const EXPORT_PAGE_SIZE: i64 = 500;

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct ActivityQuery {
    /// Restrict to one outcome kind (`recorded`, `duplicate`, `missing_time_in`, ...).
    pub outcome: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn scan_status_code(response: &ScanResponse) -> StatusCode {
    match response.status {
        ScanResultStatus::Recorded => StatusCode::CREATED,
        ScanResultStatus::Duplicate => StatusCode::OK,
        ScanResultStatus::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn scan_origin(
    principal: Principal,
    origin: Option<Extension<ClientOrigin>>,
    request_id: Option<Extension<RequestId>>,
) -> ScanOrigin {
    ScanOrigin {
        principal,
        ip: origin.map(|Extension(ClientOrigin(ip))| ip),
        request_id: request_id.map(|Extension(RequestId(id))| id),
        received_at: Utc::now(),
    }
}

pub async fn scan_attendance(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: Option<Extension<ClientOrigin>>,
    request_id: Option<Extension<RequestId>>,
    Json(payload): Json<OrganizerScanRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if principal.role == Role::Organizer && principal.id != payload.organizer_id {
        return Err(AppError::Forbidden(
            "Organizers may only scan under their own id".into(),
        ));
    }

    let response = state
        .scan_service
        .scan_student(scan_origin(principal, origin, request_id), payload)
        .await?;
    Ok((scan_status_code(&response), Json(response)))
}

pub async fn self_scan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    origin: Option<Extension<ClientOrigin>>,
    request_id: Option<Extension<RequestId>>,
    Json(payload): Json<SelfScanRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let response = state
        .scan_service
        .self_scan(scan_origin(principal, origin, request_id), payload)
        .await?;
    Ok((scan_status_code(&response), Json(response)))
}

pub async fn list_session_attendance(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<AttendanceRecord>>, AppError> {
    require_session(&state, session_id).await?;

    let timeout = state.storage_timeout();
    let attendance = &state.repositories.attendance;
    let (limit, offset) = (page.limit(), page.offset());
    let records = with_timeout(
        timeout,
        attendance.list_for_session(session_id, limit, offset),
    )
    .await?;
    let total = with_timeout(timeout, attendance.count_for_session(session_id)).await?;

    Ok(Json(PaginatedResponse::new(records, total, limit, offset)))
}

pub async fn export_session_attendance(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<impl IntoResponse, AppError> {
    require_session(&state, session_id).await?;

    let timeout = state.storage_timeout();
    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = with_timeout(
            timeout,
            state
                .repositories
                .attendance
                .list_for_session(session_id, EXPORT_PAGE_SIZE, offset),
        )
        .await?;
        let fetched = page.len() as i64;
        let ids: Vec<StudentId> = page.iter().map(|record| record.student_id).collect();
        let students: HashMap<StudentId, Student> =
            with_timeout(timeout, state.repositories.students.find_students(&ids))
                .await?
                .into_iter()
                .map(|student| (student.id, student))
                .collect();
        rows.extend(page.into_iter().map(|record| {
            let student = students.get(&record.student_id).cloned();
            (record, student)
        }));
        if fetched < EXPORT_PAGE_SIZE {
            break;
        }
        offset += fetched;
    }

    let tz = state.config.time_zone;
    let row_count = rows.len();
    let csv_data = tokio::task::spawn_blocking(move || attendance_csv(&rows, &tz))
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;

    tracing::info!(session_id = %session_id, rows = row_count, "Exported session attendance");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    let disposition = format!("attachment; filename=\"attendance_{}.csv\"", session_id);
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .map_err(|e| AppError::InternalServerError(e.into()))?,
    );
    Ok((headers, csv_data))
}

pub async fn list_session_activity(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(page): Query<PaginationQuery>,
    Query(filters): Query<ActivityQuery>,
) -> Result<Json<PaginatedResponse<ScanActivity>>, AppError> {
    if let (Some(from), Some(to)) = (filters.from, filters.to) {
        if from > to {
            return Err(AppError::BadRequest("`from` must be before `to`".into()));
        }
    }
    require_session(&state, session_id).await?;

    let filters = ActivityLogFilters {
        outcome_kind: filters.outcome.filter(|kind| !kind.trim().is_empty()),
        from: filters.from,
        to: filters.to,
    };
    let timeout = state.storage_timeout();
    let activity_logs = &state.repositories.activity_logs;
    let (limit, offset) = (page.limit(), page.offset());
    let entries = with_timeout(
        timeout,
        activity_logs.list_for_session(session_id, filters.clone(), limit, offset),
    )
    .await?;
    let total =
        with_timeout(timeout, activity_logs.count_activity(session_id, filters)).await?;

    Ok(Json(PaginatedResponse::new(entries, total, limit, offset)))
}
