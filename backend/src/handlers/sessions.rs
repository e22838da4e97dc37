use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::{
        event::Event,
        principal::Principal,
        qr_payload::SessionContext,
        scan::{Classification, SessionStatus, SessionStatusResponse},
        session::{Session, UpdateSessionWindowsRequest},
    },
    repositories::common::with_timeout,
    state::AppState,
    types::SessionId,
    utils::qr_image::qr_data_url,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionQrResponse {
    pub context: SessionContext,
    /// Exact text encoded in the QR code.
    pub payload: String,
    pub qr_svg_data_url: String,
}

pub(crate) async fn require_session(
    state: &AppState,
    session_id: SessionId,
) -> Result<Session, AppError> {
    with_timeout(
        state.storage_timeout(),
        state.repositories.sessions.find_session(session_id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Session not found".into()))
}

async fn find_event(state: &AppState, session: &Session) -> Result<Option<Event>, AppError> {
    let event = with_timeout(
        state.storage_timeout(),
        state.repositories.sessions.find_event(session.event_id),
    )
    .await?;
    Ok(event)
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    let session = require_session(&state, session_id).await?;
    let now = Utc::now();
    let classification = match find_event(&state, &session).await? {
        Some(event) => state.classifier.classify(&session, &event, now),
        None => Classification::from(SessionStatus::Inactive),
    };

    Ok(Json(SessionStatusResponse {
        session_id,
        status: classification.status,
        scan_kind: classification.scan_kind,
        evaluated_at: now,
    }))
}

pub async fn session_qr(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionQrResponse>, AppError> {
    let session = require_session(&state, session_id).await?;
    let event = find_event(&state, &session)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

    let context = SessionContext {
        session_id: session.id,
        event_id: event.id,
        event_name: event.name,
        session_name: session.name.clone(),
        start_time: session.time_in_start,
        end_time: session.last_window_end(),
        location: session.location.clone(),
        organizer_id: principal.id,
        issued_at: Utc::now(),
    };
    let payload = state
        .codec
        .encode_session(&context)
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    let qr_svg_data_url = qr_data_url(&payload)?;

    Ok(Json(SessionQrResponse {
        context,
        payload,
        qr_svg_data_url,
    }))
}

pub async fn update_session_windows(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<SessionId>,
    Json(payload): Json<UpdateSessionWindowsRequest>,
) -> Result<Json<Session>, AppError> {
    let windows = payload
        .windows()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let updated = with_timeout(
        state.storage_timeout(),
        state
            .repositories
            .sessions
            .update_session_windows(session_id, windows, Utc::now()),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Session not found".into()))?;

    tracing::info!(
        session_id = %session_id,
        updated_by = %principal.id,
        "Session windows updated"
    );
    Ok(Json(updated))
}

pub async fn deactivate_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Session>, AppError> {
    let session = with_timeout(
        state.storage_timeout(),
        state
            .repositories
            .sessions
            .deactivate_session(session_id, Utc::now()),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Session not found".into()))?;

    tracing::info!(
        session_id = %session_id,
        deactivated_by = %principal.id,
        "Session deactivated"
    );
    Ok(Json(session))
}
