use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        event::{CreateEventRequest, Event},
        principal::Principal,
        session::{CreateSessionRequest, Session},
    },
    repositories::common::with_timeout,
    state::AppState,
    types::EventId,
    validation::{rules, Validate},
};

pub async fn create_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    payload.validate()?;
    rules::validate_date_range(payload.start_date, payload.end_date)
        .map_err(|_| AppError::BadRequest("start_date must not be after end_date".into()))?;

    let event = Event::new(
        payload.name.trim().to_string(),
        payload.start_date,
        payload.end_date,
        principal.id,
        Utc::now(),
    );
    let created = with_timeout(
        state.storage_timeout(),
        state.repositories.sessions.create_event(&event),
    )
    .await?;

    tracing::info!(event_id = %created.id, created_by = %principal.id, "Event created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<EventId>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    payload.validate()?;
    let windows = payload
        .windows()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let timeout = state.storage_timeout();
    let event = with_timeout(timeout, state.repositories.sessions.find_event(event_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))?;
    if !event.is_active {
        return Err(AppError::Conflict("Event is not active".into()));
    }

    let location = payload
        .location
        .map(|location| location.trim().to_string())
        .filter(|location| !location.is_empty());
    let session = Session::new(
        event.id,
        payload.name.trim().to_string(),
        location,
        windows,
        principal.id,
        Utc::now(),
    );
    let created = with_timeout(timeout, state.repositories.sessions.create_session(&session)).await?;

    tracing::info!(
        session_id = %created.id,
        event_id = %event.id,
        created_by = %principal.id,
        "Session created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}
