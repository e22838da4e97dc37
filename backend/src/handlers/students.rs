use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::{
        qr_payload::StudentIdentity,
        student::{RegisterStudentRequest, Student},
    },
    repositories::common::with_timeout,
    state::AppState,
    utils::qr_image::qr_data_url,
    validation::Validate,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudentRegistrationResponse {
    pub student: Student,
    pub identity: StudentIdentity,
    /// Exact text encoded in the QR code.
    pub payload: String,
    pub qr_svg_data_url: String,
}

pub async fn register_student(
    State(state): State<AppState>,
    Json(payload): Json<RegisterStudentRequest>,
) -> Result<(StatusCode, Json<StudentRegistrationResponse>), AppError> {
    payload.validate()?;

    let now = Utc::now();
    let student = Student::from_registration(payload, now);
    let student = with_timeout(
        state.storage_timeout(),
        state.repositories.students.create_student(&student),
    )
    .await?;

    let identity = student.identity(now);
    let encoded = state
        .codec
        .encode_student(&identity)
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    let qr_svg_data_url = qr_data_url(&encoded)?;

    tracing::info!(student_id = %student.id, "Student registered");
    Ok((
        StatusCode::CREATED,
        Json(StudentRegistrationResponse {
            student,
            identity,
            payload: encoded,
            qr_svg_data_url,
        }),
    ))
}
