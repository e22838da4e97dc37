use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::qr_payload::StudentIdentity;
use crate::types::StudentId;
use crate::validation::rules;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
/// Registered student whose identity is carried in a QR code.
pub struct Student {
    pub id: StudentId,
    /// Institution-issued number printed on the student card.
    pub student_id_number: String,
    pub first_name: String,
    pub last_name: String,
    pub program_name: Option<String>,
    pub year: Option<i16>,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn from_registration(request: RegisterStudentRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: StudentId::new(),
            student_id_number: request.student_id_number.trim().to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            program_name: request
                .program_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            year: request.year,
            created_at: now,
        }
    }

    pub fn identity(&self, issued_at: DateTime<Utc>) -> StudentIdentity {
        StudentIdentity {
            student_id: self.id,
            student_id_number: self.student_id_number.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            program_name: self.program_name.clone(),
            year: self.year,
            issued_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Public registration payload; the response carries the student's QR code.
pub struct RegisterStudentRequest {
    #[validate(custom(function = "rules::validate_student_id_number"))]
    pub student_id_number: String,
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,
    #[validate(length(max = 200, message = "Program name must be at most 200 characters"))]
    pub program_name: Option<String>,
    #[validate(range(min = 1, max = 10, message = "Year must be between 1 and 10"))]
    pub year: Option<i16>,
}
