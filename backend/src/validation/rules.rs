//! Common validation rules shared across request payloads.

use chrono::NaiveDate;
use validator::ValidationError;

/// Validates an institution-issued student number.
///
/// Requirements:
/// - 1-32 characters after trimming
/// - ASCII letters, digits and hyphens only
pub fn validate_student_id_number(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() || value.len() > 32 {
        return Err(ValidationError::new("student_id_number_invalid_length"));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::new("student_id_number_invalid_characters"));
    }

    Ok(())
}

/// Validates an inclusive event date range.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if start > end {
        return Err(ValidationError::new("date_range_inverted"));
    }
    Ok(())
}
