use chrono_tz::Tz;

use crate::models::{attendance::AttendanceRecord, student::Student};
use crate::utils::time::format_local;

const ATTENDANCE_HEADER: [&str; 9] = [
    "record_id",
    "student_id_number",
    "last_name",
    "first_name",
    "program",
    "year",
    "time_in",
    "time_out",
    "scanned_by",
];

fn needs_formula_guard(value: &str) -> bool {
    matches!(value.chars().next(), Some('=' | '+' | '-' | '@'))
}

fn escape_cell(value: &str) -> String {
    let mut sanitized = value.replace('"', "\"\"");
    if needs_formula_guard(&sanitized) {
        sanitized.insert(0, '\'');
    }
    format!("\"{}\"", sanitized)
}

pub fn append_csv_row(buffer: &mut String, fields: &[String]) {
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            buffer.push(',');
        }
        buffer.push_str(&escape_cell(field));
    }
    buffer.push('\n');
}

/// Renders a session's attendance with local wall-clock times. Records whose
/// student row is missing keep their ids and leave the name columns blank.
pub fn attendance_csv(rows: &[(AttendanceRecord, Option<Student>)], tz: &Tz) -> String {
    let mut buffer = String::new();
    let header: Vec<String> = ATTENDANCE_HEADER.iter().map(|h| h.to_string()).collect();
    append_csv_row(&mut buffer, &header);

    for (record, student) in rows {
        let fields = vec![
            record.id.to_string(),
            student
                .as_ref()
                .map(|s| s.student_id_number.clone())
                .unwrap_or_else(|| record.student_id.to_string()),
            student.as_ref().map(|s| s.last_name.clone()).unwrap_or_default(),
            student.as_ref().map(|s| s.first_name.clone()).unwrap_or_default(),
            student
                .as_ref()
                .and_then(|s| s.program_name.clone())
                .unwrap_or_default(),
            student
                .as_ref()
                .and_then(|s| s.year)
                .map(|year| year.to_string())
                .unwrap_or_default(),
            record
                .time_in
                .map(|t| format_local(t, tz))
                .unwrap_or_default(),
            record
                .time_out
                .map(|t| format_local(t, tz))
                .unwrap_or_default(),
            record.scanned_by.to_string(),
        ];
        append_csv_row(&mut buffer, &fields);
    }
    buffer
}
