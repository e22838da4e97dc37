use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Returns the current time in the configured timezone.
pub fn now_in_timezone(tz: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(tz)
}

/// Returns today's date in the configured timezone.
pub fn today_local(tz: &Tz) -> NaiveDate {
    now_in_timezone(tz).date_naive()
}

/// Formats an instant as local wall-clock time for exports.
pub fn format_local(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
