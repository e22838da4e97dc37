//! Classifies an instant against a session's scan windows.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::{
    event::Event,
    scan::{Classification, SessionStatus},
    session::Session,
};

#[derive(Debug, Clone, Copy)]
pub struct SessionWindowClassifier {
    time_zone: Tz,
}

impl SessionWindowClassifier {
    /// `time_zone` decides which calendar day an instant belongs to when
    /// checking the event's date range. Windows themselves are absolute.
    pub fn new(time_zone: Tz) -> Self {
        Self { time_zone }
    }

    pub fn classify(&self, session: &Session, event: &Event, now: DateTime<Utc>) -> Classification {
        self.status(session, event, now).into()
    }

    fn status(&self, session: &Session, event: &Event, now: DateTime<Utc>) -> SessionStatus {
        if !session.is_active || !event.is_active {
            return SessionStatus::Inactive;
        }

        let local_date = now.with_timezone(&self.time_zone).date_naive();
        if !event.covers(local_date) {
            return SessionStatus::Inactive;
        }

        let windows = match session.windows() {
            Ok(windows) => windows,
            Err(err) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %err,
                    "Session has invalid windows; treating as inactive"
                );
                return SessionStatus::Inactive;
            }
        };

        if now < windows.time_in.start {
            SessionStatus::Upcoming
        } else if windows.time_in.contains(now) {
            SessionStatus::ActiveTimeIn
        } else if windows.time_out.is_some_and(|window| window.contains(now)) {
            SessionStatus::ActiveTimeOut
        } else {
            SessionStatus::Ended
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scan::ScanKind;
    use crate::models::session::SessionWindows;
    use crate::types::PrincipalId;
    use chrono::{NaiveDate, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, hour, minute, 0).unwrap()
    }

    fn event() -> Event {
        let day = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        Event::new("Field day".into(), day, day, PrincipalId::new(), at(0, 0))
    }

    fn session(event: &Event, time_out: bool) -> Session {
        let windows = if time_out {
            SessionWindows::new(at(9, 0), at(9, 30), Some(at(16, 0)), Some(at(16, 30)))
        } else {
            SessionWindows::new(at(9, 0), at(9, 30), None, None)
        }
        .unwrap();
        Session::new(event.id, "Main".into(), None, windows, PrincipalId::new(), at(0, 0))
    }

    fn classify(session: &Session, event: &Event, now: DateTime<Utc>) -> Classification {
        SessionWindowClassifier::new(chrono_tz::UTC).classify(session, event, now)
    }

    #[test]
    fn morning_and_afternoon_windows() {
        let event = event();
        let session = session(&event, true);

        let cases = [
            (at(8, 59), SessionStatus::Upcoming, ScanKind::OutsideWindow),
            (at(9, 0), SessionStatus::ActiveTimeIn, ScanKind::TimeIn),
            (at(9, 15), SessionStatus::ActiveTimeIn, ScanKind::TimeIn),
            (at(9, 30), SessionStatus::Ended, ScanKind::OutsideWindow),
            (at(12, 0), SessionStatus::Ended, ScanKind::OutsideWindow),
            (at(16, 0), SessionStatus::ActiveTimeOut, ScanKind::TimeOut),
            (at(16, 29), SessionStatus::ActiveTimeOut, ScanKind::TimeOut),
            (at(16, 30), SessionStatus::Ended, ScanKind::OutsideWindow),
        ];

        for (now, status, kind) in cases {
            let result = classify(&session, &event, now);
            assert_eq!(result.status, status, "status at {now}");
            assert_eq!(result.scan_kind, kind, "kind at {now}");
        }
    }

    #[test]
    fn time_in_only_session_never_yields_time_out() {
        let event = event();
        let session = session(&event, false);

        for minute in (0..24 * 60).step_by(7) {
            let now = at(0, 0) + chrono::Duration::minutes(minute);
            let result = classify(&session, &event, now);
            assert_ne!(result.status, SessionStatus::ActiveTimeOut);
            assert_ne!(result.scan_kind, ScanKind::TimeOut);
        }
    }

    #[test]
    fn inactive_session_or_event_is_invalid() {
        let mut event = event();
        let mut session = session(&event, true);

        session.is_active = false;
        let result = classify(&session, &event, at(9, 10));
        assert_eq!(result.status, SessionStatus::Inactive);
        assert_eq!(result.scan_kind, ScanKind::Invalid);

        session.is_active = true;
        event.is_active = false;
        assert_eq!(classify(&session, &event, at(9, 10)).scan_kind, ScanKind::Invalid);
    }

    #[test]
    fn instant_outside_event_dates_is_inactive() {
        let mut event = event();
        event.start_date = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
        event.end_date = NaiveDate::from_ymd_opt(2025, 4, 3).unwrap();
        let session = session(&event, true);

        assert_eq!(
            classify(&session, &event, at(9, 10)).status,
            SessionStatus::Inactive
        );
    }

    #[test]
    fn event_dates_use_configured_time_zone() {
        // 2025-04-01 23:30 UTC is already 2025-04-02 in Tokyo.
        let event = event();
        let windows = SessionWindows::new(at(23, 0), at(23, 59), None, None).unwrap();
        let session = Session::new(event.id, "Late".into(), None, windows, PrincipalId::new(), at(0, 0));

        let utc = SessionWindowClassifier::new(chrono_tz::UTC);
        assert_eq!(
            utc.classify(&session, &event, at(23, 30)).status,
            SessionStatus::ActiveTimeIn
        );

        let tokyo = SessionWindowClassifier::new(chrono_tz::Asia::Tokyo);
        assert_eq!(
            tokyo.classify(&session, &event, at(23, 30)).status,
            SessionStatus::Inactive
        );
    }

    #[test]
    fn corrupt_windows_classify_as_inactive() {
        let event = event();
        let mut session = session(&event, true);
        session.time_out_end = None;

        let result = classify(&session, &event, at(9, 10));
        assert_eq!(result.status, SessionStatus::Inactive);
        assert_eq!(result.scan_kind, ScanKind::Invalid);
    }
}
