use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::{EventId, PrincipalId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
/// An event owning zero or more attendance sessions.
pub struct Event {
    pub id: EventId,
    pub name: String,
    /// First calendar day (inclusive) on which scans are accepted.
    pub start_date: NaiveDate,
    /// Last calendar day (inclusive) on which scans are accepted.
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub created_by: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            name,
            start_date,
            end_date,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `date` falls inside the event's inclusive date range.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for creating an event.
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Event name must be 1-200 characters"))]
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_is_inclusive_on_both_ends() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let event = Event::new("Orientation".into(), start, end, PrincipalId::new(), Utc::now());

        assert!(event.covers(start));
        assert!(event.covers(end));
        assert!(!event.covers(start.pred_opt().unwrap()));
        assert!(!event.covers(end.succ_opt().unwrap()));
    }
}
