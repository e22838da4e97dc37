//! Attendance sessions and their half-open scan windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::{EventId, PrincipalId, SessionId};

/// Reasons a set of window bounds cannot form valid session windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("time-in window must start before it ends")]
    EmptyTimeIn,
    #[error("time-out window must start before it ends")]
    EmptyTimeOut,
    #[error("time-out start and end must be provided together")]
    PartialTimeOut,
    #[error("time-out window must not start before the time-in window ends")]
    TimeOutBeforeTimeIn,
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionWindows {
    pub time_in: TimeWindow,
    pub time_out: Option<TimeWindow>,
}

impl SessionWindows {
    pub fn new(
        time_in_start: DateTime<Utc>,
        time_in_end: DateTime<Utc>,
        time_out_start: Option<DateTime<Utc>>,
        time_out_end: Option<DateTime<Utc>>,
    ) -> Result<Self, WindowError> {
        if time_in_start >= time_in_end {
            return Err(WindowError::EmptyTimeIn);
        }

        let time_out = match (time_out_start, time_out_end) {
            (None, None) => None,
            (Some(start), Some(end)) => {
                if start >= end {
                    return Err(WindowError::EmptyTimeOut);
                }
                if start < time_in_end {
                    return Err(WindowError::TimeOutBeforeTimeIn);
                }
                Some(TimeWindow { start, end })
            }
            _ => return Err(WindowError::PartialTimeOut),
        };

        Ok(Self {
            time_in: TimeWindow {
                start: time_in_start,
                end: time_in_end,
            },
            time_out,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of one attendance-taking window inside an event.
pub struct Session {
    pub id: SessionId,
    pub event_id: EventId,
    pub name: String,
    pub location: Option<String>,
    pub time_in_start: DateTime<Utc>,
    pub time_in_end: DateTime<Utc>,
    pub time_out_start: Option<DateTime<Utc>>,
    pub time_out_end: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_by: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        event_id: EventId,
        name: String,
        location: Option<String>,
        windows: SessionWindows,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            event_id,
            name,
            location,
            time_in_start: windows.time_in.start,
            time_in_end: windows.time_in.end,
            time_out_start: windows.time_out.map(|w| w.start),
            time_out_end: windows.time_out.map(|w| w.end),
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validated view over the stored bounds. A row that violates the window
    /// invariants yields an error rather than a guessed window.
    pub fn windows(&self) -> Result<SessionWindows, WindowError> {
        SessionWindows::new(
            self.time_in_start,
            self.time_in_end,
            self.time_out_start,
            self.time_out_end,
        )
    }

    pub fn apply_windows(&mut self, windows: SessionWindows, now: DateTime<Utc>) {
        self.time_in_start = windows.time_in.start;
        self.time_in_end = windows.time_in.end;
        self.time_out_start = windows.time_out.map(|w| w.start);
        self.time_out_end = windows.time_out.map(|w| w.end);
        self.updated_at = now;
    }

    /// Latest instant any window of this session accepts scans.
    pub fn last_window_end(&self) -> DateTime<Utc> {
        self.time_out_end.unwrap_or(self.time_in_end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for creating a session inside an event.
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 200, message = "Session name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 200, message = "Location must be at most 200 characters"))]
    pub location: Option<String>,
    pub time_in_start: DateTime<Utc>,
    pub time_in_end: DateTime<Utc>,
    pub time_out_start: Option<DateTime<Utc>>,
    pub time_out_end: Option<DateTime<Utc>>,
}

impl CreateSessionRequest {
    pub fn windows(&self) -> Result<SessionWindows, WindowError> {
        SessionWindows::new(
            self.time_in_start,
            self.time_in_end,
            self.time_out_start,
            self.time_out_end,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// Payload for replacing a session's scan windows.
pub struct UpdateSessionWindowsRequest {
    pub time_in_start: DateTime<Utc>,
    pub time_in_end: DateTime<Utc>,
    pub time_out_start: Option<DateTime<Utc>>,
    pub time_out_end: Option<DateTime<Utc>>,
}

impl UpdateSessionWindowsRequest {
    pub fn windows(&self) -> Result<SessionWindows, WindowError> {
        SessionWindows::new(
            self.time_in_start,
            self.time_in_end,
            self.time_out_start,
            self.time_out_end,
        )
    }
}
