use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Admission categories, each with its own policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitCategory {
    Registration,
    Api,
    Scan,
}

impl RateLimitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitCategory::Registration => "registration",
            RateLimitCategory::Api => "api",
            RateLimitCategory::Scan => "scan",
        }
    }
}

impl fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter state for one `(category, origin)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub attempts: u32,
    pub window_start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            attempts: 1,
            window_start: now,
            blocked_until: None,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Instant at which the current window or block ends.
    pub reset_at: DateTime<Utc>,
    /// Whole seconds the caller should wait; set only on rejection.
    pub retry_after: Option<u64>,
}
