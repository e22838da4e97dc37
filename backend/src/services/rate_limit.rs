//! Fixed-start window limiter with a lockout once the window's budget is
//! spent.
//!
//! Each `(category, origin)` pair counts attempts from the first request of a
//! window. A request arriving after `max_attempts` have been counted blocks the
//! origin for `block_seconds`; blocked requests are rejected without being
//! counted and without extending the block.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::config::{Config, RateLimitPolicy, MAX_DURATION_SECONDS};
use crate::models::rate_limit::{RateLimitCategory, RateLimitDecision, RateLimitEntry};
use crate::services::rate_limit_store::{
    EntryUpdate, RateLimitKey, RateLimitStore, RateLimitStoreError,
};

#[derive(Debug, Clone, Copy)]
struct Policies {
    registration: RateLimitPolicy,
    api: RateLimitPolicy,
    scan: RateLimitPolicy,
}

impl Policies {
    fn get(&self, category: RateLimitCategory) -> RateLimitPolicy {
        match category {
            RateLimitCategory::Registration => self.registration,
            RateLimitCategory::Api => self.api,
            RateLimitCategory::Scan => self.scan,
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policies: Policies,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: &Config) -> Self {
        Self {
            store,
            policies: Policies {
                registration: config.rate_limit_policy(RateLimitCategory::Registration),
                api: config.rate_limit_policy(RateLimitCategory::Api),
                scan: config.rate_limit_policy(RateLimitCategory::Scan),
            },
        }
    }

    pub fn policy(&self, category: RateLimitCategory) -> RateLimitPolicy {
        self.policies.get(category)
    }

    pub async fn check(
        &self,
        category: RateLimitCategory,
        origin: &str,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        self.check_at(category, origin, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        category: RateLimitCategory,
        origin: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let policy = self.policy(category);
        let key = RateLimitKey::new(category, origin);

        let apply = |current: Option<&RateLimitEntry>| {
            let (next, _) = evaluate(&policy, current, now);
            (current != Some(&next)).then(|| EntryUpdate {
                expires_at: expiry(&policy, &next),
                entry: next,
            })
        };
        let seen = self.store.update(&key, &apply).await?;
        Ok(evaluate(&policy, seen.as_ref(), now).1)
    }

    /// Remove entries no longer able to affect a decision.
    pub async fn purge(&self, now: DateTime<Utc>) -> Result<usize, RateLimitStoreError> {
        self.store.purge(now).await
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_DURATION_SECONDS) as i64)
}

/// Instant after which an entry neither blocks nor counts.
fn expiry(policy: &RateLimitPolicy, entry: &RateLimitEntry) -> DateTime<Utc> {
    entry
        .blocked_until
        .unwrap_or(entry.window_start + seconds(policy.window_seconds))
}

fn retry_after(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1_000).max(1)
}

fn evaluate(
    policy: &RateLimitPolicy,
    current: Option<&RateLimitEntry>,
    now: DateTime<Utc>,
) -> (RateLimitEntry, RateLimitDecision) {
    let window = seconds(policy.window_seconds);
    let limit = policy.max_attempts;

    match current {
        Some(entry) if entry.blocked_until.is_some_and(|until| now < until) => {
            let until = entry.blocked_until.unwrap_or(now);
            (
                entry.clone(),
                RateLimitDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_at: until,
                    retry_after: Some(retry_after(until, now)),
                },
            )
        }
        Some(entry) if entry.blocked_until.is_none() && now - entry.window_start < window => {
            if entry.attempts >= limit {
                let until = now + seconds(policy.block_seconds);
                let blocked = RateLimitEntry {
                    blocked_until: Some(until),
                    ..entry.clone()
                };
                (
                    blocked,
                    RateLimitDecision {
                        allowed: false,
                        limit,
                        remaining: 0,
                        reset_at: until,
                        retry_after: Some(retry_after(until, now)),
                    },
                )
            } else {
                let counted = RateLimitEntry {
                    attempts: entry.attempts + 1,
                    ..entry.clone()
                };
                let decision = RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit.saturating_sub(counted.attempts),
                    reset_at: entry.window_start + window,
                    retry_after: None,
                };
                (counted, decision)
            }
        }
        // No entry, an elapsed window, or an elapsed block: start over.
        _ => {
            let fresh = RateLimitEntry::fresh(now);
            let decision = RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(1),
                reset_at: now + window,
                retry_after: None,
            };
            (fresh, decision)
        }
    }
}
