//! Storage for rate-limit counters.
//!
//! Stores only load, update and expire entries; admission policy lives in
//! [`crate::services::rate_limit::RateLimiter`].

use async_trait::async_trait;
use bb8_redis::redis::{self, AsyncCommands};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::db::redis::RedisPool;
use crate::models::rate_limit::{RateLimitCategory, RateLimitEntry};

#[derive(Debug, Error)]
pub enum RateLimitStoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
    #[error("rate limit entry is corrupt: {0}")]
    Corrupt(String),
    #[error("rate limit entry kept changing under concurrent updates")]
    Contention,
}

const MAX_SWAP_ATTEMPTS: usize = 8;

/// Replacement entry produced by an [`RateLimitStore::update`] closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryUpdate {
    pub entry: RateLimitEntry,
    pub expires_at: DateTime<Utc>,
}

/// Maps the current entry to its replacement, or `None` to leave it as is.
pub type UpdateFn<'a> = &'a (dyn Fn(Option<&RateLimitEntry>) -> Option<EntryUpdate> + Send + Sync);

impl From<redis::RedisError> for RateLimitStoreError {
    fn from(err: redis::RedisError) -> Self {
        RateLimitStoreError::Unavailable(err.to_string())
    }
}

impl From<bb8::RunError<redis::RedisError>> for RateLimitStoreError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        RateLimitStoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub category: RateLimitCategory,
    pub origin: String,
}

impl RateLimitKey {
    pub fn new(category: RateLimitCategory, origin: impl Into<String>) -> Self {
        Self {
            category,
            origin: origin.into(),
        }
    }

    fn redis_key(&self) -> String {
        format!("rate_limit:{}:{}", self.category, self.origin)
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn load(&self, key: &RateLimitKey) -> Result<Option<RateLimitEntry>, RateLimitStoreError>;

    /// Replace the entry only if it still equals `expected` (`None` = absent).
    /// Returns `false` when another writer got there first.
    async fn compare_and_swap(
        &self,
        key: &RateLimitKey,
        expected: Option<&RateLimitEntry>,
        next: &RateLimitEntry,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RateLimitStoreError>;

    /// Apply `apply` to the entry as one atomic step and return the entry it
    /// was applied to. The default retries a load and compare-and-swap pair
    /// and gives up with `Contention` when other writers keep winning.
    async fn update(
        &self,
        key: &RateLimitKey,
        apply: UpdateFn<'_>,
    ) -> Result<Option<RateLimitEntry>, RateLimitStoreError> {
        for _ in 0..MAX_SWAP_ATTEMPTS {
            let current = self.load(key).await?;
            let Some(update) = apply(current.as_ref()) else {
                return Ok(current);
            };
            if self
                .compare_and_swap(key, current.as_ref(), &update.entry, update.expires_at)
                .await?
            {
                return Ok(current);
            }
        }
        Err(RateLimitStoreError::Contention)
    }

    /// Drop entries whose expiry has passed; returns how many were removed.
    async fn purge(&self, now: DateTime<Utc>) -> Result<usize, RateLimitStoreError>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: RateLimitEntry,
    expires_at: DateTime<Utc>,
}

/// Process-local store. Counts are per replica.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<RateLimitKey, StoredEntry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn load(&self, key: &RateLimitKey) -> Result<Option<RateLimitEntry>, RateLimitStoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).map(|stored| stored.entry.clone()))
    }

    async fn compare_and_swap(
        &self,
        key: &RateLimitKey,
        expected: Option<&RateLimitEntry>,
        next: &RateLimitEntry,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RateLimitStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let current = entries.get(key).map(|stored| &stored.entry);
        if current != expected {
            return Ok(false);
        }
        entries.insert(
            key.clone(),
            StoredEntry {
                entry: next.clone(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn update(
        &self,
        key: &RateLimitKey,
        apply: UpdateFn<'_>,
    ) -> Result<Option<RateLimitEntry>, RateLimitStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let current = entries.get(key).map(|stored| stored.entry.clone());
        if let Some(update) = apply(current.as_ref()) {
            entries.insert(
                key.clone(),
                StoredEntry {
                    entry: update.entry,
                    expires_at: update.expires_at,
                },
            );
        }
        Ok(current)
    }

    async fn purge(&self, now: DateTime<Utc>) -> Result<usize, RateLimitStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, stored| stored.expires_at > now);
        Ok(before - entries.len())
    }
}

/// Compares the stored JSON with the expected JSON (empty = absent) and only
/// then writes the new value with a millisecond TTL.
const COMPARE_AND_SWAP_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '' then
    if current then return 0 end
elseif current ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
return 1
"#;

/// Shared store for multi-replica deployments. Redis TTLs expire entries, so
/// [`RateLimitStore::purge`] has nothing to do.
pub struct RedisRateLimitStore {
    pool: RedisPool,
}

impl RedisRateLimitStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

fn encode(entry: &RateLimitEntry) -> Result<String, RateLimitStoreError> {
    serde_json::to_string(entry).map_err(|err| RateLimitStoreError::Corrupt(err.to_string()))
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn load(&self, key: &RateLimitKey) -> Result<Option<RateLimitEntry>, RateLimitStoreError> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(key.redis_key()).await?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|err| RateLimitStoreError::Corrupt(err.to_string()))
        })
        .transpose()
    }

    async fn compare_and_swap(
        &self,
        key: &RateLimitKey,
        expected: Option<&RateLimitEntry>,
        next: &RateLimitEntry,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RateLimitStoreError> {
        let expected = expected.map(encode).transpose()?.unwrap_or_default();
        let next = encode(next)?;
        let ttl_ms = (expires_at - Utc::now()).num_milliseconds().max(1_000);

        let mut conn = self.pool.get().await?;
        let swapped: i32 = redis::cmd("EVAL")
            .arg(COMPARE_AND_SWAP_SCRIPT)
            .arg(1)
            .arg(key.redis_key())
            .arg(expected)
            .arg(next)
            .arg(ttl_ms)
            .query_async(&mut *conn)
            .await?;
        if swapped != 1 {
            tracing::debug!(key = %key.redis_key(), "Rate limit entry changed concurrently");
        }
        Ok(swapped == 1)
    }

    async fn purge(&self, _now: DateTime<Utc>) -> Result<usize, RateLimitStoreError> {
        Ok(0)
    }
}
