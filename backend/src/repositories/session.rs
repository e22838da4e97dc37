//! Events and their sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{common::map_unique_violation, StorageError, StorageResult};
use crate::db::connection::DbPool;
use crate::models::{
    event::Event,
    session::{Session, SessionWindows},
};
use crate::types::{EventId, SessionId};

const SESSION_COLUMNS: &str = "id, event_id, name, location, time_in_start, time_in_end, \
     time_out_start, time_out_end, is_active, created_by, created_at, updated_at";
const EVENT_COLUMNS: &str =
    "id, name, start_date, end_date, is_active, created_by, created_at, updated_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepositoryTrait: Send + Sync {
    async fn find_session(&self, id: SessionId) -> StorageResult<Option<Session>>;

    async fn find_event(&self, id: EventId) -> StorageResult<Option<Event>>;

    async fn create_event(&self, event: &Event) -> StorageResult<Event>;

    async fn create_session(&self, session: &Session) -> StorageResult<Session>;

    /// Replace a session's windows.
    ///
    /// Fails with [`StorageError::Conflict`] once any attendance exists
    /// against the session; returns `None` for an unknown session.
    async fn update_session_windows(
        &self,
        id: SessionId,
        windows: SessionWindows,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>>;

    /// Mark a session inactive. Sessions are never hard-deleted.
    async fn deactivate_session(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>>;
}

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: DbPool,
}

impl SessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepositoryTrait for SessionRepository {
    async fn find_session(&self, id: SessionId) -> StorageResult<Option<Session>> {
        let query = format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS);
        let row = sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row)
    }

    async fn find_event(&self, id: EventId) -> StorageResult<Option<Event>> {
        let query = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row)
    }

    async fn create_event(&self, event: &Event) -> StorageResult<Event> {
        let query = format!(
            "INSERT INTO events (id, name, start_date, end_date, is_active, created_by, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(event.id)
            .bind(&event.name)
            .bind(event.start_date)
            .bind(event.end_date)
            .bind(event.is_active)
            .bind(event.created_by)
            .bind(event.created_at)
            .bind(event.updated_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|err| map_unique_violation(err, "Event already exists"))
    }

    async fn create_session(&self, session: &Session) -> StorageResult<Session> {
        let query = format!(
            "INSERT INTO sessions (id, event_id, name, location, time_in_start, time_in_end, \
             time_out_start, time_out_end, is_active, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {}",
            SESSION_COLUMNS
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(session.id)
            .bind(session.event_id)
            .bind(&session.name)
            .bind(&session.location)
            .bind(session.time_in_start)
            .bind(session.time_in_end)
            .bind(session.time_out_start)
            .bind(session.time_out_end)
            .bind(session.is_active)
            .bind(session.created_by)
            .bind(session.created_at)
            .bind(session.updated_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|err| map_unique_violation(err, "Session already exists"))
    }

    async fn update_session_windows(
        &self,
        id: SessionId,
        windows: SessionWindows,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        let query = format!(
            "UPDATE sessions SET time_in_start = $2, time_in_end = $3, time_out_start = $4, \
             time_out_end = $5, updated_at = $6 \
             WHERE id = $1 \
               AND NOT EXISTS (SELECT 1 FROM attendance_records WHERE session_id = $1) \
             RETURNING {}",
            SESSION_COLUMNS
        );
        let updated = sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .bind(windows.time_in.start)
            .bind(windows.time_in.end)
            .bind(windows.time_out.map(|w| w.start))
            .bind(windows.time_out.map(|w| w.end))
            .bind(now)
            .fetch_optional(&*self.pool)
            .await?;

        if updated.is_some() {
            return Ok(updated);
        }

        // Either the session is unknown or attendance already pins its windows.
        match self.find_session(id).await? {
            Some(_) => Err(StorageError::Conflict(
                "Session windows cannot change once attendance exists".to_string(),
            )),
            None => Ok(None),
        }
    }

    async fn deactivate_session(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        let query = format!(
            "UPDATE sessions SET is_active = FALSE, updated_at = $2 WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row)
    }
}
