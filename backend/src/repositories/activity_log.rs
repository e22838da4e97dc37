//! Scan activity log repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::{common::push_clause, StorageResult};
use crate::db::connection::DbPool;
use crate::models::activity_log::ScanActivity;
use crate::types::SessionId;

const SELECT_COLUMNS: &str =
    "id, occurred_at, actor_id, session_id, student_id, payload_digest, ip, request_id, outcome";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityLogFilters {
    /// Restrict to one outcome kind (`recorded`, `duplicate`, ...).
    pub outcome_kind: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityLogRepositoryTrait: Send + Sync {
    async fn insert_activity(&self, activity: &ScanActivity) -> StorageResult<()>;

    /// Newest first.
    async fn list_for_session(
        &self,
        session_id: SessionId,
        filters: ActivityLogFilters,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<ScanActivity>>;

    async fn count_activity(
        &self,
        session_id: SessionId,
        filters: ActivityLogFilters,
    ) -> StorageResult<i64>;

    /// Delete entries older than `cutoff`; returns the number removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}

#[derive(Debug, Clone)]
pub struct ActivityLogRepository {
    pool: DbPool,
}

impl ActivityLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLogRepositoryTrait for ActivityLogRepository {
    async fn insert_activity(&self, activity: &ScanActivity) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO scan_activity_logs \
             (id, occurred_at, actor_id, session_id, student_id, payload_digest, ip, request_id, outcome) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(activity.id)
        .bind(activity.occurred_at)
        .bind(activity.actor_id)
        .bind(activity.session_id)
        .bind(activity.student_id)
        .bind(&activity.payload_digest)
        .bind(&activity.ip)
        .bind(&activity.request_id)
        .bind(&activity.outcome)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: SessionId,
        filters: ActivityLogFilters,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<ScanActivity>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM scan_activity_logs",
            SELECT_COLUMNS
        ));
        push_filters(&mut builder, session_id, filters);

        builder
            .push(" ORDER BY occurred_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder
            .build_query_as::<ScanActivity>()
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_activity(
        &self,
        session_id: SessionId,
        filters: ActivityLogFilters,
    ) -> StorageResult<i64> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM scan_activity_logs");
        push_filters(&mut builder, session_id, filters);

        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&*self.pool)
            .await?;
        Ok(total)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM scan_activity_logs WHERE occurred_at < $1")
            .bind(cutoff)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    session_id: SessionId,
    filters: ActivityLogFilters,
) {
    let mut has_clause = false;

    push_clause(builder, &mut has_clause);
    builder.push("session_id = ").push_bind(session_id);

    if let Some(kind) = filters.outcome_kind {
        push_clause(builder, &mut has_clause);
        builder.push("outcome->>'kind' = ").push_bind(kind);
    }
    if let Some(from) = filters.from {
        push_clause(builder, &mut has_clause);
        builder.push("occurred_at >= ").push_bind(from);
    }
    if let Some(to) = filters.to {
        push_clause(builder, &mut has_clause);
        builder.push("occurred_at < ").push_bind(to);
    }
}
