use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::sync::Arc;

use crate::models::activity_log::{ScanActivity, ScanOutcome};
use crate::repositories::{ActivityLogRepositoryTrait, StorageError};
use crate::types::{ActivityLogId, PrincipalId, SessionId, StudentId};
use crate::utils::digest::payload_digest;

#[derive(Debug, Clone)]
pub struct ScanActivityEntry {
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<PrincipalId>,
    pub session_id: Option<SessionId>,
    pub student_id: Option<StudentId>,
    pub raw_payload: String,
    pub ip: Option<String>,
    pub request_id: Option<String>,
    pub outcome: ScanOutcome,
}

#[derive(Clone)]
pub struct ActivityLogService {
    repo: Arc<dyn ActivityLogRepositoryTrait>,
}

impl ActivityLogService {
    pub fn new(repo: Arc<dyn ActivityLogRepositoryTrait>) -> Self {
        Self { repo }
    }

    pub async fn record_scan(&self, entry: ScanActivityEntry) -> Result<(), StorageError> {
        let activity = ScanActivity {
            id: ActivityLogId::new(),
            occurred_at: entry.occurred_at,
            actor_id: entry.actor_id,
            session_id: entry.session_id,
            student_id: entry.student_id,
            payload_digest: payload_digest(&entry.raw_payload),
            ip: entry.ip,
            request_id: entry.request_id,
            outcome: Json(entry.outcome),
        };

        self.repo.insert_activity(&activity).await
    }

    pub async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        self.repo.delete_older_than(cutoff).await
    }
}
