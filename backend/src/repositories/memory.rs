//! In-memory implementations of every repository trait.
//!
//! Used when running without Postgres and by the HTTP integration tests. The
//! upsert mirrors the conditional `ON CONFLICT` update of the SQL version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    activity_log::ActivityLogFilters, ActivityLogRepositoryTrait, AttendanceRepositoryTrait,
    SessionRepositoryTrait, StorageError, StorageResult, StudentRepositoryTrait,
};
use crate::models::{
    activity_log::ScanActivity,
    attendance::AttendanceRecord,
    event::Event,
    session::{Session, SessionWindows},
    student::Student,
};
use crate::types::{EventId, SessionId, StudentId};

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    sessions: HashMap<SessionId, Session>,
    students: HashMap<StudentId, Student>,
    attendance: HashMap<(StudentId, SessionId), AttendanceRecord>,
    activity: Vec<ScanActivity>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRepositories {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn page<T: Clone>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl AttendanceRepositoryTrait for InMemoryRepositories {
    async fn find_attendance(
        &self,
        student_id: StudentId,
        session_id: SessionId,
    ) -> StorageResult<Option<AttendanceRecord>> {
        Ok(self.tables().attendance.get(&(student_id, session_id)).cloned())
    }

    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> StorageResult<Option<AttendanceRecord>> {
        let mut tables = self.tables();
        let key = (record.student_id, record.session_id);
        match tables.attendance.get_mut(&key) {
            None => {
                tables.attendance.insert(key, record.clone());
                Ok(Some(record.clone()))
            }
            Some(existing) => {
                let applies = existing.time_out.is_none()
                    && existing.time_in.is_some()
                    && record.time_out.is_some();
                if !applies {
                    return Ok(None);
                }
                existing.time_out = record.time_out;
                existing.time_out_scanned_by = record.time_out_scanned_by;
                existing.updated_at = record.updated_at;
                Ok(Some(existing.clone()))
            }
        }
    }

    async fn list_for_session(
        &self,
        session_id: SessionId,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<AttendanceRecord>> {
        let mut rows: Vec<AttendanceRecord> = self
            .tables()
            .attendance
            .values()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let a_key = (a.time_in.is_none(), a.time_in, a.id);
            let b_key = (b.time_in.is_none(), b.time_in, b.id);
            a_key.cmp(&b_key)
        });
        Ok(page(rows, limit, offset))
    }

    async fn count_for_session(&self, session_id: SessionId) -> StorageResult<i64> {
        let count = self
            .tables()
            .attendance
            .values()
            .filter(|record| record.session_id == session_id)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl SessionRepositoryTrait for InMemoryRepositories {
    async fn find_session(&self, id: SessionId) -> StorageResult<Option<Session>> {
        Ok(self.tables().sessions.get(&id).cloned())
    }

    async fn find_event(&self, id: EventId) -> StorageResult<Option<Event>> {
        Ok(self.tables().events.get(&id).cloned())
    }

    async fn create_event(&self, event: &Event) -> StorageResult<Event> {
        let mut tables = self.tables();
        if tables.events.contains_key(&event.id) {
            return Err(StorageError::Conflict("Event already exists".to_string()));
        }
        tables.events.insert(event.id, event.clone());
        Ok(event.clone())
    }

    async fn create_session(&self, session: &Session) -> StorageResult<Session> {
        let mut tables = self.tables();
        if tables.sessions.contains_key(&session.id) {
            return Err(StorageError::Conflict("Session already exists".to_string()));
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn update_session_windows(
        &self,
        id: SessionId,
        windows: SessionWindows,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        let mut tables = self.tables();
        let has_attendance = tables
            .attendance
            .values()
            .any(|record| record.session_id == id);
        let Some(session) = tables.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if has_attendance {
            return Err(StorageError::Conflict(
                "Session windows cannot change once attendance exists".to_string(),
            ));
        }
        session.apply_windows(windows, now);
        Ok(Some(session.clone()))
    }

    async fn deactivate_session(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        let mut tables = self.tables();
        Ok(tables.sessions.get_mut(&id).map(|session| {
            session.is_active = false;
            session.updated_at = now;
            session.clone()
        }))
    }
}

#[async_trait]
impl StudentRepositoryTrait for InMemoryRepositories {
    async fn create_student(&self, student: &Student) -> StorageResult<Student> {
        let mut tables = self.tables();
        let taken = tables
            .students
            .values()
            .any(|existing| existing.student_id_number == student.student_id_number);
        if taken || tables.students.contains_key(&student.id) {
            return Err(StorageError::Conflict(
                "Student ID number is already registered".to_string(),
            ));
        }
        tables.students.insert(student.id, student.clone());
        Ok(student.clone())
    }

    async fn find_student(&self, id: StudentId) -> StorageResult<Option<Student>> {
        Ok(self.tables().students.get(&id).cloned())
    }

    async fn find_students(&self, ids: &[StudentId]) -> StorageResult<Vec<Student>> {
        let tables = self.tables();
        Ok(ids
            .iter()
            .filter_map(|id| tables.students.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl ActivityLogRepositoryTrait for InMemoryRepositories {
    async fn insert_activity(&self, activity: &ScanActivity) -> StorageResult<()> {
        self.tables().activity.push(activity.clone());
        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: SessionId,
        filters: ActivityLogFilters,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<ScanActivity>> {
        let mut rows: Vec<ScanActivity> = self
            .tables()
            .activity
            .iter()
            .filter(|entry| matches_filters(entry, session_id, &filters))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.occurred_at, b.id).cmp(&(a.occurred_at, a.id)));
        Ok(page(rows, limit, offset))
    }

    async fn count_activity(
        &self,
        session_id: SessionId,
        filters: ActivityLogFilters,
    ) -> StorageResult<i64> {
        let count = self
            .tables()
            .activity
            .iter()
            .filter(|entry| matches_filters(entry, session_id, &filters))
            .count();
        Ok(count as i64)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut tables = self.tables();
        let before = tables.activity.len();
        tables.activity.retain(|entry| entry.occurred_at >= cutoff);
        Ok((before - tables.activity.len()) as u64)
    }
}

fn matches_filters(entry: &ScanActivity, session_id: SessionId, filters: &ActivityLogFilters) -> bool {
    entry.session_id == Some(session_id)
        && filters
            .outcome_kind
            .as_deref()
            .map_or(true, |kind| entry.outcome.kind() == kind)
        && filters.from.map_or(true, |from| entry.occurred_at >= from)
        && filters.to.map_or(true, |to| entry.occurred_at < to)
}
