use async_trait::async_trait;

use super::{common::map_unique_violation, StorageResult};
use crate::db::connection::DbPool;
use crate::models::student::Student;
use crate::types::StudentId;
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "id, student_id_number, first_name, last_name, program_name, year, created_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StudentRepositoryTrait: Send + Sync {
    /// Insert a student; a taken `student_id_number` is a conflict.
    async fn create_student(&self, student: &Student) -> StorageResult<Student>;

    async fn find_student(&self, id: StudentId) -> StorageResult<Option<Student>>;

    /// Every student among `ids` that exists, in no particular order.
    async fn find_students(&self, ids: &[StudentId]) -> StorageResult<Vec<Student>>;
}

#[derive(Debug, Clone)]
pub struct StudentRepository {
    pool: DbPool,
}

impl StudentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentRepositoryTrait for StudentRepository {
    async fn create_student(&self, student: &Student) -> StorageResult<Student> {
        let query = format!(
            "INSERT INTO students (id, student_id_number, first_name, last_name, program_name, \
             year, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            SELECT_COLUMNS
        );
        sqlx::query_as::<_, Student>(&query)
            .bind(student.id)
            .bind(&student.student_id_number)
            .bind(&student.first_name)
            .bind(&student.last_name)
            .bind(&student.program_name)
            .bind(student.year)
            .bind(student.created_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|err| map_unique_violation(err, "Student ID number is already registered"))
    }

    async fn find_student(&self, id: StudentId) -> StorageResult<Option<Student>> {
        let query = format!("SELECT {} FROM students WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, Student>(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row)
    }

    async fn find_students(&self, ids: &[StudentId]) -> StorageResult<Vec<Student>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let query = format!("SELECT {} FROM students WHERE id = ANY($1)", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, Student>(&query)
            .bind(ids)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows)
    }
}
