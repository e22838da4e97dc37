//! Shared repository utilities.

use sqlx::{Postgres, QueryBuilder};
use std::future::Future;
use std::time::Duration;

use super::{StorageError, StorageResult};

/// Appends WHERE or AND to the query builder depending on whether a clause has already been added.
pub fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, has_clause: &mut bool) {
    if *has_clause {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_clause = true;
    }
}

/// Maps unique-constraint violations to [`StorageError::Conflict`].
pub fn map_unique_violation(err: sqlx::Error, message: &str) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StorageError::Conflict(message.to_string())
        }
        _ => StorageError::Unavailable(err),
    }
}

/// Bounds a repository call; an elapsed deadline becomes [`StorageError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(limit)),
    }
}
