//! SQLite-backed job store.
//!
//! ## Atomic claims
//!
//! `claim_next` is a single `UPDATE … RETURNING` statement guarded by
//! `status = 'queued'`, so two workers racing for the same row cannot both
//! win: the loser's update matches zero rows.
//!
//! ## Status updates
//!
//! `update_status` validates the transition against the stored status and
//! then writes with a compare-and-set on that status. A concurrent writer
//! makes the update match zero rows, which is reported as an invalid
//! transition from whatever status won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use jobgate_core::{JobId, UserId};

use crate::db::{Database, describe, is_unique_violation};

use super::store::{JobStats, JobStore, JobStoreError};
use super::types::{InvalidTransition, Job, JobStatus, ValueMap};

const JOB_COLUMNS: &str = "id, user_id, value_map, status, error, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn current_status(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        let row = sqlx::query("SELECT status FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| storage("read status", e))?;

        row.map(|r| {
            let raw: String = r.try_get("status").map_err(|e| storage("read status", e))?;
            parse_status(&raw)
        })
        .transpose()
    }
}

fn storage(operation: &str, err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(describe(operation, &err))
}

fn parse_status(raw: &str) -> Result<JobStatus, JobStoreError> {
    raw.parse()
        .map_err(|e| JobStoreError::Storage(format!("corrupt job status: {e}")))
}

fn job_from_row(row: &SqliteRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| storage("decode job", e);
    let id: String = row.try_get("id").map_err(decode)?;
    let user_id: String = row.try_get("user_id").map_err(decode)?;
    let value_map: String = row.try_get("value_map").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    let value_map: ValueMap = serde_json::from_str(&value_map)
        .map_err(|e| JobStoreError::Storage(format!("corrupt value map: {e}")))?;

    Ok(Job {
        id: id
            .parse()
            .map_err(|e| JobStoreError::Storage(format!("corrupt job id: {e}")))?,
        user_id: user_id
            .parse()
            .map_err(|e| JobStoreError::Storage(format!("corrupt job owner: {e}")))?,
        value_map,
        status: parse_status(&status)?,
        error: row.try_get("error").map_err(decode)?,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        let value_map = serde_json::to_string(&job.value_map)
            .map_err(|e| JobStoreError::Storage(format!("value map serialization failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, user_id, value_map, status, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.user_id.to_string())
        .bind(value_map)
        .bind(job.status.as_str())
        .bind(job.error.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                storage("insert job", e)
            }
        })?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| storage("get job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<(), JobStoreError> {
        let current = self
            .current_status(id)
            .await?
            .ok_or(JobStoreError::NotFound(id))?;

        if !current.can_transition_to(status) {
            return Err(JobStoreError::InvalidTransition {
                id,
                source: InvalidTransition {
                    from: current,
                    to: status,
                },
            });
        }

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(current.as_str())
        .execute(self.db.pool())
        .await
        .map_err(|e| storage("update status", e))?;

        if result.rows_affected() == 0 {
            let from = self
                .current_status(id)
                .await?
                .ok_or(JobStoreError::NotFound(id))?;
            return Err(JobStoreError::InvalidTransition {
                id,
                source: InvalidTransition { from, to: status },
            });
        }
        Ok(())
    }

    async fn record_error(&self, id: JobId, message: &str) -> Result<(), JobStoreError> {
        let result = sqlx::query("UPDATE jobs SET error = ?, updated_at = ? WHERE id = ?")
            .bind(message)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(self.db.pool())
            .await
            .map_err(|e| storage("record error", e))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs SET status = 'running', updated_at = ?
            WHERE seq = (SELECT seq FROM jobs WHERE status = 'queued' ORDER BY seq LIMIT 1)
              AND status = 'queued'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Utc::now())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| storage("claim next job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_for_owner(&self, user_id: UserId) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE user_id = ? ORDER BY seq ASC"
        ))
        .bind(user_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| storage("list jobs", e))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn requeue_stranded(&self) -> Result<usize, JobStoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', updated_at = ? WHERE status = 'running'",
        )
        .bind(Utc::now())
        .execute(self.db.pool())
        .await
        .map_err(|e| storage("requeue stranded jobs", e))?;

        Ok(result.rows_affected() as usize)
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| storage("job stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| storage("job stats", e))?;
            let n: i64 = row.try_get("n").map_err(|e| storage("job stats", e))?;
            stats.add(parse_status(&status)?, n.max(0) as usize);
        }
        Ok(stats)
    }
}
