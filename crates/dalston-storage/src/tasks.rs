// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tasks` table access.

use crate::rows::{dependencies_json, TaskRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dalston_core::id::{JobId, TaskId};
use dalston_core::task::{Task, TaskStatus};
use sqlx::{PgPool, Postgres, Transaction};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert every task for a job in one transaction (§4.5 step 2:
    /// "persist all task rows atomically").
    async fn insert_all(&self, tasks: &[Task]) -> sqlx::Result<()>;

    async fn get(&self, id: TaskId) -> sqlx::Result<Option<Task>>;
    async fn list_for_job(&self, job_id: JobId) -> sqlx::Result<Vec<Task>>;

    /// Whether any task row already exists for `job_id` — used by the
    /// scheduler's `job.created` idempotency check (§4.5 step 1).
    async fn exists_for_job(&self, job_id: JobId) -> sqlx::Result<bool>;

    /// Conditional status transition: succeeds only if the row's current
    /// status is `from`. Returns whether it was applied.
    async fn transition(&self, id: TaskId, from: TaskStatus, to: TaskStatus) -> sqlx::Result<bool>;

    /// `ready -> running`, setting `started_at` on first claim (§4.6).
    async fn mark_running(&self, id: TaskId) -> sqlx::Result<bool>;

    /// Any state -> `completed`, clearing a residual error from a prior
    /// failed attempt (§4.6: "task.completed ... clears any residual
    /// error").
    async fn mark_completed(&self, id: TaskId, output_uri: &str, completed_at: DateTime<Utc>) -> sqlx::Result<()>;

    /// `running -> ready`, incrementing `retries` (the in-place retry path).
    async fn mark_retry_ready(&self, id: TaskId) -> sqlx::Result<()>;

    /// Any state -> `failed`/`skipped`/`cancelled`, with an error string and
    /// `completed_at` set.
    async fn mark_terminal(
        &self,
        id: TaskId,
        status: TaskStatus,
        error: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> sqlx::Result<()>;

    /// `pending -> ready` for every task in `ids` whose current status is
    /// `pending` (used for dependent-promotion and cancellation sweeps);
    /// returns the ids actually transitioned.
    async fn promote_ready(&self, ids: &[TaskId]) -> sqlx::Result<Vec<TaskId>>;

    /// `pending`/`ready -> cancelled` for every non-terminal task of a job
    /// (§4.6 cancel path). Returns the ids actually transitioned.
    async fn cancel_non_terminal(&self, job_id: JobId) -> sqlx::Result<Vec<TaskId>>;

    async fn set_input_uri(&self, id: TaskId, input_uri: &str) -> sqlx::Result<()>;

    /// Delete every task row for a job (§6 `retry_job` resets task state so
    /// a re-emitted `job.created` rebuilds the DAG from scratch;
    /// `delete_job` purges them as part of removing the job entirely).
    async fn delete_for_job(&self, job_id: JobId) -> sqlx::Result<()>;

    /// Distinct stage names among `ready`/`running` tasks — the only tasks
    /// that can have a live PEL entry, so this bounds the reconciler's
    /// per-stage PEL enumeration to streams actually in use (§4.7 step 1).
    async fn distinct_active_stages(&self) -> sqlx::Result<Vec<String>>;

    /// `running` tasks whose `started_at` predates `cutoff` — candidates
    /// for the reconciler's orphaned-task check (§4.7 step 2).
    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> sqlx::Result<Vec<Task>>;
}

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_one(tx: &mut Transaction<'_, Postgres>, task: &Task) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, job_id, stage, engine_id, status, dependencies, config,
                input_uri, output_uri, retries, max_retries, required, error,
                started_at, completed_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
            )
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.job_id.as_uuid())
        .bind(&task.stage)
        .bind(task.engine_id.as_str())
        .bind(task.status.to_string())
        .bind(dependencies_json(task))
        .bind(serde_json::to_value(&task.config).unwrap_or_default())
        .bind(&task.input_uri)
        .bind(&task.output_uri)
        .bind(task.retries as i32)
        .bind(task.max_retries as i32)
        .bind(task.required)
        .bind(&task.error)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert_all(&self, tasks: &[Task]) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            Self::insert_one(&mut tx, task).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: TaskId) -> sqlx::Result<Option<Task>> {
        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE id = $1").bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_for_job(&self, job_id: JobId) -> sqlx::Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn exists_for_job(&self, job_id: JobId) -> sqlx::Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT count(*) FROM tasks WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(n,)| n > 0).unwrap_or(false))
    }

    async fn transition(&self, id: TaskId, from: TaskStatus, to: TaskStatus) -> sqlx::Result<bool> {
        let result = sqlx::query("UPDATE tasks SET status = $1 WHERE id = $2 AND status = $3")
            .bind(to.to_string())
            .bind(id.as_uuid())
            .bind(from.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_running(&self, id: TaskId) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'running', started_at = now() \
             WHERE id = $1 AND status = 'ready'",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(&self, id: TaskId, output_uri: &str, completed_at: DateTime<Utc>) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'completed', output_uri = $1, error = NULL, completed_at = $2 \
             WHERE id = $3",
        )
        .bind(output_uri)
        .bind(completed_at)
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_retry_ready(&self, id: TaskId) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'ready', retries = retries + 1, started_at = NULL \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_terminal(
        &self,
        id: TaskId,
        status: TaskStatus,
        error: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query("UPDATE tasks SET status = $1, error = $2, completed_at = $3 WHERE id = $4")
            .bind(status.to_string())
            .bind(error)
            .bind(completed_at)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn promote_ready(&self, ids: &[TaskId]) -> sqlx::Result<Vec<TaskId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "UPDATE tasks SET status = 'ready' WHERE id = ANY($1) AND status = 'pending' RETURNING id",
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| TaskId::from(id)).collect())
    }

    async fn cancel_non_terminal(&self, job_id: JobId) -> sqlx::Result<Vec<TaskId>> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "UPDATE tasks SET status = 'cancelled', completed_at = now() \
             WHERE job_id = $1 AND status IN ('pending', 'ready') RETURNING id",
        )
        .bind(job_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| TaskId::from(id)).collect())
    }

    async fn set_input_uri(&self, id: TaskId, input_uri: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE tasks SET input_uri = $1 WHERE id = $2")
            .bind(input_uri)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_job(&self, job_id: JobId) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM tasks WHERE job_id = $1").bind(job_id.as_uuid()).execute(&self.pool).await?;
        Ok(())
    }

    async fn distinct_active_stages(&self) -> sqlx::Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT stage FROM tasks WHERE status IN ('ready', 'running')")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(stage,)| stage).collect())
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> sqlx::Result<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE status = 'running' AND started_at < $1")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }
}
