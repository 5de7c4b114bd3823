// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `jobs` table access.

use crate::rows::JobRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dalston_core::id::JobId;
use dalston_core::job::{Job, JobStatus};
use sqlx::PgPool;

/// Persistence operations the orchestration core needs against the `jobs`
/// table. The core never touches `retention_policies`, `audit_log`, or the
/// webhook tables — those are the gateway's responsibility (§6).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> sqlx::Result<()>;
    async fn get(&self, id: JobId) -> sqlx::Result<Option<Job>>;

    /// Conditional transition used by `job.created`'s scheduler handler and
    /// by cancellation: only succeeds if the row's current status is in
    /// `from`. Returns whether the row was updated.
    async fn transition_status(
        &self,
        id: JobId,
        from: &[JobStatus],
        to: JobStatus,
        set_started_at: bool,
    ) -> sqlx::Result<bool>;

    /// Unconditional terminal transition used by the job-completion check
    /// (§4.6); callers have already verified all tasks are terminal.
    async fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        completed_at: DateTime<Utc>,
        error: Option<String>,
        result: Option<dalston_core::job::ResultSummary>,
        purge_after: Option<DateTime<Utc>>,
    ) -> sqlx::Result<()>;

    async fn set_error(&self, id: JobId, error: &str) -> sqlx::Result<()>;

    /// Reset a failed job back to `pending` for a retry attempt (§6
    /// `retry_job`): clears the error and terminal timestamps, bumps
    /// `retry_count`. Task rows are reset separately via
    /// [`crate::tasks::TaskStore::delete_for_job`] so `job.created` can
    /// rebuild the DAG from scratch.
    async fn reset_for_retry(&self, id: JobId, retry_count: u32) -> sqlx::Result<()>;

    /// Delete the job row (§6 `delete_job`); only called once the caller
    /// has verified the job is terminal.
    async fn delete(&self, id: JobId) -> sqlx::Result<()>;
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, tenant_id, status, audio_uri, parameters,
                audio_format, audio_duration, audio_sample_rate, audio_channels, audio_bit_depth,
                created_at, started_at, completed_at, error,
                retention_mode, retention_hours, purge_after,
                retry_count, max_retries, webhook_url,
                result_language_code, result_word_count, result_segment_count,
                result_speaker_count, result_character_count
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14,
                $15, $16, $17,
                $18, $19, $20,
                $21, $22, $23, $24, $25
            )
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.tenant_id)
        .bind(job.status.to_string())
        .bind(&job.audio_uri)
        .bind(serde_json::to_value(&job.parameters).unwrap_or_default())
        .bind(&job.audio.format)
        .bind(job.audio.duration_seconds)
        .bind(job.audio.sample_rate.map(|v| v as i32))
        .bind(job.audio.channels.map(|v| v as i32))
        .bind(job.audio.bit_depth.map(|v| v as i32))
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error)
        .bind(job.retention_mode.to_string())
        .bind(job.retention_hours.map(|v| v as i32))
        .bind(job.purge_after)
        .bind(job.retry_count as i32)
        .bind(job.max_retries as i32)
        .bind(&job.webhook_url)
        .bind(&job.result.language_code)
        .bind(job.result.word_count.map(|v| v as i64))
        .bind(job.result.segment_count.map(|v| v as i64))
        .bind(job.result.speaker_count.map(|v| v as i64))
        .bind(job.result.character_count.map(|v| v as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> sqlx::Result<Option<Job>> {
        let row: Option<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.map(Job::try_from).transpose()
    }

    async fn transition_status(
        &self,
        id: JobId,
        from: &[JobStatus],
        to: JobStatus,
        set_started_at: bool,
    ) -> sqlx::Result<bool> {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();
        let result = if set_started_at {
            sqlx::query(
                "UPDATE jobs SET status = $1, started_at = now() \
                 WHERE id = $2 AND status = ANY($3)",
            )
            .bind(to.to_string())
            .bind(id.as_uuid())
            .bind(&from)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query("UPDATE jobs SET status = $1 WHERE id = $2 AND status = ANY($3)")
                .bind(to.to_string())
                .bind(id.as_uuid())
                .bind(&from)
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected() > 0)
    }

    async fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        completed_at: DateTime<Utc>,
        error: Option<String>,
        result: Option<dalston_core::job::ResultSummary>,
        purge_after: Option<DateTime<Utc>>,
    ) -> sqlx::Result<()> {
        let result = result.unwrap_or_default();
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = $1, completed_at = $2, error = $3, purge_after = $4,
                result_language_code = $5, result_word_count = $6,
                result_segment_count = $7, result_speaker_count = $8,
                result_character_count = $9
            WHERE id = $10
            "#,
        )
        .bind(status.to_string())
        .bind(completed_at)
        .bind(error)
        .bind(purge_after)
        .bind(result.language_code)
        .bind(result.word_count.map(|v| v as i64))
        .bind(result.segment_count.map(|v| v as i64))
        .bind(result.speaker_count.map(|v| v as i64))
        .bind(result.character_count.map(|v| v as i64))
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_error(&self, id: JobId, error: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE jobs SET error = $1 WHERE id = $2")
            .bind(error)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_for_retry(&self, id: JobId, retry_count: u32) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'pending', error = NULL, started_at = NULL, completed_at = NULL, \
             purge_after = NULL, retry_count = $1 WHERE id = $2",
        )
        .bind(retry_count as i32)
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: JobId) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1").bind(id.as_uuid()).execute(&self.pool).await?;
        Ok(())
    }
}
