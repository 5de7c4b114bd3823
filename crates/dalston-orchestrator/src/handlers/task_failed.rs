// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `task.failed` (§4.6): retry policy, exhaustion, and the full set of
//! replay branches the at-least-once delivery model requires.

use chrono::Utc;
use dalston_core::id::{JobId, TaskId};
use dalston_core::task::TaskStatus;
use dalston_core::{CoreError, CoreResult};
use tracing::{info, warn};

use super::completion::advance_after_task_terminal;
use crate::common::{enqueue, fail_job_immediately, load_job};
use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

pub async fn handle(
    ctx: &AppCtx,
    task_id: TaskId,
    job_id: JobId,
    error: String,
    request_id: Option<String>,
) -> CoreResult<()> {
    let task = ctx.tasks.get(task_id).await.map_err(IntoCoreError::into_core_error)?.ok_or(CoreError::TaskNotFound(task_id))?;

    match task.status {
        TaskStatus::Running => {
            if !task.retries_exhausted() {
                ctx.tasks.mark_retry_ready(task_id).await.map_err(IntoCoreError::into_core_error)?;
                return requeue(ctx, task_id, job_id, task.retries + 1, request_id).await;
            }
            if task.required {
                ctx.tasks
                    .mark_terminal(task_id, TaskStatus::Failed, Some(error.clone()), Utc::now())
                    .await
                    .map_err(IntoCoreError::into_core_error)?;
                fail_job_immediately(ctx, job_id, error, request_id).await
            } else {
                ctx.tasks
                    .mark_terminal(task_id, TaskStatus::Skipped, Some(error), Utc::now())
                    .await
                    .map_err(IntoCoreError::into_core_error)?;
                advance_after_task_terminal(ctx, job_id, request_id).await
            }
        }
        TaskStatus::Ready => {
            info!(%job_id, %task_id, "task.failed replay against an already-retried task, re-enqueueing without incrementing");
            requeue(ctx, task_id, job_id, task.retries, request_id).await
        }
        TaskStatus::Skipped => {
            info!(%job_id, %task_id, "task.failed replay against an already-skipped task, advancing dependents");
            advance_after_task_terminal(ctx, job_id, request_id).await
        }
        TaskStatus::Failed => {
            info!(%job_id, %task_id, "task.failed replay against an already-failed task, re-running job-fail side effects");
            fail_job_immediately(ctx, job_id, task.error.clone().unwrap_or(error), request_id).await
        }
        TaskStatus::Pending => {
            warn!(%job_id, %task_id, "task.failed for a pending (unclaimed) task, ignoring as out-of-order");
            Ok(())
        }
        TaskStatus::Completed | TaskStatus::Cancelled => {
            info!(%job_id, %task_id, status = %task.status, "task.failed against a settled task, ignoring");
            Ok(())
        }
    }
}

/// Re-enqueue a `ready` task using the retry idempotency key
/// `dalston:task:retry-enqueue:{task_id}:{attempt}`, so a redelivered
/// recovery doesn't double-enqueue (§4.6).
async fn requeue(ctx: &AppCtx, task_id: TaskId, job_id: JobId, attempt: u32, request_id: Option<String>) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    let task = ctx.tasks.get(task_id).await.map_err(IntoCoreError::into_core_error)?.ok_or(CoreError::TaskNotFound(task_id))?;
    let all_tasks = ctx.tasks.list_for_job(job_id).await.map_err(IntoCoreError::into_core_error)?;
    enqueue(ctx, &task, &job, &all_tasks, request_id, Some(attempt)).await
}

#[cfg(test)]
#[path = "task_failed_tests.rs"]
mod tests;
