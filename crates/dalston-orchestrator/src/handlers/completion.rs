// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependent-promotion and job-completion-check logic shared by
//! `task.completed` and the `task.failed` skipped/advance paths (§4.6).

use std::collections::HashMap;

use dalston_core::id::JobId;
use dalston_core::job::{Job, JobStatus};
use dalston_core::task::{Task, TaskStatus};
use dalston_core::CoreResult;
use tracing::info;

use crate::common::{enqueue, finish_terminal, load_job};
use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

/// Shared tail of `task.completed` and the `task.failed` skipped/exhausted
/// paths (§4.6): if the job is cancelling, finish marking pending tasks
/// cancelled rather than promoting dependents; otherwise promote and
/// enqueue newly-ready dependents. Either way, finish with the job
/// completion check.
pub async fn advance_after_task_terminal(ctx: &AppCtx, job_id: JobId, request_id: Option<String>) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    let all_tasks = ctx.tasks.list_for_job(job_id).await.map_err(IntoCoreError::into_core_error)?;

    if job.status == JobStatus::Cancelling {
        let pending_ids: Vec<_> =
            all_tasks.iter().filter(|t| t.status == TaskStatus::Pending).map(|t| t.id).collect();
        for id in pending_ids {
            ctx.tasks
                .mark_terminal(id, TaskStatus::Cancelled, Some(Job::cancelled_error().to_string()), chrono::Utc::now())
                .await
                .map_err(IntoCoreError::into_core_error)?;
        }
    } else {
        promote_and_enqueue_ready(ctx, &job, &all_tasks, request_id).await?;
    }

    check_job_completion(ctx, job_id).await
}

/// Promote every `pending` task whose dependency set is now fully
/// terminal-success, and enqueue each (§4.6 `task.completed` step 2).
/// Idempotent: `promote_ready` only transitions tasks still `pending`, so a
/// replay against an already-promoted task is a no-op.
pub async fn promote_and_enqueue_ready(
    ctx: &AppCtx,
    job: &Job,
    all_tasks: &[Task],
    request_id: Option<String>,
) -> CoreResult<()> {
    let terminal: HashMap<_, _> =
        all_tasks.iter().filter(|t| t.status.is_terminal()).map(|t| (t.id, t.status)).collect();
    let candidates: Vec<_> = all_tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending && t.dependencies_satisfied(&terminal))
        .map(|t| t.id)
        .collect();

    let promoted = ctx.tasks.promote_ready(&candidates).await.map_err(IntoCoreError::into_core_error)?;
    for task in all_tasks.iter().filter(|t| promoted.contains(&t.id)) {
        enqueue(ctx, task, job, all_tasks, request_id.clone(), None).await?;
    }
    Ok(())
}

/// Load all tasks for a job and, if every one is in a terminal state,
/// decide and apply the job-level outcome (§4.6 "Job completion check").
/// A no-op if the job is already terminal or if any task remains
/// non-terminal.
pub async fn check_job_completion(ctx: &AppCtx, job_id: JobId) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    if job.status.is_terminal() {
        return Ok(());
    }

    let tasks = ctx.tasks.list_for_job(job_id).await.map_err(IntoCoreError::into_core_error)?;
    if !tasks.iter().all(|t| t.status.is_terminal()) {
        return Ok(());
    }

    if let Some(failed) = tasks.iter().find(|t| t.required && t.status == TaskStatus::Failed) {
        let error =
            failed.error.clone().unwrap_or_else(|| format!("required task '{}' failed", failed.stage));
        info!(%job_id, stage = %failed.stage, "required task failed, failing job");
        return finish_terminal(ctx, job_id, JobStatus::Failed, Some(error), None, None).await;
    }

    if job.status == JobStatus::Cancelling {
        info!(%job_id, "all tasks terminal while cancelling, job cancelled");
        return finish_terminal(ctx, job_id, JobStatus::Cancelled, Some(Job::cancelled_error().to_string()), None, None)
            .await;
    }

    let result = extract_result_summary(ctx, &tasks).await?;
    info!(%job_id, "all tasks terminal, job completed");
    finish_terminal(ctx, job_id, JobStatus::Completed, None, Some(result), None).await
}

/// Extract result summary stats from the `merge` stage's output artifact
/// (§4.6: "compute and persist result summary stats extracted from the
/// merge output"). Falls back to an empty summary if `merge` is missing or
/// its output can't be read, rather than failing a job that otherwise
/// succeeded.
async fn extract_result_summary(ctx: &AppCtx, tasks: &[Task]) -> CoreResult<dalston_core::job::ResultSummary> {
    let Some(merge) =
        tasks.iter().find(|t| t.base_stage() == "merge" && t.status == TaskStatus::Completed)
    else {
        return Ok(dalston_core::job::ResultSummary::default());
    };
    let Some(output_uri) = &merge.output_uri else {
        return Ok(dalston_core::job::ResultSummary::default());
    };

    let value = match ctx.artifacts.read_json(output_uri).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%output_uri, error = %e, "failed to read merge output for result summary");
            return Ok(dalston_core::job::ResultSummary::default());
        }
    };

    Ok(dalston_core::job::ResultSummary {
        language_code: value.get("language_code").and_then(|v| v.as_str()).map(str::to_string),
        word_count: value.get("word_count").and_then(|v| v.as_u64()),
        segment_count: value.get("segment_count").and_then(|v| v.as_u64()),
        speaker_count: value.get("speaker_count").and_then(|v| v.as_u64()),
        character_count: value.get("character_count").and_then(|v| v.as_u64()),
    })
}

#[cfg(test)]
#[path = "completion_tests.rs"]
mod tests;
