// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `job.created` handling: DAG construction, atomic task persistence, and
//! the root-task enqueue fan-out (§4.5).

use dalston_core::id::JobId;
use dalston_core::job::{Job, JobStatus};
use dalston_core::task::Task;
use dalston_core::CoreResult;
use dalston_dag::{build_task_dag, DagInputs, SpeakerDetection, SpeakerHints, TimestampGranularity};
use tracing::{info, warn};

use crate::common::{enqueue, load_job, snapshot_live_capabilities};
use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

/// Handle a `job.created` event.
///
/// 1. Load the job; an already-terminal/cancelling job, or one that
///    already has task rows, means this is a replay and we return.
/// 2. Build the DAG and persist every task row atomically as `pending`.
/// 3. Transition the job to `running`, stamping `started_at`.
/// 4. Promote every dependency-free task to `ready` and enqueue it.
pub async fn handle_job_created(ctx: &AppCtx, job_id: JobId, request_id: Option<String>) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;

    if job.status.is_terminal() || job.status == JobStatus::Cancelling {
        info!(%job_id, status = %job.status, "job.created replay against a terminal/cancelling job, ignoring");
        return Ok(());
    }
    if ctx.tasks.exists_for_job(job_id).await.map_err(IntoCoreError::into_core_error)? {
        info!(%job_id, "job.created replay: task rows already exist, ignoring");
        return Ok(());
    }

    let live_capabilities = snapshot_live_capabilities(ctx).await?;
    let inputs = dag_inputs(&job, live_capabilities);
    let tasks = build_task_dag(job_id, &inputs, &ctx.catalog, &ctx.default_engines)
        .map_err(|e| dalston_core::CoreError::InvariantViolation(e.to_string()))?;

    ctx.tasks.insert_all(&tasks).await.map_err(IntoCoreError::into_core_error)?;
    ctx.jobs
        .transition_status(job_id, &[JobStatus::Pending], JobStatus::Running, true)
        .await
        .map_err(IntoCoreError::into_core_error)?;

    enqueue_roots(ctx, &job, &tasks, request_id).await
}

/// Promote and enqueue every dependency-free task in a freshly-built DAG.
/// Split out so the retry path (§6 `retry_job`) can reuse it once task
/// states have been reset without re-running DAG construction.
pub async fn enqueue_roots(ctx: &AppCtx, job: &Job, tasks: &[Task], request_id: Option<String>) -> CoreResult<()> {
    let root_ids: Vec<_> = tasks.iter().filter(|t| t.dependencies.is_empty()).map(|t| t.id).collect();
    let promoted = ctx.tasks.promote_ready(&root_ids).await.map_err(IntoCoreError::into_core_error)?;

    for task in tasks.iter().filter(|t| promoted.contains(&t.id)) {
        enqueue(ctx, task, job, tasks, request_id.clone(), None).await?;
    }
    Ok(())
}

/// Translate a job's `parameters` map into DAG builder inputs (§4.4).
/// Absent or unrecognized `timestamps_granularity` falls back to word-level
/// timestamps (and therefore the `align` stage) to match the original's
/// `else: word_timestamps = True` default; an unrecognized value is logged
/// as a warning rather than silently treated as `none`. Absent/unrecognized
/// `speaker_detection` falls back to the single-speaker default pipeline
/// (`prepare -> transcribe -> align -> merge`).
fn dag_inputs(job: &Job, live_capabilities: std::collections::HashMap<dalston_core::id::EngineId, std::collections::HashSet<String>>) -> DagInputs {
    let params = &job.parameters;

    let model_id = params.get("model_id").and_then(|v| v.as_str()).unwrap_or("whisper-large").to_string();

    let timestamps_granularity = match params.get("timestamps_granularity").and_then(|v| v.as_str()) {
        Some("word") | None => TimestampGranularity::Word,
        Some("segment") => TimestampGranularity::Segment,
        Some("none") => TimestampGranularity::None,
        Some(other) => {
            warn!(job_id = %job.id, value = %other, "unknown timestamps_granularity, defaulting to word");
            TimestampGranularity::Word
        }
    };

    let speaker_detection = match params.get("speaker_detection").and_then(|v| v.as_str()) {
        Some("diarize") => SpeakerDetection::Diarize,
        Some("per_channel") => SpeakerDetection::PerChannel,
        _ => SpeakerDetection::None,
    };

    let channel_count = job.audio.channels.unwrap_or(1).max(1);

    let speaker_hints = SpeakerHints {
        num_speakers: params.get("num_speakers").and_then(|v| v.as_u64()).map(|n| n as u32),
        min_speakers: params.get("min_speakers").and_then(|v| v.as_u64()).map(|n| n as u32),
        max_speakers: params.get("max_speakers").and_then(|v| v.as_u64()).map(|n| n as u32),
    };

    let diarize_required = params.get("diarize_required").and_then(|v| v.as_bool()).unwrap_or(true);

    DagInputs { model_id, timestamps_granularity, speaker_detection, channel_count, speaker_hints, diarize_required, live_capabilities }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
