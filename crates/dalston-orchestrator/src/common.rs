// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers shared between the scheduler and the event handlers: enqueueing
//! a ready task (§4.5), the engine-unavailable immediate-fail path, and the
//! decrement-once guard around a job's terminal side effects (§4.6).

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use dalston_core::id::{EngineId, JobId, TaskId};
use dalston_core::job::{Job, JobStatus, ResultSummary};
use dalston_core::task::{Task, TaskStatus};
use dalston_core::{CoreError, CoreResult, EngineError};
use dalston_queue::EnqueueFields;
use dalston_wire::Event;
use tracing::warn;

use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

/// Write the input artifact, verify a capable live engine, and append to
/// the stage's stream (§4.5 "Enqueue"). `retry_attempt` is `Some` only for
/// the reconciler's stale-task recovery and the in-place retry path; it
/// mints the `dalston:task:retry-enqueue:{task_id}:{attempt}` idempotency
/// key so a redelivered recovery doesn't double-enqueue.
pub async fn enqueue(
    ctx: &AppCtx,
    task: &Task,
    job: &Job,
    all_tasks: &[Task],
    request_id: Option<String>,
    retry_attempt: Option<u32>,
) -> CoreResult<()> {
    let required: Vec<String> = vec![task.base_stage().to_string()];
    let capable = ctx
        .registry
        .has_capable_live_instance(&task.engine_id, &required)
        .await
        .map_err(IntoCoreError::into_core_error)?;

    if !capable {
        let err = EngineError {
            engine_id: task.engine_id.as_str().to_string(),
            stage: task.stage.clone(),
            requirements: required,
            reason: "no live instance declares the required capabilities".to_string(),
        };
        warn!(job_id = %job.id, task_id = %task.id, stage = %task.stage, "no capable live engine, failing job immediately");
        fail_job_immediately(ctx, job.id, err.to_error_string(), request_id).await?;
        return Ok(());
    }

    let input_uri = format!("s3://dalston/{}/{}/input.json", job.id, task.id);
    let input_value = build_input_artifact(job, task, all_tasks);
    ctx.artifacts.write_json(&input_uri, &input_value).await.map_err(IntoCoreError::into_core_error)?;
    ctx.tasks.set_input_uri(task.id, &input_uri).await.map_err(IntoCoreError::into_core_error)?;

    let fields = EnqueueFields {
        task_id: task.id,
        job_id: job.id,
        engine_id: task.engine_id.clone(),
        timeout_at: dalston_queue::default_timeout_at(Utc::now()),
        request_id: request_id.clone(),
    };
    let idempotency_key = retry_attempt.map(|attempt| format!("dalston:task:retry-enqueue:{}:{attempt}", task.id));
    ctx.queue.add(&task.stage, fields, idempotency_key.as_deref()).await.map_err(IntoCoreError::into_core_error)?;
    Ok(())
}

/// Assemble a task's input pointer: the job's original audio reference plus
/// every dependency's output, keyed by stage name and also aliased under
/// the dependency's channel-agnostic base stage (§4.5 "Input resolution").
fn build_input_artifact(job: &Job, task: &Task, all_tasks: &[Task]) -> serde_json::Value {
    let mut previous_outputs = serde_json::Map::new();
    for dep_id in &task.dependencies {
        let Some(dep) = all_tasks.iter().find(|t| t.id == *dep_id) else { continue };
        let output = dep.output_uri.clone().map(serde_json::Value::String).unwrap_or(serde_json::Value::Null);
        previous_outputs.insert(dep.stage.clone(), output.clone());
        if dep.base_stage() != dep.stage {
            previous_outputs.insert(dep.base_stage().to_string(), output);
        }
    }
    serde_json::json!({
        "audio_uri": job.audio_uri,
        "audio": job.audio,
        "config": task.config,
        "previous_outputs": previous_outputs,
    })
}

/// Every catalog runtime plus the hardcoded fallback engines, each resolved
/// to the union of capabilities its live instances declare. Fed to
/// `dalston_dag::build_task_dag` as `DagInputs::live_capabilities`; built
/// here rather than inside `dalston-dag` so that crate stays free of any
/// broker dependency.
pub async fn snapshot_live_capabilities(ctx: &AppCtx) -> CoreResult<HashMap<EngineId, HashSet<String>>> {
    let mut engine_ids: HashSet<EngineId> = ctx.catalog.entries().iter().map(|e| e.runtime.clone()).collect();
    engine_ids.insert(ctx.default_engines.prepare.clone());
    engine_ids.insert(ctx.default_engines.transcribe.clone());
    engine_ids.insert(ctx.default_engines.align.clone());
    engine_ids.insert(ctx.default_engines.diarize.clone());
    engine_ids.insert(ctx.default_engines.merge.clone());

    let mut live = HashMap::new();
    for engine_id in engine_ids {
        let instances = ctx.registry.list_instances(&engine_id).await.map_err(IntoCoreError::into_core_error)?;
        if instances.is_empty() {
            continue;
        }
        let caps: HashSet<String> = instances.iter().flat_map(|i| i.capabilities.iter().cloned()).collect();
        live.insert(engine_id, caps);
    }
    Ok(live)
}

/// SET-NX on `dalston:decremented:{job_id}`: returns `true` only for the
/// caller that wins the race to perform a job's terminal side effects
/// (counter decrement, `finish` write, event publish) exactly once (§4.6).
pub async fn decrement_once(ctx: &AppCtx, job_id: JobId) -> CoreResult<bool> {
    ctx.guard
        .try_acquire(&dalston_queue::decrement_once_key(job_id), dalston_queue::DECREMENT_ONCE_TTL)
        .await
        .map_err(IntoCoreError::into_core_error)
}

/// Unconditional terminal finish: decrement-once-guarded counter
/// adjustment, `jobs.finish` write, and exactly-once event publish (§4.6
/// "Job completion check"). Shared by the generic completion check, the
/// immediate engine-unavailable/retry-exhausted fail path, and
/// cancellation's immediate-terminal case.
pub async fn finish_terminal(
    ctx: &AppCtx,
    job_id: JobId,
    status: JobStatus,
    error: Option<String>,
    result: Option<ResultSummary>,
    request_id: Option<String>,
) -> CoreResult<()> {
    if !decrement_once(ctx, job_id).await? {
        return Ok(());
    }

    let now = Utc::now();
    let job = load_job(ctx, job_id).await?;
    let purge_after = job.compute_purge_after(now);
    ctx.jobs
        .finish(job_id, status, now, error.clone(), result, purge_after)
        .await
        .map_err(IntoCoreError::into_core_error)?;
    ctx.concurrency.decrement(&job.tenant_id).await.map_err(IntoCoreError::into_core_error)?;

    let event = match status {
        JobStatus::Completed => Event::JobCompleted { job_id, request_id },
        JobStatus::Failed => Event::JobFailed { job_id, error: error.unwrap_or_default(), request_id },
        JobStatus::Cancelled => Event::JobCancelled { job_id, request_id },
        _ => return Ok(()),
    };
    ctx.bus.publish(&event).await.map_err(IntoCoreError::into_core_error)?;
    Ok(())
}

/// Immediate job-fail path (§4.5 engine-unavailable, §4.6 task.failed
/// exhausted+required, and task.failed's `failed`-replay side effects):
/// cancel the job's remaining non-terminal tasks, finish it as `failed`,
/// and publish exactly once. A no-op if the job is already terminal, so
/// replays (including the deliberate "re-run job-fail side effects" replay
/// case) are safe.
pub async fn fail_job_immediately(
    ctx: &AppCtx,
    job_id: JobId,
    error: String,
    request_id: Option<String>,
) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    if job.status.is_terminal() {
        return Ok(());
    }

    ctx.tasks.cancel_non_terminal(job_id).await.map_err(IntoCoreError::into_core_error)?;
    finish_terminal(ctx, job_id, JobStatus::Failed, Some(error), None, request_id).await
}

/// Load the job, returning [`CoreError::JobNotFound`] if it's gone.
pub async fn load_job(ctx: &AppCtx, job_id: JobId) -> CoreResult<Job> {
    ctx.jobs.get(job_id).await.map_err(IntoCoreError::into_core_error)?.ok_or(CoreError::JobNotFound(job_id))
}
