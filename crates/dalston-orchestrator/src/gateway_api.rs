// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway -> core boundary (§6): the four functions an out-of-scope HTTP
//! gateway calls into this crate with. Each is intentionally thin — it
//! persists/validates synchronously and publishes a lifecycle event, while
//! the actual state-machine work happens when `dalston-orchestrator`'s own
//! durable-stream consumer loop (see `main.rs`) replays that event through
//! [`crate::handlers::dispatch`] or [`crate::scheduler`]. This mirrors the
//! one boundary the distilled spec describes in full: "gateway persists a
//! `Job` row and publishes `job.created`" is *all* `submit_job` does; DAG
//! construction happens downstream.

use chrono::Utc;
use dalston_core::id::JobId;
use dalston_core::job::{AudioMetadata, Job, JobStatus, RetentionMode};
use dalston_core::{CoreError, CoreResult};
use dalston_wire::Event;
use std::collections::HashMap;
use tracing::info;

use crate::common::load_job;
use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

/// Retention policy as supplied by the gateway at submission time (§6,
/// §4.6 "Retention"). `hours` is only meaningful for `AutoDelete`.
#[derive(Debug, Clone)]
pub struct RetentionRequest {
    pub mode: RetentionMode,
    pub hours: Option<u32>,
}

/// `submit_job(tenant_id, audio_uri, parameters, audio_metadata, retention)`
/// (§6): synchronously persists the job row and publishes `job.created`.
/// Increments the tenant's concurrent-job counter at acceptance (§5
/// "Backpressure"); the matching decrement happens exactly once, at the
/// job's terminal transition, via `common::finish_terminal`.
#[allow(clippy::too_many_arguments)]
pub async fn submit_job(
    ctx: &AppCtx,
    tenant_id: String,
    audio_uri: String,
    parameters: HashMap<String, serde_json::Value>,
    audio: AudioMetadata,
    retention: RetentionRequest,
    max_retries: u32,
    webhook_url: Option<String>,
    request_id: Option<String>,
) -> CoreResult<JobId> {
    let job = Job {
        id: JobId::new(),
        tenant_id: tenant_id.clone(),
        status: JobStatus::Pending,
        audio_uri,
        parameters,
        audio,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        error: None,
        retention_mode: retention.mode,
        retention_hours: retention.hours,
        purge_after: None,
        retry_count: 0,
        max_retries,
        webhook_url,
        result: Default::default(),
    };

    ctx.jobs.insert(&job).await.map_err(IntoCoreError::into_core_error)?;
    ctx.concurrency.increment(&tenant_id).await.map_err(IntoCoreError::into_core_error)?;
    info!(job_id = %job.id, %tenant_id, "job submitted");

    let event = Event::JobCreated { job_id: job.id, request_id };
    ctx.bus.publish(&event).await.map_err(IntoCoreError::into_core_error)?;
    Ok(job.id)
}

/// `cancel_job(job_id, tenant_id)` (§6): validates tenant ownership and
/// that the job isn't already terminal, then publishes
/// `job.cancel_requested`. The actual task/job mutation of §4.6 happens in
/// [`crate::handlers::cancel`] when this orchestrator (or whichever
/// instance's consumer group read wins) processes the durable event — kept
/// out of this function so cancellation goes through the same idempotent,
/// at-least-once-safe path regardless of whether it was triggered here or
/// replayed after a crash.
pub async fn cancel_job(ctx: &AppCtx, job_id: JobId, tenant_id: &str, request_id: Option<String>) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    if job.tenant_id != tenant_id {
        return Err(CoreError::TenantMismatch(job_id));
    }
    if job.status.is_terminal() {
        info!(%job_id, "cancel_job against an already-terminal job, ignoring");
        return Ok(());
    }

    let event = Event::JobCancelRequested { job_id, request_id };
    ctx.bus.publish(&event).await.map_err(IntoCoreError::into_core_error)
}

/// `retry_job(job_id)` (§6): only permitted when the job is `failed`, its
/// retry count is below `max_retries`, and its source audio hasn't been
/// purged by retention. Resets task state and re-emits `job.created` so the
/// scheduler rebuilds the DAG from scratch.
///
/// Audio reachability is approximated here as "retention hasn't purged it
/// yet" (`purge_after` unset or still in the future) — the only signal the
/// core itself owns; the gateway's object-storage existence check is a
/// stronger guarantee layered on top, out of scope for this crate.
pub async fn retry_job(ctx: &AppCtx, job_id: JobId, request_id: Option<String>) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    if job.status != JobStatus::Failed {
        return Err(CoreError::InvalidJobState(format!(
            "retry_job requires status 'failed', found '{}'",
            job.status
        )));
    }
    if job.retry_count >= job.max_retries {
        return Err(CoreError::InvalidJobState(format!(
            "job {job_id} has exhausted its retry budget ({}/{})",
            job.retry_count, job.max_retries
        )));
    }
    if let Some(purge_after) = job.purge_after {
        if purge_after <= Utc::now() {
            return Err(CoreError::InvalidJobState(format!("job {job_id}'s source audio has been purged by retention")));
        }
    }

    ctx.tasks.delete_for_job(job_id).await.map_err(IntoCoreError::into_core_error)?;
    ctx.jobs.reset_for_retry(job_id, job.retry_count + 1).await.map_err(IntoCoreError::into_core_error)?;
    ctx.concurrency.increment(&job.tenant_id).await.map_err(IntoCoreError::into_core_error)?;
    info!(%job_id, attempt = job.retry_count + 1, "job retry accepted");

    let event = Event::JobCreated { job_id, request_id };
    ctx.bus.publish(&event).await.map_err(IntoCoreError::into_core_error)
}

/// `delete_job(job_id)` (§6): only permitted in a terminal state. Purges
/// every task's input/output artifacts plus the job's task and job rows.
/// Best-effort on artifact deletion — a missing object is not an error
/// (see `ArtifactStore::delete`), but the row deletes only proceed once
/// attempted so a transient storage failure doesn't orphan the DB rows
/// forever.
pub async fn delete_job(ctx: &AppCtx, job_id: JobId) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    if !job.status.is_terminal() {
        return Err(CoreError::InvalidJobState(format!(
            "delete_job requires a terminal job, found '{}'",
            job.status
        )));
    }

    let tasks = ctx.tasks.list_for_job(job_id).await.map_err(IntoCoreError::into_core_error)?;
    for task in &tasks {
        if let Some(uri) = &task.input_uri {
            ctx.artifacts.delete(uri).await.map_err(IntoCoreError::into_core_error)?;
        }
        if let Some(uri) = &task.output_uri {
            ctx.artifacts.delete(uri).await.map_err(IntoCoreError::into_core_error)?;
        }
    }

    ctx.tasks.delete_for_job(job_id).await.map_err(IntoCoreError::into_core_error)?;
    ctx.jobs.delete(job_id).await.map_err(IntoCoreError::into_core_error)?;
    info!(%job_id, "job deleted");
    Ok(())
}

#[cfg(test)]
#[path = "gateway_api_tests.rs"]
mod tests;
