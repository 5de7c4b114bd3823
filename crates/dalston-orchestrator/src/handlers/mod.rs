// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event handlers for the durable-stream subset (§4.6): `task.started`,
//! `task.completed`, `task.failed`, and `job.cancel_requested`.
//! `job.created` is handled by [`crate::scheduler`] rather than here, since
//! it owns DAG construction rather than a task/job state transition.

mod cancel;
pub mod completion;
mod task_completed;
mod task_failed;
mod task_started;

use dalston_core::CoreResult;
use dalston_wire::Event;
use tracing::info;

use crate::ctx::AppCtx;

/// Route a durable event to its handler. The three terminal job events
/// (`job.completed`/`job.failed`/`job.cancelled`) have no further work to
/// do at the orchestrator itself — they exist on the bus for the
/// out-of-scope webhook delivery worker (§6).
pub async fn dispatch(ctx: &AppCtx, event: Event) -> CoreResult<()> {
    match event {
        Event::JobCreated { job_id, request_id } => crate::scheduler::handle_job_created(ctx, job_id, request_id).await,
        Event::TaskStarted { task_id, job_id, request_id } => task_started::handle(ctx, task_id, job_id, request_id).await,
        Event::TaskCompleted { task_id, job_id, output_uri, request_id } => {
            task_completed::handle(ctx, task_id, job_id, output_uri, request_id).await
        }
        Event::TaskFailed { task_id, job_id, error, request_id } => {
            task_failed::handle(ctx, task_id, job_id, error, request_id).await
        }
        Event::JobCancelRequested { job_id, request_id } => cancel::handle(ctx, job_id, request_id).await,
        Event::JobCompleted { job_id, .. } | Event::JobFailed { job_id, .. } | Event::JobCancelled { job_id, .. } => {
            info!(%job_id, "terminal job event reached the orchestrator's own dispatcher, no further action");
            Ok(())
        }
    }
}
