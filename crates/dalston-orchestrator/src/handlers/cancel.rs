// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `job.cancel_requested` (§4.6): broker marker, non-terminal task
//! cancellation, and the cancelling/cancelled job transition.

use dalston_core::id::JobId;
use dalston_core::job::JobStatus;
use dalston_core::CoreResult;
use dalston_queue::{cancel_marker_key, CANCEL_MARKER_TTL};
use tracing::info;

use super::completion::check_job_completion;
use crate::common::load_job;
use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

pub async fn handle(ctx: &AppCtx, job_id: JobId, _request_id: Option<String>) -> CoreResult<()> {
    let job = load_job(ctx, job_id).await?;
    if job.status.is_terminal() {
        info!(%job_id, "job.cancel_requested against an already-terminal job, ignoring");
        return Ok(());
    }

    ctx.guard
        .try_acquire(&cancel_marker_key(&job.tenant_id, job_id), CANCEL_MARKER_TTL)
        .await
        .map_err(IntoCoreError::into_core_error)?;

    ctx.tasks.cancel_non_terminal(job_id).await.map_err(IntoCoreError::into_core_error)?;

    if job.status != JobStatus::Cancelling {
        ctx.jobs
            .transition_status(job_id, &[JobStatus::Pending, JobStatus::Running], JobStatus::Cancelling, false)
            .await
            .map_err(IntoCoreError::into_core_error)?;
    }

    check_job_completion(ctx, job_id).await
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
