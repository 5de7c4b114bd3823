// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `task.started` (§4.6): `ready -> running` claim.

use dalston_core::id::{JobId, TaskId};
use dalston_core::task::TaskStatus;
use dalston_core::{CoreError, CoreResult};
use tracing::{info, warn};

use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

/// Atomically claim the task. If the conditional `ready -> running` update
/// affects zero rows, consult the current status: already `running` is an
/// idempotent replay; anything else (e.g. `cancelled`) rejects the claim
/// without side effect.
pub async fn handle(ctx: &AppCtx, task_id: TaskId, job_id: JobId, _request_id: Option<String>) -> CoreResult<()> {
    if ctx.tasks.mark_running(task_id).await.map_err(IntoCoreError::into_core_error)? {
        return Ok(());
    }

    let task = ctx.tasks.get(task_id).await.map_err(IntoCoreError::into_core_error)?.ok_or(CoreError::TaskNotFound(task_id))?;
    match task.status {
        TaskStatus::Running => {
            info!(%job_id, %task_id, "task.started replay against an already-running task, ignoring");
        }
        other => {
            warn!(%job_id, %task_id, status = %other, "task.started rejected, task is not ready");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "task_started_tests.rs"]
mod tests;
