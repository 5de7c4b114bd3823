// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `task.completed` (§4.6): mark the task done, then either finish
//! cancellation bookkeeping or promote dependents, and check job
//! completion either way.

use chrono::Utc;
use dalston_core::id::{JobId, TaskId};
use dalston_core::CoreResult;

use super::completion::advance_after_task_terminal;
use crate::ctx::AppCtx;
use crate::error::IntoCoreError;

pub async fn handle(
    ctx: &AppCtx,
    task_id: TaskId,
    job_id: JobId,
    output_uri: String,
    request_id: Option<String>,
) -> CoreResult<()> {
    ctx.tasks.mark_completed(task_id, &output_uri, Utc::now()).await.map_err(IntoCoreError::into_core_error)?;
    advance_after_task_terminal(ctx, job_id, request_id).await
}

#[cfg(test)]
#[path = "task_completed_tests.rs"]
mod tests;
