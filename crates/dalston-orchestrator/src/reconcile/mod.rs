// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic, leader-elected reconciliation sweep (§4.7): the ultimate
//! authority for any state the broker's ephemeral structures cannot repair
//! on their own.

use std::collections::HashSet;

use chrono::Utc;
use dalston_core::id::TaskId;
use dalston_core::task::TaskStatus;
use dalston_core::CoreResult;
use dalston_queue::TaskQueue;
use dalston_registry::ArtifactLookup;
use tracing::{info, warn};

use crate::ctx::AppCtx;
use crate::error::IntoCoreError;
use crate::handlers::completion::advance_after_task_terminal;

/// Attempt to acquire reconciler leadership and run one sweep if acquired.
/// Returns `true` if this call was the leader for this tick (regardless of
/// how many findings the sweep produced), so callers can log stand-downs.
pub async fn tick(ctx: &AppCtx, lock_ttl: std::time::Duration, stale_threshold: std::time::Duration) -> CoreResult<bool> {
    let is_leader = ctx
        .guard
        .try_acquire(dalston_queue::reconciler_lock_key(), lock_ttl)
        .await
        .map_err(IntoCoreError::into_core_error)?;
    if !is_leader {
        return Ok(false);
    }

    sweep(ctx, stale_threshold).await?;
    Ok(true)
}

/// Run all five reconciliation steps once. Exposed separately from [`tick`]
/// so tests can drive a sweep without contending on the leader lock.
pub async fn sweep(ctx: &AppCtx, stale_threshold: std::time::Duration) -> CoreResult<()> {
    let stages = ctx.tasks.distinct_active_stages().await.map_err(IntoCoreError::into_core_error)?;

    let mut pel_task_ids: HashSet<TaskId> = HashSet::new();
    let mut pel_by_stage = Vec::new();
    let mut reclaimable_by_stage = Vec::new();
    for stage in &stages {
        let pending = ctx.queue.get_pending(stage).await.map_err(IntoCoreError::into_core_error)?;
        let reclaimable = ctx
            .queue
            .stale_entries_from_dead_engines(stage, ctx.registry.as_ref(), stale_threshold)
            .await
            .map_err(IntoCoreError::into_core_error)?;
        let reclaimable_ids: HashSet<&str> = reclaimable.iter().map(|e| e.message_id.as_str()).collect();

        pel_task_ids.extend(pending.iter().filter(|e| !reclaimable_ids.contains(e.message_id.as_str())).map(|e| e.task_id));
        pel_by_stage.push((stage.clone(), pending));
        reclaimable_by_stage.push((stage.clone(), reclaimable));
    }

    reconcile_orphaned_db_tasks(ctx, &pel_task_ids, stale_threshold).await?;
    reconcile_orphaned_pel_entries(ctx, &pel_by_stage).await?;
    reconcile_stale_ready_tasks(ctx, &reclaimable_by_stage).await?;

    let removed = ctx.registry.prune_expired().await.map_err(IntoCoreError::into_core_error)?;
    if !removed.is_empty() {
        info!(count = removed.len(), "pruned engines with no remaining live instances");
    }

    Ok(())
}

/// Step 2: `running` tasks older than `stale_threshold` with no *live* PEL
/// entry — either no entry anywhere, or the sole entry is idle past
/// threshold and owned by a dead instance (§8 scenario 5). In both cases
/// the owning engine is no longer working the task, so resolution falls
/// back to the expected output artifact's presence.
async fn reconcile_orphaned_db_tasks(
    ctx: &AppCtx,
    pel_task_ids: &HashSet<TaskId>,
    stale_threshold: std::time::Duration,
) -> CoreResult<()> {
    let cutoff = Utc::now() - chrono::Duration::from_std(stale_threshold).unwrap_or_default();
    let stale = ctx.tasks.list_stale_running(cutoff).await.map_err(IntoCoreError::into_core_error)?;

    for task in stale {
        if pel_task_ids.contains(&task.id) {
            continue;
        }

        let expected_output = format!("s3://dalston/{}/{}/output.json", task.job_id, task.id);
        match ctx.artifacts.lookup(&expected_output).await {
            ArtifactLookup::Transient => {
                warn!(task_id = %task.id, "transient artifact lookup during orphan check, skipping until next sweep");
            }
            ArtifactLookup::Present => {
                info!(task_id = %task.id, "orphaned running task has a completed output, resolving completed");
                ctx.tasks
                    .mark_completed(task.id, &expected_output, Utc::now())
                    .await
                    .map_err(IntoCoreError::into_core_error)?;
                advance_after_task_terminal(ctx, task.job_id, None).await?;
            }
            ArtifactLookup::Absent => {
                info!(task_id = %task.id, "orphaned running task has no output, resolving failed");
                handle_orphan_failure(ctx, task).await?;
            }
        }
    }
    Ok(())
}

async fn handle_orphan_failure(ctx: &AppCtx, task: dalston_core::task::Task) -> CoreResult<()> {
    ctx.tasks
        .mark_terminal(task.id, TaskStatus::Failed, Some("orphaned".to_string()), Utc::now())
        .await
        .map_err(IntoCoreError::into_core_error)?;
    if task.required {
        crate::common::fail_job_immediately(ctx, task.job_id, "orphaned".to_string(), None).await
    } else {
        advance_after_task_terminal(ctx, task.job_id, None).await
    }
}

/// Step 3: ACK PEL entries whose DB task has already reached a terminal
/// state. Entries for `ready`/`running` tasks are never touched here.
async fn reconcile_orphaned_pel_entries(ctx: &AppCtx, pel_by_stage: &[(String, Vec<dalston_wire::PendingEntry>)]) -> CoreResult<()> {
    for (stage, entries) in pel_by_stage {
        for entry in entries {
            let Some(task) = ctx.tasks.get(entry.task_id).await.map_err(IntoCoreError::into_core_error)? else {
                continue;
            };
            if task.status.is_terminal() {
                ctx.queue.ack(stage, &entry.message_id).await.map_err(IntoCoreError::into_core_error)?;
            }
        }
    }
    Ok(())
}

/// Step 4: `ready` tasks whose sole PEL entry is idle past threshold and
/// owned by a dead instance (computed once in [`sweep`] via
/// `TaskQueue::stale_entries_from_dead_engines` and shared with step 2).
/// Re-enqueues before ACKing the stale entry, so a crash between the two
/// leaves a recoverable duplicate rather than a lost task. `running` tasks
/// reaching this same reclaimable set are instead resolved by step 2 via
/// artifact lookup, since re-enqueueing a task already in flight risks a
/// duplicate run against possibly-unreproducible input.
async fn reconcile_stale_ready_tasks(ctx: &AppCtx, reclaimable_by_stage: &[(String, Vec<dalston_wire::PendingEntry>)]) -> CoreResult<()> {
    for (stage, entries) in reclaimable_by_stage {
        for entry in entries {
            let Some(task) = ctx.tasks.get(entry.task_id).await.map_err(IntoCoreError::into_core_error)? else {
                continue;
            };
            if task.status != TaskStatus::Ready {
                continue;
            }

            warn!(task_id = %task.id, "reclaiming stale ready task from dead engine");
            let job = crate::common::load_job(ctx, task.job_id).await?;
            let all_tasks = ctx.tasks.list_for_job(task.job_id).await.map_err(IntoCoreError::into_core_error)?;
            crate::common::enqueue(ctx, &task, &job, &all_tasks, None, Some(task.retries)).await?;
            ctx.queue.ack(stage, &entry.message_id).await.map_err(IntoCoreError::into_core_error)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
