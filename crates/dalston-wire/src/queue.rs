// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task queue message and pending-entry-list (PEL) types (§3, §4.2).

use chrono::{DateTime, Utc};
use dalston_core::id::{EngineId, JobId, TaskId};
use serde::{Deserialize, Serialize};

/// A message appended to a stage stream (`dalston:stream:{stage}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub engine_id: EngineId,
    pub enqueued_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// One entry in a stream's consumer-group pending-entry list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub message_id: String,
    pub task_id: TaskId,
    pub consumer: String,
    pub idle_ms: u64,
    pub delivery_count: u64,
}

impl PendingEntry {
    /// True when idle time exceeds the stale threshold — the idle half of
    /// the reconciler's reclaim conjunction (§4.2); liveness of the owning
    /// instance is evaluated separately by the caller.
    pub fn is_idle_past(&self, threshold: std::time::Duration) -> bool {
        self.idle_ms >= threshold.as_millis() as u64
    }

    /// The `instance_id` half of a consumer id formatted
    /// `{engine_id}-{instance_id_suffix}` is opaque to the queue; callers
    /// that need engine/instance liveness use `consumer` directly as the
    /// `instance_id` since the engine runner SDK sets its consumer name
    /// equal to its own `instance_id` (§6: "consumer id =
    /// `{engine_id}-{instance_id_suffix}`" — the queue never needs to
    /// parse it, only the registry does via `InstanceId::engine_id`).
    pub fn owner_instance(&self) -> &str {
        &self.consumer
    }
}
