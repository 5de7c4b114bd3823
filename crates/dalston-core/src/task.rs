// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and lifecycle status.

use crate::id::{EngineId, JobId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a [`Task`]. `Completed`, `Skipped`, `Failed`, and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Skipped,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed | Self::Cancelled)
    }

    /// True for the states a dependent's "deps satisfied" check accepts:
    /// completed or skipped, per the `pending -> ready` invariant in §3.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Ready => "ready",
        Running => "running",
        Completed => "completed",
        Skipped => "skipped",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A single processing task within a job's DAG.
///
/// Invariants enforced by `dalston-orchestrator`, not by this type:
/// `dependencies` is a subset of the job's task ids and acyclic;
/// `status.is_terminal() <=> completed_at.is_some()`; `retries <=
/// max_retries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub stage: String,
    pub engine_id: EngineId,
    pub status: TaskStatus,
    pub dependencies: Vec<TaskId>,
    pub config: HashMap<String, serde_json::Value>,
    pub input_uri: Option<String>,
    pub output_uri: Option<String>,
    pub retries: u32,
    pub max_retries: u32,
    pub required: bool,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Base stage name with any `_ch{N}` channel suffix stripped, used to
    /// alias per-channel outputs under the channel-agnostic key (§4.5).
    pub fn base_stage(&self) -> &str {
        match self.stage.rsplit_once("_ch") {
            Some((base, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) && !suffix.is_empty() => base,
            _ => &self.stage,
        }
    }

    /// Whether every dependency in `terminal_statuses` (keyed by `TaskId`)
    /// is in a dependency-satisfying state. Missing entries count as
    /// unsatisfied (the dependency hasn't been observed as terminal yet).
    pub fn dependencies_satisfied(&self, terminal_statuses: &HashMap<TaskId, TaskStatus>) -> bool {
        self.dependencies
            .iter()
            .all(|dep| terminal_statuses.get(dep).is_some_and(|s| s.satisfies_dependency()))
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            stage: String = "prepare",
        }
        set {
            id: TaskId = TaskId::new(),
            job_id: JobId = JobId::new(),
            engine_id: EngineId = EngineId::new("dalston-prepare"),
            status: TaskStatus = TaskStatus::Pending,
            dependencies: Vec<TaskId> = Vec::new(),
            config: HashMap<String, serde_json::Value> = HashMap::new(),
            input_uri: Option<String> = Option::None,
            output_uri: Option<String> = Option::None,
            retries: u32 = 0,
            max_retries: u32 = 2,
            required: bool = true,
            error: Option<String> = Option::None,
            started_at: Option<DateTime<Utc>> = Option::None,
            completed_at: Option<DateTime<Utc>> = Option::None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
