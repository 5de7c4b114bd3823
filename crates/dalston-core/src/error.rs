// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured error types shared across the orchestration subsystem.

use crate::id::{JobId, TaskId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// No live engine instance can satisfy a task's stage/capability
/// requirements at enqueue time (§4.5, §7). Serialized into the job's
/// `error` column verbatim so the failure is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineError {
    pub engine_id: String,
    pub stage: String,
    pub requirements: Vec<String>,
    pub reason: String,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no live instance of engine '{}' for stage '{}' satisfies requirements {:?}: {}",
            self.engine_id, self.stage, self.requirements, self.reason
        )
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Render as the JSON string persisted into `Job::error` (§7: "a failed
    /// job exposes its `error` string, which may be a JSON-serialized
    /// structured error").
    pub fn to_error_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

/// Errors the orchestration subsystem's core logic can raise. Transient
/// variants (`Broker`, `Storage`, `ObjectStore`) are the caller's signal to
/// leave the triggering event un-ACKed for at-least-once redelivery (§7);
/// the remaining variants represent either invariant violations or
/// terminal, non-retryable outcomes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("database error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("broker error: {0}")]
    Broker(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("object store error: {0}")]
    ObjectStore(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("no capable live engine for task: {0}")]
    EngineUnavailable(EngineError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid job state for requested operation: {0}")]
    InvalidJobState(String),

    #[error("job {0} does not belong to the requesting tenant")]
    TenantMismatch(JobId),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(e))
    }

    pub fn broker(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Broker(Box::new(e))
    }

    pub fn object_store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::ObjectStore(Box::new(e))
    }

    /// Whether this error represents a transient condition where the
    /// correct response is to retry / leave the event un-ACKed (§7).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Broker(_) | Self::ObjectStore(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
