// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and lifecycle status.

use crate::id::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a [`Job`]. `Completed`, `Failed`, and `Cancelled` are
/// absorbing: once reached, no handler transitions the job further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
}

impl JobStatus {
    /// True for the three absorbing states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelling => "cancelling",
        Cancelled => "cancelled",
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelling" => Ok(Self::Cancelling),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Retention policy attached to a job at submission time. Enforcement is the
/// responsibility of an out-of-scope retention worker; the core only
/// computes and persists `purge_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    AutoDelete,
    Keep,
    None,
}

crate::simple_display! {
    RetentionMode {
        AutoDelete => "auto_delete",
        Keep => "keep",
        None => "none",
    }
}

impl std::str::FromStr for RetentionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_delete" => Ok(Self::AutoDelete),
            "keep" => Ok(Self::Keep),
            "none" => Ok(Self::None),
            other => Err(format!("unknown retention mode: {other}")),
        }
    }
}

/// Audio metadata captured at submission time, passed through to the DAG
/// builder and to downstream tasks via `previous_outputs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub format: Option<String>,
    pub duration_seconds: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub bit_depth: Option<u32>,
}

/// Result summary stats computed on terminal-success, extracted from the
/// `merge` stage's output artifact (§4.6, job completion check).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub language_code: Option<String>,
    pub word_count: Option<u64>,
    pub segment_count: Option<u64>,
    pub speaker_count: Option<u64>,
    pub character_count: Option<u64>,
}

/// A batch transcription job.
///
/// Invariants (enforced by `dalston-orchestrator`'s handlers, not by this
/// type itself): `completed_at` is set iff `status.is_terminal()`;
/// `started_at` is set on the first `pending -> running` transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: String,
    pub status: JobStatus,
    pub audio_uri: String,
    pub parameters: HashMap<String, serde_json::Value>,
    pub audio: AudioMetadata,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retention_mode: RetentionMode,
    pub retention_hours: Option<u32>,
    pub purge_after: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub webhook_url: Option<String>,
    pub result: ResultSummary,
}

impl Job {
    /// Compute `purge_after` from the job's retention policy relative to
    /// `completed_at`. Returns `None` for `Keep`/`None` modes.
    pub fn compute_purge_after(&self, completed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.retention_mode {
            RetentionMode::AutoDelete => {
                let hours = self.retention_hours.unwrap_or(24);
                Some(completed_at + chrono::Duration::hours(hours as i64))
            }
            RetentionMode::Keep | RetentionMode::None => None,
        }
    }

    /// The user-visible error string for a cancelled job (§7).
    pub fn cancelled_error() -> &'static str {
        "Job cancelled"
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            tenant_id: String = "tenant-0",
            audio_uri: String = "s3://bucket/audio.wav",
        }
        set {
            id: JobId = JobId::new(),
            status: JobStatus = JobStatus::Pending,
            parameters: HashMap<String, serde_json::Value> = HashMap::new(),
            audio: AudioMetadata = AudioMetadata::default(),
            created_at: DateTime<Utc> = Utc::now(),
            started_at: Option<DateTime<Utc>> = Option::None,
            completed_at: Option<DateTime<Utc>> = Option::None,
            error: Option<String> = Option::None,
            retention_mode: RetentionMode = RetentionMode::None,
            retention_hours: Option<u32> = Option::None,
            purge_after: Option<DateTime<Utc>> = Option::None,
            retry_count: u32 = 0,
            max_retries: u32 = 3,
            webhook_url: Option<String> = Option::None,
            result: ResultSummary = ResultSummary::default(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
