// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row shapes for the `jobs` and `tasks` tables, and conversions to/from
//! `dalston-core`'s domain types.
//!
//! Query-time row decoding uses runtime `sqlx::query`/`query_as` rather
//! than the `query!` compile-time-checked macros, since this workspace has
//! no live database to validate queries against at build time (see
//! SPEC_FULL.md's Ambient Stack section).

use chrono::{DateTime, Utc};
use dalston_core::id::{EngineId, JobId, TaskId};
use dalston_core::job::{AudioMetadata, Job, JobStatus, ResultSummary, RetentionMode};
use dalston_core::task::{Task, TaskStatus};
use sqlx::FromRow;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub status: String,
    pub audio_uri: String,
    pub parameters: serde_json::Value,
    pub audio_format: Option<String>,
    pub audio_duration: Option<f64>,
    pub audio_sample_rate: Option<i32>,
    pub audio_channels: Option<i32>,
    pub audio_bit_depth: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retention_mode: String,
    pub retention_hours: Option<i32>,
    pub purge_after: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub webhook_url: Option<String>,
    pub result_language_code: Option<String>,
    pub result_word_count: Option<i64>,
    pub result_segment_count: Option<i64>,
    pub result_speaker_count: Option<i64>,
    pub result_character_count: Option<i64>,
}

impl TryFrom<JobRow> for Job {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let invalid = |field: &str, msg: String| {
            sqlx::Error::ColumnDecode { index: field.to_string(), source: msg.into() }
        };
        let status = JobStatus::from_str(&row.status).map_err(|e| invalid("status", e))?;
        let retention_mode =
            RetentionMode::from_str(&row.retention_mode).map_err(|e| invalid("retention_mode", e))?;
        let parameters: HashMap<String, serde_json::Value> =
            serde_json::from_value(row.parameters).unwrap_or_default();
        Ok(Job {
            id: JobId::from(row.id),
            tenant_id: row.tenant_id,
            status,
            audio_uri: row.audio_uri,
            parameters,
            audio: AudioMetadata {
                format: row.audio_format,
                duration_seconds: row.audio_duration,
                sample_rate: row.audio_sample_rate.map(|v| v as u32),
                channels: row.audio_channels.map(|v| v as u32),
                bit_depth: row.audio_bit_depth.map(|v| v as u32),
            },
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
            retention_mode,
            retention_hours: row.retention_hours.map(|v| v as u32),
            purge_after: row.purge_after,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            webhook_url: row.webhook_url,
            result: ResultSummary {
                language_code: row.result_language_code,
                word_count: row.result_word_count.map(|v| v as u64),
                segment_count: row.result_segment_count.map(|v| v as u64),
                speaker_count: row.result_speaker_count.map(|v| v as u64),
                character_count: row.result_character_count.map(|v| v as u64),
            },
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub stage: String,
    pub engine_id: String,
    pub status: String,
    pub dependencies: serde_json::Value,
    pub config: serde_json::Value,
    pub input_uri: Option<String>,
    pub output_uri: Option<String>,
    pub retries: i32,
    pub max_retries: i32,
    pub required: bool,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = sqlx::Error;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let invalid = |field: &str, msg: String| {
            sqlx::Error::ColumnDecode { index: field.to_string(), source: msg.into() }
        };
        let status = TaskStatus::from_str(&row.status).map_err(|e| invalid("status", e))?;
        let dependencies: Vec<Uuid> = serde_json::from_value(row.dependencies).unwrap_or_default();
        let config: HashMap<String, serde_json::Value> =
            serde_json::from_value(row.config).unwrap_or_default();
        Ok(Task {
            id: TaskId::from(row.id),
            job_id: JobId::from(row.job_id),
            stage: row.stage,
            engine_id: EngineId::new(row.engine_id),
            status,
            dependencies: dependencies.into_iter().map(TaskId::from).collect(),
            config,
            input_uri: row.input_uri,
            output_uri: row.output_uri,
            retries: row.retries as u32,
            max_retries: row.max_retries as u32,
            required: row.required,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Serialize a task's dependency ids for the `dependencies` jsonb column.
pub fn dependencies_json(task: &Task) -> serde_json::Value {
    serde_json::to_value(task.dependencies.iter().map(|id| id.as_uuid()).collect::<Vec<_>>())
        .unwrap_or(serde_json::Value::Array(vec![]))
}
