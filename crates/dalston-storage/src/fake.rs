// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `JobStore`/`TaskStore` doubles for orchestrator unit tests,
//! standing in for Postgres without a live database.

use crate::jobs::JobStore;
use crate::tasks::TaskStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dalston_core::id::{JobId, TaskId};
use dalston_core::job::{Job, JobStatus, ResultSummary};
use dalston_core::task::{Task, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct FakeJobStore {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
}

impl FakeJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, job: Job) {
        self.jobs.lock().insert(job.id, job);
    }

    pub fn snapshot(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().get(&id).cloned()
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn insert(&self, job: &Job) -> sqlx::Result<()> {
        self.jobs.lock().insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> sqlx::Result<Option<Job>> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    async fn transition_status(&self, id: JobId, from: &[JobStatus], to: JobStatus, set_started_at: bool) -> sqlx::Result<bool> {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(&id) else { return Ok(false) };
        if !from.contains(&job.status) {
            return Ok(false);
        }
        job.status = to;
        if set_started_at {
            job.started_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        completed_at: DateTime<Utc>,
        error: Option<String>,
        result: Option<ResultSummary>,
        purge_after: Option<DateTime<Utc>>,
    ) -> sqlx::Result<()> {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(&id) {
            job.status = status;
            job.completed_at = Some(completed_at);
            job.error = error;
            job.result = result.unwrap_or_default();
            job.purge_after = purge_after;
        }
        Ok(())
    }

    async fn set_error(&self, id: JobId, error: &str) -> sqlx::Result<()> {
        if let Some(job) = self.jobs.lock().get_mut(&id) {
            job.error = Some(error.to_string());
        }
        Ok(())
    }

    async fn reset_for_retry(&self, id: JobId, retry_count: u32) -> sqlx::Result<()> {
        if let Some(job) = self.jobs.lock().get_mut(&id) {
            job.status = JobStatus::Pending;
            job.error = None;
            job.started_at = None;
            job.completed_at = None;
            job.purge_after = None;
            job.retry_count = retry_count;
        }
        Ok(())
    }

    async fn delete(&self, id: JobId) -> sqlx::Result<()> {
        self.jobs.lock().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeTaskStore {
    tasks: Arc<Mutex<HashMap<TaskId, Task>>>,
}

impl FakeTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().get(&id).cloned()
    }
}

#[async_trait]
impl TaskStore for FakeTaskStore {
    async fn insert_all(&self, tasks: &[Task]) -> sqlx::Result<()> {
        let mut store = self.tasks.lock();
        for task in tasks {
            store.insert(task.id, task.clone());
        }
        Ok(())
    }

    async fn get(&self, id: TaskId) -> sqlx::Result<Option<Task>> {
        Ok(self.tasks.lock().get(&id).cloned())
    }

    async fn list_for_job(&self, job_id: JobId) -> sqlx::Result<Vec<Task>> {
        Ok(self.tasks.lock().values().filter(|t| t.job_id == job_id).cloned().collect())
    }

    async fn exists_for_job(&self, job_id: JobId) -> sqlx::Result<bool> {
        Ok(self.tasks.lock().values().any(|t| t.job_id == job_id))
    }

    async fn transition(&self, id: TaskId, from: TaskStatus, to: TaskStatus) -> sqlx::Result<bool> {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(&id) else { return Ok(false) };
        if task.status != from {
            return Ok(false);
        }
        task.status = to;
        Ok(true)
    }

    async fn mark_running(&self, id: TaskId) -> sqlx::Result<bool> {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(&id) else { return Ok(false) };
        if task.status != TaskStatus::Ready {
            return Ok(false);
        }
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        Ok(true)
    }

    async fn mark_completed(&self, id: TaskId, output_uri: &str, completed_at: DateTime<Utc>) -> sqlx::Result<()> {
        if let Some(task) = self.tasks.lock().get_mut(&id) {
            task.status = TaskStatus::Completed;
            task.output_uri = Some(output_uri.to_string());
            task.error = None;
            task.completed_at = Some(completed_at);
        }
        Ok(())
    }

    async fn mark_retry_ready(&self, id: TaskId) -> sqlx::Result<()> {
        if let Some(task) = self.tasks.lock().get_mut(&id) {
            task.status = TaskStatus::Ready;
            task.retries += 1;
            task.started_at = None;
        }
        Ok(())
    }

    async fn mark_terminal(&self, id: TaskId, status: TaskStatus, error: Option<String>, completed_at: DateTime<Utc>) -> sqlx::Result<()> {
        if let Some(task) = self.tasks.lock().get_mut(&id) {
            task.status = status;
            task.error = error;
            task.completed_at = Some(completed_at);
        }
        Ok(())
    }

    async fn promote_ready(&self, ids: &[TaskId]) -> sqlx::Result<Vec<TaskId>> {
        let mut tasks = self.tasks.lock();
        let mut promoted = Vec::new();
        for id in ids {
            if let Some(task) = tasks.get_mut(id) {
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::Ready;
                    promoted.push(*id);
                }
            }
        }
        Ok(promoted)
    }

    async fn cancel_non_terminal(&self, job_id: JobId) -> sqlx::Result<Vec<TaskId>> {
        let mut tasks = self.tasks.lock();
        let mut cancelled = Vec::new();
        for task in tasks.values_mut() {
            if task.job_id == job_id && matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
                cancelled.push(task.id);
            }
        }
        Ok(cancelled)
    }

    async fn set_input_uri(&self, id: TaskId, input_uri: &str) -> sqlx::Result<()> {
        if let Some(task) = self.tasks.lock().get_mut(&id) {
            task.input_uri = Some(input_uri.to_string());
        }
        Ok(())
    }

    async fn delete_for_job(&self, job_id: JobId) -> sqlx::Result<()> {
        self.tasks.lock().retain(|_, task| task.job_id != job_id);
        Ok(())
    }

    async fn distinct_active_stages(&self) -> sqlx::Result<Vec<String>> {
        let mut stages: Vec<String> = self
            .tasks
            .lock()
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Ready | TaskStatus::Running))
            .map(|t| t.stage.clone())
            .collect();
        stages.sort();
        stages.dedup();
        Ok(stages)
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> sqlx::Result<Vec<Task>> {
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|t| t.status == TaskStatus::Running && t.started_at.is_some_and(|s| s < cutoff))
            .cloned()
            .collect())
    }
}
