use super::*;
use crate::test_support::fake_ctx;
use dalston_core::job::{Job, JobStatus};
use dalston_core::task::{Task, TaskStatus};
use dalston_queue::cancel_marker_key;
use dalston_wire::Event;

#[tokio::test]
async fn cancelling_a_pending_job_with_no_tasks_is_immediate() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Pending).build();
    fakes.jobs.seed(job.clone());

    handle(&ctx, job.id, None).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Cancelled);
    assert!(matches!(fakes.bus.fanout_log().last(), Some(Event::JobCancelled { .. })));
}

#[tokio::test]
async fn cancelling_a_running_job_with_running_tasks_waits_for_them() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());

    let running: Task = Task::builder().job_id(job.id).stage("transcribe").status(TaskStatus::Running).build();
    let ready: Task = Task::builder().job_id(job.id).stage("diarize").status(TaskStatus::Ready).build();
    ctx.tasks.insert_all(&[running.clone(), ready.clone()]).await.unwrap();

    handle(&ctx, job.id, None).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Cancelling);
    assert_eq!(fakes.tasks.snapshot(ready.id).unwrap().status, TaskStatus::Cancelled);
    assert_eq!(fakes.tasks.snapshot(running.id).unwrap().status, TaskStatus::Running);
}

#[tokio::test]
async fn cancelling_a_running_job_with_no_running_tasks_cancels_immediately() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());

    let ready: Task = Task::builder().job_id(job.id).stage("diarize").status(TaskStatus::Ready).build();
    ctx.tasks.insert_all(&[ready.clone()]).await.unwrap();

    handle(&ctx, job.id, None).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn writes_the_tenant_scoped_cancel_marker() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Pending).build();
    fakes.jobs.seed(job.clone());

    handle(&ctx, job.id, None).await.unwrap();

    assert!(!fakes.guard.try_acquire(&cancel_marker_key("tenant-a", job.id), std::time::Duration::from_secs(60)).await.unwrap());
}

#[tokio::test]
async fn ignores_cancel_against_an_already_terminal_job() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Completed).build();
    fakes.jobs.seed(job.clone());

    handle(&ctx, job.id, None).await.unwrap();

    assert!(fakes.bus.fanout_log().is_empty());
}
