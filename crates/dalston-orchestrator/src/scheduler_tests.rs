use super::*;
use crate::test_support::{fake_ctx, register_default_engines};
use dalston_core::job::{Job, JobStatus};
use dalston_core::task::TaskStatus;

#[tokio::test]
async fn job_created_builds_dag_and_enqueues_root_tasks() {
    let (ctx, fakes) = fake_ctx();
    register_default_engines(&fakes, &ctx.default_engines).await;

    let job: Job = Job::builder()
        .tenant_id("tenant-a")
        .audio_uri("s3://bucket/audio.wav")
        .parameters([("timestamps_granularity".to_string(), serde_json::json!("segment"))].into_iter().collect())
        .build();
    fakes.jobs.seed(job.clone());

    handle_job_created(&ctx, job.id, None).await.unwrap();

    let tasks = ctx.tasks.list_for_job(job.id).await.unwrap();
    assert_eq!(tasks.len(), 3, "prepare, transcribe, merge");

    let prepare = tasks.iter().find(|t| t.stage == "prepare").unwrap();
    assert_eq!(prepare.status, TaskStatus::Ready);
    assert_eq!(fakes.queue.unacked_len("prepare"), 1);

    let transcribe = tasks.iter().find(|t| t.stage == "transcribe").unwrap();
    assert_eq!(transcribe.status, TaskStatus::Pending);

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Running);
    assert!(stored_job.started_at.is_some());
}

#[tokio::test]
async fn job_created_is_idempotent_on_replay() {
    let (ctx, fakes) = fake_ctx();
    register_default_engines(&fakes, &ctx.default_engines).await;

    let job: Job = Job::builder().tenant_id("tenant-a").audio_uri("s3://bucket/audio.wav").build();
    fakes.jobs.seed(job.clone());

    handle_job_created(&ctx, job.id, None).await.unwrap();
    let first_pass = ctx.tasks.list_for_job(job.id).await.unwrap();

    handle_job_created(&ctx, job.id, None).await.unwrap();
    let second_pass = ctx.tasks.list_for_job(job.id).await.unwrap();

    assert_eq!(first_pass.len(), second_pass.len());
    assert_eq!(fakes.queue.unacked_len("prepare"), 1, "replay must not double-enqueue");
}

#[tokio::test]
async fn job_created_ignores_terminal_job() {
    let (ctx, fakes) = fake_ctx();
    let job: Job =
        Job::builder().tenant_id("tenant-a").audio_uri("s3://bucket/audio.wav").status(JobStatus::Completed).build();
    fakes.jobs.seed(job.clone());

    handle_job_created(&ctx, job.id, None).await.unwrap();

    assert!(ctx.tasks.list_for_job(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn job_created_fails_job_when_no_capable_engine_is_live() {
    let (ctx, fakes) = fake_ctx();
    // No engines registered: the `prepare` root task has no live instance.
    let job: Job = Job::builder().tenant_id("tenant-a").audio_uri("s3://bucket/audio.wav").build();
    fakes.jobs.seed(job.clone());

    handle_job_created(&ctx, job.id, None).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Failed);
    assert!(stored_job.error.is_some());
    assert_eq!(fakes.queue.unacked_len("prepare"), 0);
}
