use super::*;
use crate::test_support::{fake_ctx, register_default_engines};
use dalston_core::job::{Job, JobStatus};
use dalston_core::task::Task;
use dalston_wire::Event;

#[tokio::test]
async fn retries_a_running_task_under_its_limit() {
    let (ctx, fakes) = fake_ctx();
    register_default_engines(&fakes, &ctx.default_engines).await;

    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .engine_id(ctx.default_engines.transcribe.clone())
        .status(TaskStatus::Running)
        .retries(0)
        .max_retries(2)
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job.id, "timed out".to_string(), None).await.unwrap();

    let stored = fakes.tasks.snapshot(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Ready);
    assert_eq!(stored.retries, 1);
    assert_eq!(fakes.queue.unacked_len("transcribe"), 1);
}

#[tokio::test]
async fn replaying_a_ready_retry_re_enqueues_without_incrementing() {
    let (ctx, fakes) = fake_ctx();
    register_default_engines(&fakes, &ctx.default_engines).await;

    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .engine_id(ctx.default_engines.transcribe.clone())
        .status(TaskStatus::Ready)
        .retries(1)
        .max_retries(2)
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job.id, "timed out".to_string(), None).await.unwrap();

    let stored = fakes.tasks.snapshot(task.id).unwrap();
    assert_eq!(stored.retries, 1, "replay must not increment again");
    assert_eq!(fakes.queue.unacked_len("transcribe"), 1);
}

#[tokio::test]
async fn exhausted_required_task_fails_the_job() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .status(TaskStatus::Running)
        .retries(2)
        .max_retries(2)
        .required(true)
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job.id, "backend unavailable".to_string(), None).await.unwrap();

    let stored = fakes.tasks.snapshot(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Failed);
    assert!(matches!(fakes.bus.fanout_log().last(), Some(Event::JobFailed { .. })));
}

#[tokio::test]
async fn exhausted_optional_task_is_skipped_and_dependents_advance() {
    let (ctx, fakes) = fake_ctx();
    register_default_engines(&fakes, &ctx.default_engines).await;

    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let diarize: Task = Task::builder()
        .job_id(job.id)
        .stage("diarize")
        .status(TaskStatus::Running)
        .retries(2)
        .max_retries(2)
        .required(false)
        .build();
    let merge: Task = Task::builder()
        .job_id(job.id)
        .stage("merge")
        .engine_id(ctx.default_engines.merge.clone())
        .dependencies(vec![diarize.id])
        .status(TaskStatus::Pending)
        .build();
    ctx.tasks.insert_all(&[diarize.clone(), merge.clone()]).await.unwrap();

    handle(&ctx, diarize.id, job.id, "no speakers detected".to_string(), None).await.unwrap();

    let stored_diarize = fakes.tasks.snapshot(diarize.id).unwrap();
    assert_eq!(stored_diarize.status, TaskStatus::Skipped);
    let stored_merge = fakes.tasks.snapshot(merge.id).unwrap();
    assert_eq!(stored_merge.status, TaskStatus::Ready);
}

#[tokio::test]
async fn replaying_against_an_already_failed_task_re_runs_job_fail_side_effects() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .status(TaskStatus::Failed)
        .error(Some("backend unavailable".to_string()))
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job.id, "backend unavailable".to_string(), None).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Failed);
    assert!(matches!(fakes.bus.fanout_log().last(), Some(Event::JobFailed { .. })));
}

#[tokio::test]
async fn ignores_failure_against_a_pending_task() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder().job_id(job.id).stage("transcribe").status(TaskStatus::Pending).build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job.id, "stray event".to_string(), None).await.unwrap();

    let stored = fakes.tasks.snapshot(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Pending);
}
