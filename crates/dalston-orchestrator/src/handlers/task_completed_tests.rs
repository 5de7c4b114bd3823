use super::*;
use crate::test_support::{fake_ctx, register_default_engines};
use dalston_core::job::{Job, JobStatus};
use dalston_core::task::Task;
use dalston_wire::Event;

#[tokio::test]
async fn promotes_dependent_and_enqueues_it() {
    let (ctx, fakes) = fake_ctx();
    register_default_engines(&fakes, &ctx.default_engines).await;

    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());

    let prepare: Task = Task::builder().job_id(job.id).stage("prepare").status(TaskStatus::Completed).build();
    let transcribe: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .engine_id(ctx.default_engines.transcribe.clone())
        .dependencies(vec![prepare.id])
        .status(TaskStatus::Pending)
        .build();
    ctx.tasks.insert_all(&[prepare.clone(), transcribe.clone()]).await.unwrap();

    handle(&ctx, prepare.id, job.id, "s3://bucket/prepared.json".to_string(), None).await.unwrap();

    let stored = fakes.tasks.snapshot(transcribe.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Ready);
    assert_eq!(fakes.queue.unacked_len("transcribe"), 1);
}

#[tokio::test]
async fn completing_the_last_task_completes_the_job() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());

    let merge: Task = Task::builder().job_id(job.id).stage("merge").status(TaskStatus::Running).build();
    ctx.tasks.insert_all(&[merge.clone()]).await.unwrap();

    handle(&ctx, merge.id, job.id, "s3://bucket/merged.json".to_string(), None).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Completed);
    assert!(matches!(fakes.bus.fanout_log().last(), Some(Event::JobCompleted { .. })));
}

#[tokio::test]
async fn cancelling_job_marks_remaining_pending_tasks_cancelled_instead_of_promoting() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Cancelling).build();
    fakes.jobs.seed(job.clone());

    let prepare: Task = Task::builder().job_id(job.id).stage("prepare").status(TaskStatus::Completed).build();
    let transcribe: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .dependencies(vec![prepare.id])
        .status(TaskStatus::Pending)
        .build();
    ctx.tasks.insert_all(&[prepare.clone(), transcribe.clone()]).await.unwrap();

    handle(&ctx, prepare.id, job.id, "s3://bucket/prepared.json".to_string(), None).await.unwrap();

    let stored = fakes.tasks.snapshot(transcribe.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
    assert_eq!(fakes.queue.unacked_len("transcribe"), 0);

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Cancelled);
}
