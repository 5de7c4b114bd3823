use super::*;
use crate::test_support::{fake_ctx, register_default_engines};
use dalston_core::job::{Job, JobStatus};
use dalston_wire::Event;

#[tokio::test]
async fn check_job_completion_is_a_no_op_while_tasks_remain_non_terminal() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder().job_id(job.id).status(TaskStatus::Running).build();
    ctx.tasks.insert_all(&[task]).await.unwrap();

    check_job_completion(&ctx, job.id).await.unwrap();

    assert_eq!(fakes.jobs.snapshot(job.id).unwrap().status, JobStatus::Running);
    assert!(fakes.bus.fanout_log().is_empty());
}

#[tokio::test]
async fn check_job_completion_extracts_result_summary_from_merge_output() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());

    let merge: Task = Task::builder()
        .job_id(job.id)
        .stage("merge")
        .status(TaskStatus::Completed)
        .output_uri(Some("s3://bucket/merged.json".to_string()))
        .build();
    ctx.tasks.insert_all(&[merge.clone()]).await.unwrap();
    fakes.artifacts.seed(
        "s3://bucket/merged.json",
        serde_json::json!({"language_code": "en", "word_count": 120, "segment_count": 8}),
    );

    check_job_completion(&ctx, job.id).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Completed);
    assert_eq!(stored_job.result.language_code.as_deref(), Some("en"));
    assert_eq!(stored_job.result.word_count, Some(120));
    assert!(matches!(fakes.bus.fanout_log().last(), Some(Event::JobCompleted { .. })));
}

#[tokio::test]
async fn check_job_completion_fails_the_job_when_a_required_task_failed() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task =
        Task::builder().job_id(job.id).status(TaskStatus::Failed).required(true).error(Some("boom".into())).build();
    ctx.tasks.insert_all(&[task]).await.unwrap();

    check_job_completion(&ctx, job.id).await.unwrap();

    let stored_job = fakes.jobs.snapshot(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Failed);
    assert_eq!(stored_job.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn promote_and_enqueue_ready_skips_tasks_with_unsatisfied_dependencies() {
    let (ctx, fakes) = fake_ctx();
    register_default_engines(&fakes, &ctx.default_engines).await;

    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    let a: Task = Task::builder().job_id(job.id).stage("prepare").status(TaskStatus::Running).build();
    let b: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .dependencies(vec![a.id])
        .status(TaskStatus::Pending)
        .build();
    ctx.tasks.insert_all(&[a.clone(), b.clone()]).await.unwrap();

    promote_and_enqueue_ready(&ctx, &job, &[a, b.clone()], None).await.unwrap();

    assert_eq!(fakes.tasks.snapshot(b.id).unwrap().status, TaskStatus::Pending);
}
