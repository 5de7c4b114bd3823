use super::*;
use crate::test_support::fake_ctx;
use dalston_core::id::InstanceId;
use dalston_core::job::{Job, JobStatus};
use dalston_core::task::{Task, TaskStatus};
use dalston_queue::TaskQueue;
use dalston_queue::{DistributedGuard, EnqueueFields, FakeDistributedGuard};
use dalston_registry::{EngineRegistry, InstanceInfo, InstanceStatus};

fn stale_threshold() -> std::time::Duration {
    std::time::Duration::from_secs(600)
}

#[tokio::test]
async fn orphaned_task_with_present_output_resolves_completed() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .status(TaskStatus::Running)
        .started_at(Some(chrono::Utc::now() - chrono::Duration::hours(2)))
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();
    let expected_output = format!("s3://dalston/{}/{}/output.json", task.job_id, task.id);
    fakes.artifacts.seed(&expected_output, serde_json::json!({"word_count": 10}));

    sweep(&ctx, stale_threshold()).await.unwrap();

    assert_eq!(fakes.tasks.snapshot(task.id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn orphaned_task_with_absent_output_resolves_failed() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .status(TaskStatus::Running)
        .required(true)
        .started_at(Some(chrono::Utc::now() - chrono::Duration::hours(2)))
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    sweep(&ctx, stale_threshold()).await.unwrap();

    let stored = fakes.tasks.snapshot(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(fakes.jobs.snapshot(job.id).unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn transient_artifact_lookup_leaves_task_untouched() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .status(TaskStatus::Running)
        .started_at(Some(chrono::Utc::now() - chrono::Duration::hours(2)))
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();
    let expected_output = format!("s3://dalston/{}/{}/output.json", task.job_id, task.id);
    fakes.artifacts.fail_transiently(&expected_output);

    sweep(&ctx, stale_threshold()).await.unwrap();

    assert_eq!(fakes.tasks.snapshot(task.id).unwrap().status, TaskStatus::Running);
}

#[tokio::test]
async fn orphaned_pel_entry_for_terminal_task_is_acked() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Completed).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder().job_id(job.id).stage("transcribe").status(TaskStatus::Completed).build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    ctx.queue
        .add("transcribe", EnqueueFields { task_id: task.id, job_id: job.id, engine_id: task.engine_id.clone(), timeout_at: chrono::Utc::now(), request_id: None }, None)
        .await
        .unwrap();
    ctx.queue.read_next("transcribe", "some-consumer", std::time::Duration::from_secs(1)).await.unwrap();

    sweep(&ctx, stale_threshold()).await.unwrap();

    assert_eq!(fakes.queue.unacked_len("transcribe"), 0);
}

#[tokio::test]
async fn pel_entry_for_running_task_is_never_acked() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder().job_id(job.id).stage("transcribe").status(TaskStatus::Running).build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    ctx.queue
        .add("transcribe", EnqueueFields { task_id: task.id, job_id: job.id, engine_id: task.engine_id.clone(), timeout_at: chrono::Utc::now(), request_id: None }, None)
        .await
        .unwrap();
    ctx.queue.read_next("transcribe", "some-consumer", std::time::Duration::from_secs(1)).await.unwrap();

    sweep(&ctx, stale_threshold()).await.unwrap();

    assert_eq!(fakes.queue.unacked_len("transcribe"), 1);
}

#[tokio::test]
async fn stale_ready_task_from_dead_engine_is_reenqueued_then_acked() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder().job_id(job.id).stage("transcribe").status(TaskStatus::Ready).build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    let dead_instance = InstanceId::new(&task.engine_id);
    fakes
        .registry
        .register(&InstanceInfo {
            engine_id: task.engine_id.clone(),
            instance_id: dead_instance.clone(),
            status: InstanceStatus::Online,
            capabilities: vec!["transcribe".to_string()],
        })
        .await
        .unwrap();

    let message_id = ctx
        .queue
        .add("transcribe", EnqueueFields { task_id: task.id, job_id: job.id, engine_id: task.engine_id.clone(), timeout_at: chrono::Utc::now(), request_id: None }, None)
        .await
        .unwrap()
        .unwrap();
    ctx.queue.read_next("transcribe", dead_instance.as_str(), std::time::Duration::from_secs(1)).await.unwrap();
    fakes.queue.set_idle_ms("transcribe", &message_id, 10 * 60 * 1000);

    fakes.registry.expire(&dead_instance);

    // A fresh live instance is registered so `enqueue`'s liveness check for
    // the recovery re-add passes.
    let live_instance = InstanceId::new(&task.engine_id);
    fakes
        .registry
        .register(&InstanceInfo {
            engine_id: task.engine_id.clone(),
            instance_id: live_instance,
            status: InstanceStatus::Online,
            capabilities: vec!["transcribe".to_string()],
        })
        .await
        .unwrap();

    sweep(&ctx, stale_threshold()).await.unwrap();

    assert_eq!(fakes.queue.unacked_len("transcribe"), 1);
    assert!(fakes.bus.fanout_log().is_empty());
}

#[tokio::test]
async fn stale_running_task_from_dead_engine_resolves_via_artifact() {
    let (ctx, fakes) = fake_ctx();
    let job: Job = Job::builder().tenant_id("tenant-a").status(JobStatus::Running).build();
    fakes.jobs.seed(job.clone());
    let task: Task = Task::builder()
        .job_id(job.id)
        .stage("transcribe")
        .status(TaskStatus::Running)
        .started_at(Some(chrono::Utc::now() - chrono::Duration::hours(2)))
        .build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    let dead_instance = InstanceId::new(&task.engine_id);
    fakes
        .registry
        .register(&InstanceInfo {
            engine_id: task.engine_id.clone(),
            instance_id: dead_instance.clone(),
            status: InstanceStatus::Online,
            capabilities: vec!["transcribe".to_string()],
        })
        .await
        .unwrap();

    let message_id = ctx
        .queue
        .add("transcribe", EnqueueFields { task_id: task.id, job_id: job.id, engine_id: task.engine_id.clone(), timeout_at: chrono::Utc::now(), request_id: None }, None)
        .await
        .unwrap()
        .unwrap();
    ctx.queue.read_next("transcribe", dead_instance.as_str(), std::time::Duration::from_secs(1)).await.unwrap();
    fakes.queue.set_idle_ms("transcribe", &message_id, 10 * 60 * 1000);
    fakes.registry.expire(&dead_instance);

    let expected_output = format!("s3://dalston/{}/{}/output.json", task.job_id, task.id);
    fakes.artifacts.seed(&expected_output, serde_json::json!({"word_count": 10}));

    sweep(&ctx, stale_threshold()).await.unwrap();

    assert_eq!(fakes.tasks.snapshot(task.id).unwrap().status, TaskStatus::Completed);
    assert_eq!(fakes.queue.unacked_len("transcribe"), 0);
}

#[tokio::test]
async fn prune_expired_runs_without_error() {
    let (ctx, _fakes) = fake_ctx();
    sweep(&ctx, stale_threshold()).await.unwrap();
}

#[tokio::test]
async fn only_one_of_two_contending_guards_wins_the_tick() {
    let guard = FakeDistributedGuard::new();
    let first = guard.try_acquire(dalston_queue::reconciler_lock_key(), std::time::Duration::from_secs(60)).await.unwrap();
    let second = guard.try_acquire(dalston_queue::reconciler_lock_key(), std::time::Duration::from_secs(60)).await.unwrap();
    assert!(first);
    assert!(!second);
}
