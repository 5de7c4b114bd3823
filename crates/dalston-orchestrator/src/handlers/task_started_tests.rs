use super::*;
use crate::test_support::fake_ctx;
use dalston_core::id::JobId;
use dalston_core::task::Task;

#[tokio::test]
async fn claims_a_ready_task() {
    let (ctx, fakes) = fake_ctx();
    let job_id = JobId::new();
    let task: Task = Task::builder().job_id(job_id).status(TaskStatus::Ready).build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job_id, None).await.unwrap();

    let stored = fakes.tasks.snapshot(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert!(stored.started_at.is_some());
}

#[tokio::test]
async fn replay_against_running_task_is_a_no_op() {
    let (ctx, _fakes) = fake_ctx();
    let job_id = JobId::new();
    let task: Task = Task::builder().job_id(job_id).status(TaskStatus::Running).build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job_id, None).await.unwrap();

    let stored = ctx.tasks.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
}

#[tokio::test]
async fn rejects_claim_against_a_cancelled_task() {
    let (ctx, _fakes) = fake_ctx();
    let job_id = JobId::new();
    let task: Task = Task::builder().job_id(job_id).status(TaskStatus::Cancelled).build();
    ctx.tasks.insert_all(&[task.clone()]).await.unwrap();

    handle(&ctx, task.id, job_id, None).await.unwrap();

    let stored = ctx.tasks.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
}
