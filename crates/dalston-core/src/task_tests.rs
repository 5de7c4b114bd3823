use super::*;

#[test]
fn base_stage_strips_channel_suffix() {
    let t = Task::builder().stage("transcribe_ch0").build();
    assert_eq!(t.base_stage(), "transcribe");
    let t2 = Task::builder().stage("align_ch1").build();
    assert_eq!(t2.base_stage(), "align");
}

#[test]
fn base_stage_leaves_non_channel_stages_alone() {
    let t = Task::builder().stage("merge").build();
    assert_eq!(t.base_stage(), "merge");
}

#[test]
fn dependencies_satisfied_requires_all_terminal_success() {
    let dep_a = TaskId::new();
    let dep_b = TaskId::new();
    let t = Task::builder().dependencies(vec![dep_a, dep_b]).build();

    let mut statuses = HashMap::new();
    statuses.insert(dep_a, TaskStatus::Completed);
    assert!(!t.dependencies_satisfied(&statuses));

    statuses.insert(dep_b, TaskStatus::Skipped);
    assert!(t.dependencies_satisfied(&statuses));
}

#[test]
fn missing_dependency_status_is_unsatisfied() {
    let dep = TaskId::new();
    let t = Task::builder().dependencies(vec![dep]).build();
    assert!(!t.dependencies_satisfied(&HashMap::new()));
}

#[test]
fn task_status_round_trips_through_display_and_from_str() {
    for status in [
        TaskStatus::Pending,
        TaskStatus::Ready,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Skipped,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ] {
        let parsed: TaskStatus = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
}

#[test]
fn retries_exhausted_at_max() {
    let t = Task::builder().retries(2).max_retries(2).build();
    assert!(t.retries_exhausted());
    let t2 = Task::builder().retries(1).max_retries(2).build();
    assert!(!t2.retries_exhausted());
}
