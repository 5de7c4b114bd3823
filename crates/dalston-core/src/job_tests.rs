use super::*;

#[test]
fn terminal_statuses_are_exactly_three() {
    let terminal: Vec<JobStatus> = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelling,
        JobStatus::Cancelled,
    ]
    .into_iter()
    .filter(|s| s.is_terminal())
    .collect();
    assert_eq!(terminal, vec![JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled]);
}

#[test]
fn auto_delete_computes_purge_after_from_hours() {
    let job = Job::builder().retention_mode(RetentionMode::AutoDelete).retention_hours(Some(48)).build();
    let now = Utc::now();
    let purge = job.compute_purge_after(now).unwrap();
    assert_eq!(purge, now + chrono::Duration::hours(48));
}

#[test]
fn auto_delete_defaults_to_24_hours_when_unset() {
    let job = Job::builder().retention_mode(RetentionMode::AutoDelete).build();
    let now = Utc::now();
    assert_eq!(job.compute_purge_after(now).unwrap(), now + chrono::Duration::hours(24));
}

#[test]
fn job_status_round_trips_through_display_and_from_str() {
    for status in [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelling,
        JobStatus::Cancelled,
    ] {
        let parsed: JobStatus = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
}

#[test]
fn keep_and_none_never_purge() {
    let now = Utc::now();
    assert!(Job::builder().retention_mode(RetentionMode::Keep).build().compute_purge_after(now).is_none());
    assert!(Job::builder().retention_mode(RetentionMode::None).build().compute_purge_after(now).is_none());
}
