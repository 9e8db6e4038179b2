//! Task claim specs
//!
//! The claim path is the team's only mutual exclusion: one winner per
//! task, dependencies gate eligibility, expired claims are reclaimed, and
//! an abandoned lock marker never wedges the team.

use crate::prelude::*;
use crewd_core::test_support::test_task;
use crewd_core::JobId;

fn init_team(teams_root: &std::path::Path, tasks: &[Task]) -> TeamStore {
    let config = TeamConfig {
        name: "crew-spec".to_string(),
        job_id: JobId::from_string("job-spec0000000000000001"),
        worker_count: 2,
        roles: vec!["planner".to_string(), "implementer".to_string()],
        task_timeout_ms: 60_000,
        team_budget_ms: 3_600_000,
    };
    TeamStore::init(teams_root, &config, tasks).unwrap()
}

#[test]
fn only_one_claimant_wins_a_task() {
    let dir = tempfile::tempdir().unwrap();
    let team = init_team(dir.path(), &[test_task(0, &[])]);

    let mut handles = Vec::new();
    for n in 0..8 {
        let team = team.clone();
        handles.push(std::thread::spawn(move || {
            let worker = WorkerId::for_slot("crew-spec", n);
            team.claim_task(TaskId(0), &worker, 2_000_000).is_ok()
        }));
    }
    let wins =
        handles.into_iter().map(|h| h.join().unwrap()).filter(|&won| won).count();
    assert_eq!(wins, 1);

    let task = team.task(TaskId(0)).unwrap();
    assert_eq!(task.status, TaskStatus::Claimed);
    assert!(task.worker_id.is_some());
}

#[test]
fn dependencies_gate_claiming() {
    let dir = tempfile::tempdir().unwrap();
    let team = init_team(dir.path(), &[test_task(0, &[]), test_task(1, &[0])]);
    let worker = WorkerId::for_slot("crew-spec", 0);

    // B before A is refused.
    let err = team.claim_task(TaskId(1), &worker, 2_000_000).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    team.claim_task(TaskId(0), &worker, 2_000_000).unwrap();
    team.start_task(TaskId(0), &worker, 2_000_000).unwrap();
    team.complete_task(TaskId(0), &worker, Some(json!({"plan": "a"})), 2_000_100).unwrap();

    // A complete makes B eligible.
    team.claim_task(TaskId(1), &worker, 2_000_200).unwrap();
}

#[test]
fn expired_claims_are_released_with_the_attempt_counted() {
    let dir = tempfile::tempdir().unwrap();
    let team = init_team(dir.path(), &[test_task(0, &[])]);
    let worker = WorkerId::for_slot("crew-spec", 0);

    team.claim_task(TaskId(0), &worker, 2_000_000).unwrap();

    // Within the timeout nothing is reclaimed.
    assert!(team.release_expired_claims(2_030_000).unwrap().is_empty());

    // Past the 60s claim timeout the task returns to pending.
    let released = team.release_expired_claims(2_060_001).unwrap();
    assert_eq!(released, vec![TaskId(0)]);
    let task = team.task(TaskId(0)).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempts, 1);
    assert!(task.worker_id.is_none());

    // Another worker can pick it up.
    let other = WorkerId::for_slot("crew-spec", 1);
    team.claim_task(TaskId(0), &other, 2_060_002).unwrap();
}

#[test]
fn exhausted_attempts_fail_the_task_and_block_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let team = init_team(
        dir.path(),
        &[test_task(0, &[]), test_task(1, &[0]), test_task(2, &[1]), test_task(3, &[0])],
    );
    let worker = WorkerId::for_slot("crew-spec", 0);

    for n in 0..3u64 {
        let now = 2_000_000 + n;
        team.claim_task(TaskId(0), &worker, now).unwrap();
        team.fail_task(TaskId(0), &worker, "no dice", now).unwrap();
    }

    let tasks = team.list_tasks().unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[0].error.as_deref(), Some("no dice"));
    // Direct and transitive dependents are blocked.
    assert_eq!(tasks[1].status, TaskStatus::Blocked);
    assert_eq!(tasks[2].status, TaskStatus::Blocked);
    assert_eq!(tasks[3].status, TaskStatus::Blocked);

    let metrics = team.metrics().unwrap();
    assert!(metrics.is_settled());
    assert!(!metrics.is_clean());
}

#[test]
fn an_abandoned_lock_marker_does_not_wedge_the_team() {
    let dir = tempfile::tempdir().unwrap();
    let team = init_team(dir.path(), &[test_task(0, &[])]);

    // A crash between marker creation and release leaves a torn marker
    // behind; the next claimant reclaims it instead of waiting forever.
    let marker = dir.path().join("crew-spec/tasks/0.lock");
    std::fs::write(&marker, "torn").unwrap();

    let worker = WorkerId::for_slot("crew-spec", 0);
    team.claim_task(TaskId(0), &worker, 2_000_000).unwrap();
    assert_eq!(team.task(TaskId(0)).unwrap().status, TaskStatus::Claimed);
}
