//! Recovery specs
//!
//! Everything durable reopens cleanly: job records and event logs survive
//! a restart, and a new coordinator reattaches to a team it did not start.

use crate::prelude::*;

#[tokio::test]
async fn job_state_survives_reopening_the_store() {
    let h = Harness::new();
    let job = h.create(solo_request()).await;
    h.lifecycle.mark_running(&job.id).unwrap();

    // "Restart": a fresh store over the same directory.
    let reopened = JobStore::new(h.dir.path());
    let read = reopened.read(&job.id).unwrap();
    assert_eq!(read.status, JobStatus::Running);
    assert_eq!(read.task, "fix the flaky test");

    let events = reopened.list_events(&job.id, 10).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["queued", "running"]);

    // The idempotency index survives too: a retry still maps to the job.
    let h2_job = h.create(solo_request().idempotency_key("boot-1")).await;
    let reopened = JobStore::new(h.dir.path());
    let record = reopened.idempotency_get("boot-1").unwrap().unwrap();
    assert_eq!(record.job_id, h2_job.id);
}

#[tokio::test]
async fn a_new_coordinator_reattaches_to_a_running_team() {
    let h = Harness::new();
    let job = h.create(team_request(2)).await;
    let job = h.lifecycle.mark_running(&job.id).unwrap();
    let run = h.coordinator.start(&job).await.unwrap();

    // Some progress happens before the restart.
    let worker = run.workers[0].0.clone();
    let now = h.clock.epoch_ms();
    run.team.claim_task(TaskId(0), &worker, now).unwrap();
    run.team.start_task(TaskId(0), &worker, now).unwrap();
    run.team.complete_task(TaskId(0), &worker, Some(json!({"plan": "a"})), now).unwrap();

    // A second coordinator over the same state directory.
    let fresh = Coordinator::new(
        Arc::clone(&h.store),
        h.teams_root(),
        h.procs.clone(),
        h.clock.clone(),
    );
    let resumed = fresh.resume(&run.config.name).unwrap();
    assert_eq!(resumed.config, run.config);
    assert_eq!(resumed.workers.len(), 2);
    assert_eq!(resumed.team.phase(), TeamPhase::Running);

    let metrics = resumed.team.metrics().unwrap();
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.pending, 3);

    // The completed work is not redone: its result is still on the task.
    let task = resumed.team.task(TaskId(0)).unwrap();
    assert_eq!(task.result, Some(json!({"plan": "a"})));
}

#[tokio::test]
async fn teardown_is_idempotent_and_late_writes_are_benign() {
    let h = Harness::new();
    let job = h.create(team_request(1)).await;
    let job = h.lifecycle.mark_running(&job.id).unwrap();
    let run = h.coordinator.start(&job).await.unwrap();

    run.team.remove().unwrap();
    run.team.remove().unwrap();

    // A worker racing the teardown writes into the void without erroring.
    run.team.set_phase(TeamPhase::Failed).unwrap();
    run.team
        .post(&crewd_core::MailboxEntry::new(
            MailAddress::Leader,
            MailAddress::Worker(run.workers[0].0.clone()),
            TeamMessage::Shutdown.to_body(),
            h.clock.epoch_ms(),
        ))
        .unwrap();

    assert!(matches!(
        TeamStore::load(&h.teams_root(), &run.config.name),
        Err(StoreError::NotFound(_))
    ));
}
