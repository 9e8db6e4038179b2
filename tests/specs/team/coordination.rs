//! Team coordination specs
//!
//! Full protocol runs: the coordinator derives the task graph and spawns
//! workers, a real runner loop claims and executes tasks through the
//! agent shim, and the job finishes with the team's verdict.

use crate::prelude::*;

/// Stand in for the worker process: wait for the team directory, then run
/// a real runner loop against it.
async fn worker_loop(
    store: Arc<JobStore>,
    teams_root: std::path::PathBuf,
    name: String,
    job_id: crewd_core::JobId,
    clock: FakeClock,
    workdir: std::path::PathBuf,
) -> Result<(), CoordError> {
    let team = loop {
        match TeamStore::load(&teams_root, &name) {
            Ok(team) => break team,
            Err(_) => tokio::time::sleep(Duration::from_millis(2)).await,
        }
    };
    // Route the "claude" provider to a binary that always succeeds, so the
    // template prompts execute without a real agent.
    let runner = Runner::new(
        store,
        team,
        job_id,
        WorkerId::for_slot(&name, 0),
        "planner",
        "claude",
        clock,
    )
    .invoker(AgentInvoker::new().with_binary("claude", "echo"))
    .workdir(workdir)
    .poll_interval(Duration::from_millis(5));
    runner.run().await
}

#[tokio::test]
async fn a_team_job_runs_to_succeeded_with_a_live_runner() {
    let h = Harness::new();
    let job = h.create(team_request(1)).await;
    let name = TeamConfig::for_job(&h.store.read(&job.id).unwrap()).name;

    let worker = tokio::spawn(worker_loop(
        Arc::clone(&h.store),
        h.teams_root(),
        name.clone(),
        job.id.clone(),
        h.clock.clone(),
        h.dir.path().to_path_buf(),
    ));

    let done = run_team_job(&h.lifecycle, &h.coordinator, &job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert!(done.finished_at_ms.is_some());

    // The runner saw the shutdown and exited cleanly.
    worker.await.unwrap().unwrap();

    // Every template task completed, claimed by the one worker.
    let team = TeamStore::load(&h.teams_root(), &name).unwrap();
    let tasks = team.list_tasks().unwrap();
    assert_eq!(tasks.len(), 4);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert!(tasks.iter().all(|t| t.worker_id == Some(WorkerId::for_slot(&name, 0))));
    assert_eq!(team.phase(), TeamPhase::Done);

    // The coordinator drained every ack the runner posted.
    assert!(team.take_undelivered(&MailAddress::Leader).unwrap().is_empty());

    let events = h.lifecycle.events(&job.id, 10).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["queued", "running", "succeeded"]);
}

#[tokio::test]
async fn a_poisoned_graph_fails_the_job_with_the_unresolved_tasks() {
    let h = Harness::new();
    let job = h.create(team_request(1)).await;
    let name = TeamConfig::for_job(&h.store.read(&job.id).unwrap()).name;

    // A worker whose agent binary always fails: every attempt on the root
    // task fails until it is permanent, and the rest of the chain blocks.
    let teams_root = h.teams_root();
    let clock = h.clock.clone();
    let poison_name = name.clone();
    tokio::spawn(async move {
        let team = loop {
            match TeamStore::load(&teams_root, &poison_name) {
                Ok(team) => break team,
                Err(_) => tokio::time::sleep(Duration::from_millis(2)).await,
            }
        };
        let worker = WorkerId::for_slot(&poison_name, 0);
        for _ in 0..3 {
            let now = clock.epoch_ms();
            let _ = team.claim_task(TaskId(0), &worker, now);
            let _ = team.fail_task(TaskId(0), &worker, "agent exited 1", now);
        }
    });

    let failed = run_team_job(&h.lifecycle, &h.coordinator, &job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    let error = failed.error.unwrap_or_default();
    assert!(error.starts_with("tasks failed or blocked"), "unexpected error: {error}");
    // All four template tasks are unresolved.
    assert!(error.contains('0') && error.contains('3'), "unexpected error: {error}");

    let team = TeamStore::load(&h.teams_root(), &name).unwrap();
    assert_eq!(team.phase(), TeamPhase::Failed);
}

#[tokio::test]
async fn the_snapshot_tracks_a_run_in_flight() {
    let h = Harness::new();
    let job = h.create(team_request(2)).await;
    let job = h.lifecycle.mark_running(&job.id).unwrap();

    let run = h.coordinator.start(&job).await.unwrap();
    let worker = run.workers[0].0.clone();
    let now = h.clock.epoch_ms();
    run.team.claim_task(TaskId(0), &worker, now).unwrap();
    run.team.start_task(TaskId(0), &worker, now).unwrap();

    let snapshot = h.coordinator.status(&run.config.name).unwrap();
    assert_eq!(snapshot.phase, TeamPhase::Running);
    assert_eq!(snapshot.current_task, Some(TaskId(0)));
    assert_eq!(snapshot.metrics.in_progress, 1);
    assert_eq!(snapshot.metrics.pending, 3);
    assert_eq!(snapshot.unresolved().len(), 4);
    assert_eq!(snapshot.workers.len(), 2);
}
