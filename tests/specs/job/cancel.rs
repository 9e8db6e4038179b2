//! Cancellation specs
//!
//! Cancel reaches any non-terminal state, is itself terminal, and
//! cooperatively stops a live team run.

use crate::prelude::*;

#[tokio::test]
async fn cancel_reaches_every_non_terminal_state() {
    let h = Harness::new();

    let queued = h.create(solo_request()).await;
    let canceled = h.lifecycle.apply_action(&queued.id, JobAction::Cancel).await.unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);

    let running = h.create(solo_request()).await;
    h.lifecycle.mark_running(&running.id).unwrap();
    let canceled = h.lifecycle.apply_action(&running.id, JobAction::Cancel).await.unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);

    let waiting = h.create(solo_request()).await;
    h.lifecycle.mark_running(&waiting.id).unwrap();
    h.lifecycle.mark_waiting_approval(&waiting.id).unwrap();
    let canceled = h.lifecycle.apply_action(&waiting.id, JobAction::Cancel).await.unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);
}

#[tokio::test]
async fn a_second_cancel_is_refused_without_a_second_event() {
    let h = Harness::new();
    let job = h.create(solo_request()).await;

    h.lifecycle.apply_action(&job.id, JobAction::Cancel).await.unwrap();
    let err = h.lifecycle.apply_action(&job.id, JobAction::Cancel).await.unwrap_err();
    assert!(matches!(err, CoordError::Conflict(_)));

    let events = h.lifecycle.events(&job.id, 10).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, "canceled");
}

#[tokio::test]
async fn cancel_stops_a_live_team_run() {
    let h = Harness::new();
    let job = h.create(team_request(1)).await;
    let teams_root = h.teams_root();
    let name = TeamConfig::for_job(&h.store.read(&job.id).unwrap()).name;
    let lifecycle = Arc::new(h.lifecycle);

    // Cancel from the side once the team directory appears.
    let canceler = Arc::clone(&lifecycle);
    let cancel_id = job.id.clone();
    tokio::spawn(async move {
        while TeamStore::load(&teams_root, &name).is_err() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let _ = canceler.apply_action(&cancel_id, JobAction::Cancel).await;
    });

    let done = run_team_job(&lifecycle, &h.coordinator, &job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Canceled);
    // The coordinator tore the workers down on its way out.
    assert_eq!(h.procs.terminations().len(), 1);
}
