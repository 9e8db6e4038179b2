//! Job lifecycle specs
//!
//! The core invariants: `finished_at` is set exactly when the status is
//! terminal, every transition appends exactly one event, concurrent
//! callers never corrupt a record, and subscribers see the full event
//! history in order.

use crate::prelude::*;

#[tokio::test]
async fn finished_at_is_set_exactly_when_terminal() {
    let h = Harness::new();

    let job = h.create(solo_request()).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.finished_at_ms.is_none());

    let running = h.lifecycle.mark_running(&job.id).unwrap();
    assert!(running.finished_at_ms.is_none());
    assert_eq!(running.started_at_ms, Some(h.clock.epoch_ms()));

    h.clock.advance(Duration::from_secs(5));
    let done = h
        .lifecycle
        .finalize(&job.id, JobStatus::Succeeded, Some(json!({"pr": 7})), None)
        .unwrap();
    assert_eq!(done.finished_at_ms, Some(h.clock.epoch_ms()));
    assert_eq!(done.output, Some(json!({"pr": 7})));

    // Failure and cancellation stamp it too.
    let failed = h.create(solo_request()).await;
    h.lifecycle.mark_running(&failed.id).unwrap();
    let failed = h
        .lifecycle
        .finalize(&failed.id, JobStatus::Failed, None, Some("agent exited 1".to_string()))
        .unwrap();
    assert!(failed.finished_at_ms.is_some());
    assert_eq!(failed.error.as_deref(), Some("agent exited 1"));

    let canceled = h.create(solo_request()).await;
    let canceled = h.lifecycle.apply_action(&canceled.id, JobAction::Cancel).await.unwrap();
    assert!(canceled.finished_at_ms.is_some());
}

#[tokio::test]
async fn every_transition_appends_exactly_one_event() {
    let h = Harness::new();
    let job = h.create(solo_request()).await;

    h.clock.advance(Duration::from_secs(1));
    h.lifecycle.mark_running(&job.id).unwrap();
    h.clock.advance(Duration::from_secs(1));
    h.lifecycle.finalize(&job.id, JobStatus::Succeeded, None, None).unwrap();

    // A refused transition adds nothing.
    h.lifecycle.finalize(&job.id, JobStatus::Failed, None, None).unwrap_err();

    let events = h.lifecycle.events(&job.id, 10).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["queued", "running", "succeeded"]);
    assert!(events.windows(2).all(|w| w[0].created_at_ms <= w[1].created_at_ms));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancels_have_exactly_one_winner() {
    let h = Harness::new();
    let job = h.create(solo_request()).await;
    let lifecycle = Arc::new(h.lifecycle);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let lifecycle = Arc::clone(&lifecycle);
        let id = job.id.clone();
        handles.push(tokio::spawn(async move {
            lifecycle.apply_action(&id, JobAction::Cancel).await.is_ok()
        }));
    }
    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let events = lifecycle.events(&job.id, 10).unwrap();
    assert_eq!(events.len(), 2); // queued + exactly one canceled
}

#[tokio::test]
async fn subscribers_see_the_full_history_in_order() {
    let h = Harness::new();
    let job = h.create(solo_request()).await;

    let stream = EventStream::new(Arc::clone(&h.store))
        .with_poll_interval(Duration::from_millis(5));
    let mut rx = stream.subscribe(job.id.clone());

    h.lifecycle.mark_running(&job.id).unwrap();
    h.lifecycle.finalize(&job.id, JobStatus::Succeeded, None, None).unwrap();

    let mut types = Vec::new();
    while let Some(event) = rx.recv().await {
        types.push(event.event_type);
    }
    assert_eq!(types, vec!["queued", "running", "succeeded"]);
}
