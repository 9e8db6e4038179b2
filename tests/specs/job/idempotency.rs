//! Idempotency specs
//!
//! Submission keys make retries safe, and the queue layer collapses
//! duplicate enqueues of the same job id.

use crate::prelude::*;
use crewd_core::JobId;

#[tokio::test]
async fn a_reused_key_returns_the_original_job() {
    let h = Harness::new();

    let first = h.create(solo_request().idempotency_key("req-42")).await;
    let second = h.create(solo_request().idempotency_key("req-42")).await;

    assert_eq!(first.id, second.id);
    assert_eq!(h.store.list_ids().unwrap().len(), 1);
    // The retry neither re-published nor re-logged.
    assert_eq!(h.broker.publishes().len(), 1);
    assert_eq!(h.lifecycle.events(&first.id, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn the_same_key_with_a_different_request_conflicts() {
    let h = Harness::new();
    h.create(solo_request().idempotency_key("req-42")).await;

    let err = h
        .lifecycle
        .create_job(CreateJobRequest::new("claude", "something else").idempotency_key("req-42"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Conflict(_)));
    assert_eq!(h.store.list_ids().unwrap().len(), 1);
}

#[tokio::test]
async fn the_file_queue_collapses_duplicate_enqueues() {
    let dir = tempfile::tempdir().unwrap();
    let queue = FileQueue::new(dir.path().join("queue"));
    let id = JobId::from_string("job-aaaaaaaaaaaaaaaaaaa");

    queue.enqueue(&id).await.unwrap();
    queue.enqueue(&id).await.unwrap();

    // One descriptor, one claim.
    assert_eq!(queue.poll_claim().unwrap(), Some(id.clone()));
    assert_eq!(queue.poll_claim().unwrap(), None);

    // Still claimed: a re-enqueue is a no-op until the job completes.
    queue.enqueue(&id).await.unwrap();
    assert_eq!(queue.poll_claim().unwrap(), None);

    queue.complete(&id).unwrap();
    queue.enqueue(&id).await.unwrap();
    assert_eq!(queue.poll_claim().unwrap(), Some(id));
}

#[tokio::test]
async fn a_broker_outage_leaves_the_job_queued_for_later_pickup() {
    let h = Harness::new();
    h.broker.set_failing(true);

    let job = h.create(solo_request()).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert!(h.broker.publishes().is_empty());

    // Approval-driven re-enqueue works once the broker recovers.
    h.broker.set_failing(false);
    h.lifecycle.mark_running(&job.id).unwrap();
    h.lifecycle.mark_waiting_approval(&job.id).unwrap();
    h.lifecycle.apply_action(&job.id, JobAction::Approve).await.unwrap();
    assert_eq!(h.broker.publishes().len(), 1);
}
