// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crewd_core::JobId;

fn id(s: &str) -> JobId {
    JobId::from_string(s)
}

#[tokio::test]
async fn broker_queue_publishes_the_job_id() {
    let broker = FakeBroker::new();
    let queue = BrokerQueue::new(broker.clone(), "crewd.jobs");

    queue.enqueue(&id("job-abc")).await.unwrap();

    let publishes = broker.publishes();
    assert_eq!(publishes, vec![("crewd.jobs".to_string(), "job-abc".to_string())]);
}

#[tokio::test]
async fn broker_failure_surfaces_as_publish_failed() {
    let broker = FakeBroker::new();
    broker.set_failing(true);
    let queue = BrokerQueue::new(broker, "crewd.jobs");

    let err = queue.enqueue(&id("job-abc")).await.unwrap_err();
    assert!(matches!(err, QueueError::PublishFailed(_)));
}

#[tokio::test]
async fn file_queue_enqueue_then_claim_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let queue = FileQueue::new(dir.path());

    queue.enqueue(&id("job-abc")).await.unwrap();
    let claimed = queue.poll_claim().unwrap();
    assert_eq!(claimed, Some(id("job-abc")));

    // The descriptor moved to processing; nothing is pending.
    assert_eq!(queue.poll_claim().unwrap(), None);
}

#[tokio::test]
async fn enqueue_is_idempotent_while_pending_and_while_processing() {
    let dir = tempfile::tempdir().unwrap();
    let queue = FileQueue::new(dir.path());

    queue.enqueue(&id("job-abc")).await.unwrap();
    queue.enqueue(&id("job-abc")).await.unwrap();
    assert_eq!(queue.poll_claim().unwrap(), Some(id("job-abc")));

    // Claimed but not complete: a re-enqueue must not reintroduce it.
    queue.enqueue(&id("job-abc")).await.unwrap();
    assert_eq!(queue.poll_claim().unwrap(), None);
}

#[tokio::test]
async fn complete_removes_the_processing_marker() {
    let dir = tempfile::tempdir().unwrap();
    let queue = FileQueue::new(dir.path());

    queue.enqueue(&id("job-abc")).await.unwrap();
    queue.poll_claim().unwrap();
    queue.complete(&id("job-abc")).unwrap();

    // Completed jobs may be enqueued again (e.g. approve re-queues).
    queue.enqueue(&id("job-abc")).await.unwrap();
    assert_eq!(queue.poll_claim().unwrap(), Some(id("job-abc")));
}

#[tokio::test]
async fn complete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let queue = FileQueue::new(dir.path());

    queue.complete(&id("job-never-queued")).unwrap();
}

#[tokio::test]
async fn claims_come_out_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    let queue = FileQueue::new(dir.path());

    queue.enqueue(&id("job-bbb")).await.unwrap();
    queue.enqueue(&id("job-aaa")).await.unwrap();

    assert_eq!(queue.poll_claim().unwrap(), Some(id("job-aaa")));
    assert_eq!(queue.poll_claim().unwrap(), Some(id("job-bbb")));
}

#[tokio::test]
async fn poll_on_empty_queue_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let queue = FileQueue::new(dir.path());
    assert_eq!(queue.poll_claim().unwrap(), None);
}

#[tokio::test]
async fn select_queue_uses_broker_only_when_url_is_set() {
    let dir = tempfile::tempdir().unwrap();
    let broker = FakeBroker::new();

    let queue = select_queue(Some("amqp://broker:5672"), dir.path(), broker.clone());
    queue.enqueue(&id("job-abc")).await.unwrap();
    assert_eq!(broker.publishes().len(), 1);

    let queue = select_queue(None, dir.path(), broker.clone());
    queue.enqueue(&id("job-def")).await.unwrap();
    // Went to the file fallback, not the broker.
    assert_eq!(broker.publishes().len(), 1);
    assert!(dir.path().join("queue/pending/job-def").exists());
}
