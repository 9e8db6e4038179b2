//! Approval gate specs
//!
//! Jobs created with `require_approval` stop at the gate; approval puts
//! them back in the queue, rejection fails them terminally.

use crate::prelude::*;

fn gated_request() -> CreateJobRequest {
    let mut options = JobOptions::default();
    options.require_approval = true;
    solo_request().options(options)
}

#[tokio::test]
async fn approved_jobs_return_to_the_queue_and_finish() {
    let h = Harness::new();
    let job = h.create(gated_request()).await;
    assert_eq!(job.approval, ApprovalState::Required);

    h.lifecycle.mark_running(&job.id).unwrap();
    let waiting = h.lifecycle.mark_waiting_approval(&job.id).unwrap();
    assert_eq!(waiting.status, JobStatus::WaitingApproval);

    let approved = h.lifecycle.apply_action(&job.id, JobAction::Approve).await.unwrap();
    assert_eq!(approved.status, JobStatus::Queued);
    assert_eq!(approved.approval, ApprovalState::Approved);
    // Initial enqueue plus the post-approval re-enqueue.
    assert_eq!(h.broker.publishes().len(), 2);

    // The approved job runs to completion like any other.
    h.lifecycle.mark_running(&job.id).unwrap();
    let done = h.lifecycle.finalize(&job.id, JobStatus::Succeeded, None, None).unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
}

#[tokio::test]
async fn rejection_is_terminal() {
    let h = Harness::new();
    let job = h.create(gated_request()).await;
    h.lifecycle.mark_running(&job.id).unwrap();
    h.lifecycle.mark_waiting_approval(&job.id).unwrap();

    let rejected = h.lifecycle.apply_action(&job.id, JobAction::Reject).await.unwrap();
    assert_eq!(rejected.status, JobStatus::Failed);
    assert_eq!(rejected.approval, ApprovalState::Rejected);
    assert_eq!(rejected.error.as_deref(), Some("approval rejected"));
    assert!(rejected.finished_at_ms.is_some());

    // Nothing moves a rejected job.
    let err = h.lifecycle.apply_action(&job.id, JobAction::Cancel).await.unwrap_err();
    assert!(matches!(err, CoordError::Conflict(_)));
    assert!(h.lifecycle.mark_running(&job.id).is_err());
}

#[tokio::test]
async fn gate_actions_outside_waiting_approval_are_refused() {
    let h = Harness::new();
    let job = h.create(gated_request()).await;

    let err = h.lifecycle.apply_action(&job.id, JobAction::Approve).await.unwrap_err();
    assert!(matches!(err, CoordError::Conflict(_)));

    h.lifecycle.mark_running(&job.id).unwrap();
    let err = h.lifecycle.apply_action(&job.id, JobAction::Reject).await.unwrap_err();
    assert!(matches!(err, CoordError::Conflict(_)));

    // The refused actions left no trace in the event log.
    let events = h.lifecycle.events(&job.id, 10).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["queued", "running"]);
}
