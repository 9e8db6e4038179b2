// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle service: the single writer of job state transitions.
//!
//! Every transition goes through the store's locked update path and appends
//! exactly one event, so the event log is a complete audit trail of the
//! job's history. State-machine violations surface as `Conflict` and are
//! never retried.

use crewd_adapters::QueueAdapter;
use crewd_core::{
    ApprovalState, Clock, CoordError, Job, JobAction, JobConfig, JobEvent, JobId, JobMode,
    JobOptions, JobStatus,
};
use crewd_storage::{JobStore, StoreError};
use std::sync::Arc;

/// A job-creation request as consumed from the API layer.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub provider: String,
    pub mode: JobMode,
    pub repo: String,
    pub git_ref: String,
    pub task: String,
    pub options: JobOptions,
    /// Optional client-supplied key: repeating it with an identical request
    /// returns the job it originally created instead of making a new one.
    pub idempotency_key: Option<String>,
}

impl CreateJobRequest {
    pub fn new(provider: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            mode: JobMode::Solo,
            repo: String::new(),
            git_ref: "main".to_string(),
            task: task.into(),
            options: JobOptions::default(),
            idempotency_key: None,
        }
    }

    crewd_core::setters! {
        into {
            repo: String,
            git_ref: String,
        }
        set {
            mode: JobMode,
            options: JobOptions,
        }
        option {
            idempotency_key: String,
        }
    }

    /// Canonical serialization used to detect idempotency-key reuse with a
    /// different request.
    fn fingerprint(&self) -> Result<String, CoordError> {
        Ok(serde_json::to_string(&(
            &self.provider,
            self.mode,
            &self.repo,
            &self.git_ref,
            &self.task,
            &self.options,
        ))?)
    }
}

/// Drives the job state machine against the durable store.
pub struct Lifecycle<Q: QueueAdapter, C: Clock> {
    store: Arc<JobStore>,
    queue: Q,
    clock: C,
}

impl<Q: QueueAdapter, C: Clock> Lifecycle<Q, C> {
    pub fn new(store: Arc<JobStore>, queue: Q, clock: C) -> Self {
        Self { store, queue, clock }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Create a job: persist the record, append the `queued` event, enqueue.
    ///
    /// An enqueue failure is logged but not fatal; the record stays `queued`
    /// and a later re-enqueue or the file fallback picks it up.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<Job, CoordError> {
        let fingerprint = request.fingerprint()?;
        if let Some(key) = &request.idempotency_key {
            if let Some(record) = self.store.idempotency_get(key)? {
                if record.fingerprint == fingerprint {
                    let job = self.store.read(&record.job_id)?;
                    tracing::info!(job_id = %job.id, key, "idempotency key reused, returning existing job");
                    return Ok(job);
                }
                return Err(CoordError::Conflict(format!(
                    "idempotency key {key} was used by a different request"
                )));
            }
        }

        let config = JobConfig::builder(request.provider, request.task)
            .mode(request.mode)
            .repo(request.repo)
            .git_ref(request.git_ref)
            .options(request.options)
            .build();
        let job = Job::new(config, &self.clock);
        self.store.create(&job)?;
        if let Some(key) = &request.idempotency_key {
            self.store.idempotency_put(key, &job.id, &fingerprint)?;
        }
        self.store.append_event(&job.id, "queued", "job created", None, job.created_at_ms)?;

        if let Err(e) = self.queue.enqueue(&job.id).await {
            tracing::warn!(job_id = %job.id, error = %e, "enqueue failed, job stays queued");
        }
        tracing::info!(job_id = %job.id, mode = %job.mode, "job created");
        Ok(job)
    }

    pub fn job(&self, id: &JobId) -> Result<Job, CoordError> {
        Ok(self.store.read(id)?)
    }

    pub fn events(&self, id: &JobId, limit: usize) -> Result<Vec<JobEvent>, CoordError> {
        Ok(self.store.list_events(id, limit)?)
    }

    /// Apply a caller action. Exactly one event per successful transition.
    pub async fn apply_action(&self, id: &JobId, action: JobAction) -> Result<Job, CoordError> {
        let job = match action {
            JobAction::Cancel => self.cancel(id)?,
            JobAction::Approve => self.approve(id)?,
            JobAction::Reject => self.reject(id)?,
        };
        // Approve puts the job back in line for pickup.
        if action == JobAction::Approve {
            if let Err(e) = self.queue.enqueue(id).await {
                tracing::warn!(job_id = %id, error = %e, "re-enqueue after approval failed");
            }
        }
        Ok(job)
    }

    /// Cancel: reachable from any non-terminal state. Cooperative — in-flight
    /// workers notice the terminal status during polling and exit.
    fn cancel(&self, id: &JobId) -> Result<Job, CoordError> {
        let now = self.clock.epoch_ms();
        let job = self.store.try_update(id, now, |job| {
            if job.is_terminal() {
                return Err(conflict(id, job.status, "cancel"));
            }
            job.finish(JobStatus::Canceled, Some("canceled by caller".to_string()), now);
            Ok(())
        })?;
        self.store.append_event(id, "canceled", "job canceled", None, now)?;
        tracing::info!(job_id = %id, "job canceled");
        Ok(job)
    }

    /// Approve: only valid while waiting at the approval gate; the job goes
    /// back to `queued` for pickup.
    fn approve(&self, id: &JobId) -> Result<Job, CoordError> {
        let now = self.clock.epoch_ms();
        let job = self.store.try_update(id, now, |job| {
            if job.status != JobStatus::WaitingApproval {
                return Err(conflict(id, job.status, "approve"));
            }
            job.approval = ApprovalState::Approved;
            job.error = None;
            job.advance(JobStatus::Queued, now);
            Ok(())
        })?;
        self.store.append_event(id, "approval", "job approved", None, now)?;
        tracing::info!(job_id = %id, "job approved");
        Ok(job)
    }

    /// Reject: only valid while waiting at the approval gate; terminal.
    fn reject(&self, id: &JobId) -> Result<Job, CoordError> {
        let now = self.clock.epoch_ms();
        let job = self.store.try_update(id, now, |job| {
            if job.status != JobStatus::WaitingApproval {
                return Err(conflict(id, job.status, "reject"));
            }
            job.approval = ApprovalState::Rejected;
            job.finish(JobStatus::Failed, Some("approval rejected".to_string()), now);
            Ok(())
        })?;
        self.store.append_event(id, "approval", "job rejected", None, now)?;
        tracing::info!(job_id = %id, "job rejected");
        Ok(job)
    }

    /// Worker-side: claim confirmed, execution starting.
    pub fn mark_running(&self, id: &JobId) -> Result<Job, CoordError> {
        let now = self.clock.epoch_ms();
        let job = self.store.try_update(id, now, |job| {
            if !job.status.allows(JobStatus::Running) {
                return Err(conflict(id, job.status, "run"));
            }
            job.advance(JobStatus::Running, now);
            Ok(())
        })?;
        self.store.append_event(id, "running", "execution started", None, now)?;
        Ok(job)
    }

    /// Worker-side: stop at the approval gate.
    pub fn mark_waiting_approval(&self, id: &JobId) -> Result<Job, CoordError> {
        let now = self.clock.epoch_ms();
        let job = self.store.try_update(id, now, |job| {
            if !job.status.allows(JobStatus::WaitingApproval) {
                return Err(conflict(id, job.status, "wait for approval"));
            }
            job.approval = ApprovalState::Required;
            job.advance(JobStatus::WaitingApproval, now);
            Ok(())
        })?;
        self.store.append_event(id, "waiting_approval", "awaiting approval", None, now)?;
        Ok(job)
    }

    /// Worker-side: record the terminal outcome. Terminal states are final.
    pub fn finalize(
        &self,
        id: &JobId,
        status: JobStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Job, CoordError> {
        if !status.is_terminal() {
            return Err(CoordError::Conflict(format!("finalize with non-terminal {status}")));
        }
        let now = self.clock.epoch_ms();
        let error_for_event = error.clone();
        let job = self.store.try_update(id, now, |job| {
            if !job.status.allows(status) {
                return Err(conflict(id, job.status, "finalize"));
            }
            job.output = output;
            job.finish(status, error, now);
            Ok(())
        })?;
        let message = error_for_event.unwrap_or_else(|| format!("job {status}"));
        self.store.append_event(id, &status.to_string(), &message, None, now)?;
        tracing::info!(job_id = %id, %status, "job finalized");
        Ok(job)
    }
}

fn conflict(id: &JobId, status: JobStatus, action: &str) -> StoreError {
    StoreError::Conflict(format!("cannot {action} job {id} in state {status}"))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
