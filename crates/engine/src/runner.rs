// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker runner: the worker-process side of the team protocol.
//!
//! A runner registers itself, prints the readiness line the coordinator
//! probes for, and then loops: heartbeat, check for cooperative shutdown
//! (job finished, team phase changed, or a `Shutdown` message), pick a
//! task (assigned via mailbox or first eligible), claim it, and execute it
//! through the agent invoker. Claim conflicts are expected under
//! contention and simply mean another worker got there first.

use crate::coordinator::TeamMessage;
use crewd_adapters::AgentInvoker;
use crewd_core::{
    Clock, CoordError, JobId, MailAddress, MailboxEntry, Task, TaskId, TaskStatus, TeamPhase,
    WorkerId, WorkerRecord, WorkerStatus,
};
use crewd_storage::{JobStore, StoreError, TeamStore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One worker's claim-execute-report loop.
pub struct Runner<C: Clock> {
    store: Arc<JobStore>,
    team: TeamStore,
    job_id: JobId,
    worker_id: WorkerId,
    role: String,
    provider: String,
    invoker: AgentInvoker,
    workdir: PathBuf,
    clock: C,
    poll_interval: Duration,
}

impl<C: Clock> Runner<C> {
    pub fn new(
        store: Arc<JobStore>,
        team: TeamStore,
        job_id: JobId,
        worker_id: WorkerId,
        role: impl Into<String>,
        provider: impl Into<String>,
        clock: C,
    ) -> Self {
        Self {
            store,
            team,
            job_id,
            worker_id,
            role: role.into(),
            provider: provider.into(),
            invoker: AgentInvoker::new(),
            workdir: PathBuf::from("."),
            clock,
            poll_interval: Duration::from_millis(250),
        }
    }

    crewd_core::setters! {
        set {
            invoker: AgentInvoker,
            workdir: PathBuf,
            poll_interval: Duration,
        }
    }

    /// Run until told to stop. The exit status is always recorded, even
    /// when the loop itself errors out.
    pub async fn run(&self) -> Result<(), CoordError> {
        let result = self.supervise().await;
        if let Err(e) = self.team.set_worker_status(&self.worker_id, WorkerStatus::Exited) {
            tracing::warn!(worker = %self.worker_id, error = %e, "exit status write failed");
        }
        tracing::info!(worker = %self.worker_id, ok = result.is_ok(), "worker stopped");
        result
    }

    async fn supervise(&self) -> Result<(), CoordError> {
        self.ensure_registered()?;
        // Readiness line; the coordinator tails our stdout for it.
        println!("READY");

        loop {
            let now = self.clock.epoch_ms();
            self.team.record_heartbeat(&self.worker_id, None, now)?;

            // Cooperative cancel: a finished (or vanished) job stops the
            // worker without any message from the leader.
            match self.store.read(&self.job_id) {
                Ok(job) if job.is_terminal() => return Ok(()),
                Err(StoreError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
                _ => {}
            }
            if !matches!(self.team.phase(), TeamPhase::Starting | TeamPhase::Running) {
                return Ok(());
            }

            let (assigned, shutdown) = self.drain_mailbox()?;
            if shutdown {
                return Ok(());
            }

            let candidate = match assigned {
                Some(task) => Some(task),
                None => self.find_eligible()?,
            };
            if let Some(id) = candidate {
                match self.team.claim_task(id, &self.worker_id, now) {
                    Ok(task) => {
                        self.execute(task).await?;
                        continue; // look for the next task right away
                    }
                    Err(StoreError::Conflict(_)) => {
                        tracing::debug!(worker = %self.worker_id, task = %id, "lost claim race");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// The coordinator normally registers us before spawn; a standalone
    /// runner registers itself.
    fn ensure_registered(&self) -> Result<(), CoordError> {
        match self.team.worker(&self.worker_id) {
            Ok(_) => Ok(self.team.record_heartbeat(
                &self.worker_id,
                Some(WorkerStatus::Idle),
                self.clock.epoch_ms(),
            )?),
            Err(StoreError::NotFound(_)) => {
                let record =
                    WorkerRecord::new(self.worker_id.clone(), &self.role, self.clock.epoch_ms());
                Ok(self.team.upsert_worker(&record)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drain our mailbox. The latest assignment wins; a shutdown anywhere
    /// in the batch trumps everything.
    fn drain_mailbox(&self) -> Result<(Option<TaskId>, bool), CoordError> {
        let mut assigned = None;
        let mut shutdown = false;
        for entry in self.team.take_undelivered(&MailAddress::Worker(self.worker_id.clone()))? {
            match TeamMessage::parse(&entry.body) {
                Some(TeamMessage::Shutdown) => shutdown = true,
                Some(TeamMessage::Assign { task }) => assigned = Some(task),
                other => {
                    tracing::debug!(worker = %self.worker_id, ?other, "unexpected mail ignored");
                }
            }
        }
        Ok((assigned, shutdown))
    }

    /// First pending task whose dependencies have all completed.
    fn find_eligible(&self) -> Result<Option<TaskId>, CoordError> {
        let tasks = self.team.list_tasks()?;
        let completed: HashSet<TaskId> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect();
        Ok(tasks
            .iter()
            .find(|t| t.status == TaskStatus::Pending && t.deps_satisfied(&completed))
            .map(|t| t.id))
    }

    /// Execute one claimed task and report the outcome to the leader.
    ///
    /// A `Conflict` anywhere along the way means our claim was reclaimed
    /// out from under us (timeout, leader sweep); the result is stale and
    /// the worker goes back to polling.
    async fn execute(&self, task: Task) -> Result<(), CoordError> {
        let now = self.clock.epoch_ms();
        self.team.record_heartbeat(&self.worker_id, Some(WorkerStatus::Busy), now)?;
        let task = match self.team.start_task(task.id, &self.worker_id, now) {
            Ok(task) => task,
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(worker = %self.worker_id, task = %task.id, "claim reclaimed before start");
                self.team.record_heartbeat(&self.worker_id, Some(WorkerStatus::Idle), now)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(worker = %self.worker_id, task = %task.id, "task started");

        let timeout = Duration::from_millis(task.timeout_ms);
        let (completed, write) = match self
            .invoker
            .run(&self.provider, &task.description, &self.workdir, timeout)
            .await
        {
            Ok(out) if out.success() => (
                true,
                self.team.complete_task(task.id, &self.worker_id, out.result, self.clock.epoch_ms()),
            ),
            Ok(out) => (
                false,
                self.team.fail_task(
                    task.id,
                    &self.worker_id,
                    &format!("agent exited {}", out.status),
                    self.clock.epoch_ms(),
                ),
            ),
            Err(e) => (
                false,
                self.team.fail_task(task.id, &self.worker_id, &e.to_string(), self.clock.epoch_ms()),
            ),
        };

        match write {
            Ok(_) => {
                self.team.post(&MailboxEntry::new(
                    MailAddress::Worker(self.worker_id.clone()),
                    MailAddress::Leader,
                    TeamMessage::Ack { task: task.id, completed }.to_body(),
                    self.clock.epoch_ms(),
                ))?;
                tracing::info!(worker = %self.worker_id, task = %task.id, completed, "task finished");
            }
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(worker = %self.worker_id, task = %task.id, "late result dropped, claim was reclaimed");
            }
            Err(e) => return Err(e.into()),
        }

        self.team.record_heartbeat(
            &self.worker_id,
            Some(WorkerStatus::Idle),
            self.clock.epoch_ms(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
