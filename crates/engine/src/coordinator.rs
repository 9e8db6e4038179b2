// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Team coordinator: runs one team-mode job end to end.
//!
//! The coordinator derives the task graph from the job, spawns one worker
//! process per slot, and then supervises the run: it reclaims expired
//! claims, flags workers that miss their heartbeat deadline, nudges idle
//! workers toward eligible tasks, and decides completion from the task
//! metrics. Workers make their own progress through the shared team
//! directory; the mailbox nudges are advisory and the claim path stays the
//! single point of mutual exclusion, so a duplicate or lost assignment is
//! harmless.

use crate::config;
use crate::lifecycle::Lifecycle;
use crewd_adapters::{ProcessAdapter, ProcessHandle, ProcessSpec, QueueAdapter};
use crewd_core::{
    job_tasks, Clock, CoordError, Job, JobId, JobStatus, MailAddress, MailboxEntry, TaskId,
    TaskStatus, TeamConfig, TeamPhase, TeamSnapshot, WorkerId, WorkerRecord, WorkerStatus,
};
use crewd_storage::{JobStore, TeamStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Messages exchanged between the leader and workers through the team
/// mailboxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamMessage {
    /// Leader → worker: an eligible task the worker should try to claim.
    Assign { task: TaskId },
    /// Leader → worker: stop after the current attempt and exit.
    Shutdown,
    /// Worker → leader: outcome of an executed task.
    Ack { task: TaskId, completed: bool },
}

impl TeamMessage {
    pub fn to_body(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a mailbox body. Unknown or torn bodies read as `None` so a
    /// newer peer never wedges an older one.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

/// Tuning knobs for a coordinator. Defaults come from the environment.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Program spawned for each worker slot.
    pub worker_program: String,
    /// How long a spawned worker may take to print its readiness line.
    pub ready_timeout: Duration,
    /// Graceful shutdown window per worker.
    pub grace: Duration,
    /// Missed-heartbeat deadline in milliseconds.
    pub heartbeat_deadline_ms: u64,
    /// Supervision loop interval.
    pub poll_interval: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            worker_program: config::worker_program(),
            ready_timeout: config::ready_timeout(),
            grace: config::grace_timeout(),
            heartbeat_deadline_ms: config::heartbeat_deadline_ms(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// A live team run: the spawned workers plus the team's durable state.
pub struct TeamRun {
    pub config: TeamConfig,
    pub team: TeamStore,
    pub workers: Vec<(WorkerId, ProcessHandle)>,
    pub started_at_ms: u64,
}

/// Leader side of the team protocol.
pub struct Coordinator<P: ProcessAdapter, C: Clock> {
    store: Arc<JobStore>,
    teams_root: PathBuf,
    processes: P,
    clock: C,
    options: CoordinatorOptions,
}

impl<P: ProcessAdapter, C: Clock> Coordinator<P, C> {
    pub fn new(store: Arc<JobStore>, teams_root: impl Into<PathBuf>, processes: P, clock: C) -> Self {
        Self {
            store,
            teams_root: teams_root.into(),
            processes,
            clock,
            options: CoordinatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Initialize the team directory and spawn one worker per slot.
    ///
    /// A worker that fails its readiness probe is flagged `Unresponsive`
    /// but does not abort the run; the remaining workers carry the load and
    /// the heartbeat sweep keeps the registry honest.
    pub async fn start(&self, job: &Job) -> Result<TeamRun, CoordError> {
        let now = self.clock.epoch_ms();
        let config = TeamConfig::for_job(job);
        let tasks = job_tasks(job, now);
        let team = TeamStore::init(&self.teams_root, &config, &tasks)?;

        let mut workers = Vec::with_capacity(config.worker_count as usize);
        for (slot, role) in config.roles.iter().enumerate() {
            let worker_id = WorkerId::for_slot(&config.name, slot as u32);
            let model = crewd_core::resolve_model(role, &job.options);
            let spec = ProcessSpec::new(&self.options.worker_program).env(vec![
                ("CREWD_TEAM".to_string(), config.name.clone()),
                ("CREWD_WORKER".to_string(), worker_id.to_string()),
                ("CREWD_ROLE".to_string(), role.clone()),
                ("CREWD_MODEL".to_string(), model),
                ("CREWD_JOB_ID".to_string(), job.id.to_string()),
            ]);
            let handle = self.processes.spawn(spec).await?;
            let mut record = WorkerRecord::new(worker_id.clone(), role.clone(), now);
            record.process_handle = Some(handle.id.clone());
            team.upsert_worker(&record)?;
            tracing::info!(team = %config.name, worker = %worker_id, %role, "worker spawned");
            workers.push((worker_id, handle));
        }

        for (worker_id, handle) in &workers {
            if !self.wait_ready(handle).await {
                tracing::warn!(team = %config.name, worker = %worker_id, "worker missed readiness probe");
                team.set_worker_status(worker_id, WorkerStatus::Unresponsive)?;
            }
        }

        team.set_phase(TeamPhase::Running)?;
        Ok(TeamRun { config, team, workers, started_at_ms: now })
    }

    /// Poll the worker's output for its readiness line.
    async fn wait_ready(&self, handle: &ProcessHandle) -> bool {
        let deadline = tokio::time::Instant::now() + self.options.ready_timeout;
        loop {
            if let Ok(tail) = self.processes.output_tail(handle, 50).await {
                if tail.lines().any(|l| l.trim() == "READY") {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Supervise the run until every task settles or the budget runs out.
    ///
    /// Returns the final snapshot; the team phase is `Done` when every task
    /// completed and `Failed` otherwise. Exceeding the budget aborts the
    /// workers and surfaces as `Timeout`.
    pub async fn run_until_complete(
        &self,
        run: &TeamRun,
        budget: Duration,
    ) -> Result<TeamSnapshot, CoordError> {
        loop {
            let now = self.clock.epoch_ms();
            if now.saturating_sub(run.started_at_ms) > budget.as_millis() as u64 {
                tracing::warn!(team = %run.config.name, ?budget, "team budget exhausted");
                self.shutdown(run, true).await?;
                run.team.set_phase(TeamPhase::Failed)?;
                return Err(CoordError::Timeout(format!(
                    "team {} exceeded budget of {budget:?}",
                    run.config.name
                )));
            }

            // The job can be canceled out from under the run; workers notice
            // on their own, the leader just stops supervising.
            if let Ok(job) = self.store.read(&run.config.job_id) {
                if job.is_terminal() {
                    tracing::info!(team = %run.config.name, status = %job.status, "job finished externally");
                    self.shutdown(run, false).await?;
                    let phase = if job.status == JobStatus::Succeeded {
                        TeamPhase::Done
                    } else {
                        TeamPhase::Failed
                    };
                    run.team.set_phase(phase)?;
                    return Ok(run.team.snapshot()?);
                }
            }

            let released = run.team.release_expired_claims(now)?;
            if !released.is_empty() {
                tracing::warn!(team = %run.config.name, count = released.len(), "expired claims reclaimed");
            }
            self.sweep_heartbeats(run, now)?;
            self.drain_acks(run)?;

            let metrics = run.team.metrics()?;
            if metrics.is_settled() {
                self.shutdown(run, false).await?;
                let phase = if metrics.is_clean() { TeamPhase::Done } else { TeamPhase::Failed };
                run.team.set_phase(phase)?;
                tracing::info!(team = %run.config.name, %phase, "team run settled");
                return Ok(run.team.snapshot()?);
            }

            self.post_assignments(run, now).await?;
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    fn sweep_heartbeats(&self, run: &TeamRun, now: u64) -> Result<(), CoordError> {
        for record in run.team.list_workers()? {
            if record.heartbeat_expired(now, self.options.heartbeat_deadline_ms) {
                tracing::warn!(team = %run.config.name, worker = %record.id, "heartbeat deadline missed");
                run.team.set_worker_status(&record.id, WorkerStatus::Unresponsive)?;
            }
        }
        Ok(())
    }

    fn drain_acks(&self, run: &TeamRun) -> Result<(), CoordError> {
        for entry in run.team.take_undelivered(&MailAddress::Leader)? {
            match TeamMessage::parse(&entry.body) {
                Some(TeamMessage::Ack { task, completed }) => {
                    tracing::debug!(team = %run.config.name, %task, completed, from = %entry.from, "ack");
                }
                other => {
                    tracing::debug!(team = %run.config.name, ?other, "unexpected leader mail ignored");
                }
            }
        }
        Ok(())
    }

    /// Point idle workers at eligible tasks. Claims are first-come, so an
    /// assignment that loses the race is simply refused downstream.
    async fn post_assignments(&self, run: &TeamRun, now: u64) -> Result<(), CoordError> {
        let tasks = run.team.list_tasks()?;
        let completed: std::collections::HashSet<TaskId> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect();
        let eligible: Vec<TaskId> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && t.deps_satisfied(&completed))
            .map(|t| t.id)
            .collect();
        if eligible.is_empty() {
            return Ok(());
        }

        let idle: Vec<WorkerId> = run
            .team
            .list_workers()?
            .into_iter()
            .filter(|w| w.status == WorkerStatus::Idle)
            .map(|w| w.id)
            .collect();

        for (task, worker_id) in eligible.into_iter().zip(idle) {
            let message = TeamMessage::Assign { task };
            run.team.post(&MailboxEntry::new(
                MailAddress::Leader,
                MailAddress::Worker(worker_id.clone()),
                message.to_body(),
                now,
            ))?;
            if let Some((_, handle)) = run.workers.iter().find(|(id, _)| *id == worker_id) {
                // Best effort: a worker that misses the nudge polls anyway.
                if let Err(e) = self.processes.send_input(handle, "wake").await {
                    tracing::debug!(worker = %worker_id, error = %e, "wake nudge failed");
                }
            }
        }
        Ok(())
    }

    /// Stop every worker. Graceful shutdown posts `Shutdown` and waits up
    /// to the grace window for workers to exit on their own; an abort
    /// terminates immediately.
    pub async fn shutdown(&self, run: &TeamRun, abort: bool) -> Result<(), CoordError> {
        run.team.set_phase(TeamPhase::ShuttingDown)?;
        let now = self.clock.epoch_ms();
        for (worker_id, handle) in &run.workers {
            run.team.post(&MailboxEntry::new(
                MailAddress::Leader,
                MailAddress::Worker(worker_id.clone()),
                TeamMessage::Shutdown.to_body(),
                now,
            ))?;
            if let Err(e) = self.processes.send_input(handle, "wake").await {
                tracing::debug!(worker = %worker_id, error = %e, "shutdown nudge failed");
            }
        }

        if !abort {
            let deadline = tokio::time::Instant::now() + self.options.grace;
            loop {
                let mut alive = false;
                for (_, handle) in &run.workers {
                    if self.processes.is_alive(handle).await {
                        alive = true;
                        break;
                    }
                }
                if !alive || tokio::time::Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }

        let grace = if abort { Duration::ZERO } else { self.options.grace };
        for (worker_id, handle) in &run.workers {
            if let Err(e) = self.processes.terminate(handle, grace).await {
                tracing::warn!(worker = %worker_id, error = %e, "terminate failed");
            }
            run.team.set_worker_status(worker_id, WorkerStatus::Exited)?;
        }
        tracing::info!(team = %run.config.name, abort, "team shut down");
        Ok(())
    }

    /// Status query for a team by name.
    pub fn status(&self, name: &str) -> Result<TeamSnapshot, CoordError> {
        Ok(TeamStore::load(&self.teams_root, name)?.snapshot()?)
    }

    /// Reattach to an existing team after a coordinator restart.
    ///
    /// Worker process handles are rebuilt from the registry; liveness is
    /// whatever the adapter reports for them. The budget restarts from the
    /// resume point.
    pub fn resume(&self, name: &str) -> Result<TeamRun, CoordError> {
        let team = TeamStore::load(&self.teams_root, name)?;
        let config = team.manifest()?;
        let workers = team
            .list_workers()?
            .into_iter()
            .filter_map(|record| {
                let handle = record.process_handle?;
                Some((record.id, ProcessHandle { id: handle, pid: None }))
            })
            .collect();
        Ok(TeamRun { config, team, workers, started_at_ms: self.clock.epoch_ms() })
    }
}

/// Drive one team-mode job from `queued` to a terminal status.
pub async fn run_team_job<Q, P, C>(
    lifecycle: &Lifecycle<Q, C>,
    coordinator: &Coordinator<P, C>,
    id: &JobId,
) -> Result<Job, CoordError>
where
    Q: QueueAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    let job = lifecycle.mark_running(id)?;
    let budget = Duration::from_millis(job.options.team_budget_ms);
    let run = match coordinator.start(&job).await {
        Ok(run) => run,
        Err(e) => {
            lifecycle.finalize(id, JobStatus::Failed, None, Some(e.to_string()))?;
            return Err(e);
        }
    };

    match coordinator.run_until_complete(&run, budget).await {
        Ok(snapshot) => {
            let current = lifecycle.job(id)?;
            if current.is_terminal() {
                // Canceled (or otherwise finished) out from under the run.
                return Ok(current);
            }
            if snapshot.metrics.is_clean() {
                let output = snapshot
                    .tasks
                    .iter()
                    .rev()
                    .find(|t| t.status == TaskStatus::Completed)
                    .and_then(|t| t.result.clone());
                lifecycle.finalize(id, JobStatus::Succeeded, output, None)
            } else {
                let unresolved: Vec<String> =
                    snapshot.unresolved().iter().map(|t| t.to_string()).collect();
                lifecycle.finalize(
                    id,
                    JobStatus::Failed,
                    None,
                    Some(format!("tasks failed or blocked: {}", unresolved.join(", "))),
                )
            }
        }
        Err(e) => {
            if let Err(fe) =
                lifecycle.finalize(id, JobStatus::Failed, None, Some(e.to_string()))
            {
                tracing::warn!(job_id = %id, error = %fe, "finalize after team failure refused");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
