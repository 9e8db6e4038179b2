// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Team directory store: tasks, worker registry, and mailboxes for one team.
//!
//! Layout under `<teams_root>/<team>/`:
//!
//! ```text
//! manifest.toml          task graph + role assignments + worker count
//! phase.json             current team phase
//! tasks/<n>.json         one record per task (+ <n>.lock while updating)
//! workers/<stem>.json    worker registry, single writer per file
//! mail/<stem>/<ts>-<id>.json   per-recipient mailbox entries
//! ```
//!
//! Task claims are serialized per task via a lock marker; different tasks
//! may be claimed concurrently by different workers. Worker and mailbox
//! files each have exactly one logical writer, so they are written with a
//! plain atomic rename and read lock-free. Readers treat a parse failure of
//! an in-flight file as "no update yet", never as fatal.

use crate::lock::{LockGuard, LockOptions};
use crate::store::StoreError;
use crate::util::{read_json, write_json_atomic};
use crewd_core::{
    MailAddress, MailboxEntry, Task, TaskId, TaskMetrics, TaskStatus, TeamConfig, TeamPhase,
    TeamSnapshot, WorkerId, WorkerRecord, WorkerStatus,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File-backed store for one team's coordination state.
#[derive(Debug, Clone)]
pub struct TeamStore {
    dir: PathBuf,
    name: String,
    lock_options: LockOptions,
}

impl TeamStore {
    /// Create the team directory, manifest, and initial task graph.
    pub fn init(
        teams_root: &Path,
        config: &TeamConfig,
        tasks: &[Task],
    ) -> Result<Self, StoreError> {
        let store = Self {
            dir: teams_root.join(&config.name),
            name: config.name.clone(),
            lock_options: LockOptions::default(),
        };
        fs::create_dir_all(store.dir.join("tasks"))?;
        fs::create_dir_all(store.dir.join("workers"))?;
        fs::create_dir_all(store.dir.join("mail"))?;

        let manifest = toml::to_string_pretty(config)
            .map_err(|e| StoreError::Corrupt(format!("manifest encode: {e}")))?;
        fs::write(store.dir.join("manifest.toml"), manifest)?;
        write_json_atomic(&store.dir.join("phase.json"), &TeamPhase::Starting)?;

        for task in tasks {
            write_json_atomic(&store.task_path(task.id), task)?;
        }
        tracing::info!(team = %config.name, tasks = tasks.len(), "team initialized");
        Ok(store)
    }

    /// Reconnect to an existing team without re-deriving its task graph.
    pub fn load(teams_root: &Path, name: &str) -> Result<Self, StoreError> {
        let dir = teams_root.join(name);
        if !dir.join("manifest.toml").exists() {
            return Err(StoreError::NotFound(format!("team: {name}")));
        }
        Ok(Self {
            dir,
            name: name.to_string(),
            lock_options: LockOptions::default(),
        })
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest(&self) -> Result<TeamConfig, StoreError> {
        let data = fs::read_to_string(self.dir.join("manifest.toml"))?;
        toml::from_str(&data).map_err(|e| StoreError::Corrupt(format!("manifest: {e}")))
    }

    // ---- phase ----

    pub fn set_phase(&self, phase: TeamPhase) -> Result<(), StoreError> {
        benign(write_json_atomic(&self.dir.join("phase.json"), &phase))
    }

    /// Current phase; a missing or torn file reads as `Starting`.
    pub fn phase(&self) -> TeamPhase {
        read_json::<TeamPhase>(&self.dir.join("phase.json"))
            .ok()
            .flatten()
            .and_then(|r| r.ok())
            .unwrap_or(TeamPhase::Starting)
    }

    // ---- tasks ----

    fn task_path(&self, id: TaskId) -> PathBuf {
        self.dir.join("tasks").join(format!("{id}.json"))
    }

    fn task_lock_path(&self, id: TaskId) -> PathBuf {
        self.dir.join("tasks").join(format!("{id}.lock"))
    }

    pub fn task(&self, id: TaskId) -> Result<Task, StoreError> {
        match read_json::<Task>(&self.task_path(id))? {
            None => Err(StoreError::NotFound(format!("task: {}/{id}", self.name))),
            Some(Ok(task)) => Ok(task),
            Some(Err(e)) => Err(StoreError::Corrupt(format!("task {id}: {e}"))),
        }
    }

    /// All tasks in id order. In-flight (torn) files are skipped.
    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = Vec::new();
        for entry in fs::read_dir(self.dir.join("tasks"))? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(Some(Ok(task))) = read_json::<Task>(&path) {
                tasks.push(task);
            }
        }
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    fn completed_ids(&self) -> Result<HashSet<TaskId>, StoreError> {
        Ok(self
            .list_tasks()?
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect())
    }

    /// Claim a pending task for a worker: a compare-and-set guarded by the
    /// task's lock, so at most one claimant wins.
    ///
    /// Refused with `Conflict` when the task is not `Pending` or any
    /// dependency has not completed.
    pub fn claim_task(
        &self,
        id: TaskId,
        worker: &WorkerId,
        now_ms: u64,
    ) -> Result<Task, StoreError> {
        let _guard = self.take_task_lock(id, now_ms)?;
        let mut task = self.task(id)?;
        if task.status != TaskStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "task {id} is {}, not pending",
                task.status
            )));
        }
        if !task.deps_satisfied(&self.completed_ids()?) {
            return Err(StoreError::Conflict(format!(
                "task {id} has incomplete dependencies"
            )));
        }
        task.status = TaskStatus::Claimed;
        task.worker_id = Some(worker.clone());
        task.claimed_at_ms = Some(now_ms);
        write_json_atomic(&self.task_path(id), &task)?;
        tracing::debug!(team = %self.name, task = %id, worker = %worker, "task claimed");
        Ok(task)
    }

    /// Move a claimed task to `InProgress`. Only the claim holder may start.
    pub fn start_task(&self, id: TaskId, worker: &WorkerId, now_ms: u64) -> Result<Task, StoreError> {
        let _guard = self.take_task_lock(id, now_ms)?;
        let mut task = self.task(id)?;
        if task.status != TaskStatus::Claimed || task.worker_id.as_ref() != Some(worker) {
            return Err(StoreError::Conflict(format!(
                "task {id} not claimed by {worker}"
            )));
        }
        task.status = TaskStatus::InProgress;
        write_json_atomic(&self.task_path(id), &task)?;
        Ok(task)
    }

    /// Record a successful result. Idempotent for the completing worker, so
    /// a duplicate completion message is benign.
    pub fn complete_task(
        &self,
        id: TaskId,
        worker: &WorkerId,
        result: Option<serde_json::Value>,
        now_ms: u64,
    ) -> Result<Task, StoreError> {
        let _guard = self.take_task_lock(id, now_ms)?;
        let mut task = self.task(id)?;
        if task.status == TaskStatus::Completed && task.worker_id.as_ref() == Some(worker) {
            return Ok(task);
        }
        if !task.status.is_held() || task.worker_id.as_ref() != Some(worker) {
            return Err(StoreError::Conflict(format!(
                "task {id} not held by {worker}"
            )));
        }
        task.status = TaskStatus::Completed;
        task.result = result;
        task.finished_at_ms = Some(now_ms);
        write_json_atomic(&self.task_path(id), &task)?;
        tracing::debug!(team = %self.name, task = %id, "task completed");
        Ok(task)
    }

    /// Record a failed attempt. Below the attempt limit the claim is
    /// released back to `Pending`; at the limit the task fails permanently
    /// and every task depending on it becomes `Blocked`.
    pub fn fail_task(
        &self,
        id: TaskId,
        worker: &WorkerId,
        error: &str,
        now_ms: u64,
    ) -> Result<Task, StoreError> {
        let failed = {
            let _guard = self.take_task_lock(id, now_ms)?;
            let mut task = self.task(id)?;
            if !task.status.is_held() || task.worker_id.as_ref() != Some(worker) {
                return Err(StoreError::Conflict(format!(
                    "task {id} not held by {worker}"
                )));
            }
            task.error = Some(error.to_string());
            task.release_claim();
            let failed = task.attempts_exhausted();
            if failed {
                task.status = TaskStatus::Failed;
                task.finished_at_ms = Some(now_ms);
            }
            write_json_atomic(&self.task_path(id), &task)?;
            tracing::warn!(
                team = %self.name, task = %id, attempts = task.attempts,
                permanent = failed, "task attempt failed"
            );
            failed
        };
        if failed {
            self.propagate_blocked(now_ms)?;
        }
        self.task(id)
    }

    /// Return expired claims to `Pending`, counting the attempt. Tasks that
    /// exhaust their attempts transition to `Failed` and block dependents.
    pub fn release_expired_claims(&self, now_ms: u64) -> Result<Vec<TaskId>, StoreError> {
        let mut released = Vec::new();
        let mut any_failed = false;
        for task in self.list_tasks()? {
            if !task.claim_expired(now_ms) {
                continue;
            }
            let _guard = self.take_task_lock(task.id, now_ms)?;
            // Re-read under the lock; the worker may have finished just now.
            let mut task = self.task(task.id)?;
            if !task.claim_expired(now_ms) {
                continue;
            }
            let worker = task.worker_id.clone();
            task.release_claim();
            if task.attempts_exhausted() {
                task.status = TaskStatus::Failed;
                task.finished_at_ms = Some(now_ms);
                task.error
                    .get_or_insert_with(|| "claim timeout: attempts exhausted".to_string());
                any_failed = true;
            }
            write_json_atomic(&self.task_path(task.id), &task)?;
            tracing::warn!(
                team = %self.name, task = %task.id,
                worker = worker.as_ref().map(|w| w.as_str()).unwrap_or("-"),
                "expired claim released"
            );
            released.push(task.id);
        }
        if any_failed {
            self.propagate_blocked(now_ms)?;
        }
        Ok(released)
    }

    /// Mark every task depending (transitively) on a permanently failed
    /// task as `Blocked`.
    fn propagate_blocked(&self, now_ms: u64) -> Result<(), StoreError> {
        loop {
            let tasks = self.list_tasks()?;
            let dead: HashSet<TaskId> = tasks
                .iter()
                .filter(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Blocked))
                .map(|t| t.id)
                .collect();
            let next = tasks.into_iter().find(|t| {
                t.status == TaskStatus::Pending && t.depends_on.iter().any(|d| dead.contains(d))
            });
            let Some(mut task) = next else {
                return Ok(());
            };
            let _guard = self.take_task_lock(task.id, now_ms)?;
            task = self.task(task.id)?;
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Blocked;
                task.finished_at_ms = Some(now_ms);
                write_json_atomic(&self.task_path(task.id), &task)?;
                tracing::warn!(team = %self.name, task = %task.id, "task blocked by failed dependency");
            }
        }
    }

    // ---- workers ----

    fn worker_path(&self, id: &WorkerId) -> PathBuf {
        self.dir.join("workers").join(format!("{}.json", id.file_stem()))
    }

    /// Write a worker record. Benign if the team directory is already gone
    /// (a late write racing shutdown).
    pub fn upsert_worker(&self, record: &WorkerRecord) -> Result<(), StoreError> {
        benign(write_json_atomic(&self.worker_path(&record.id), record))
    }

    pub fn worker(&self, id: &WorkerId) -> Result<WorkerRecord, StoreError> {
        match read_json::<WorkerRecord>(&self.worker_path(id))? {
            None => Err(StoreError::NotFound(format!("worker: {id}"))),
            Some(Ok(record)) => Ok(record),
            Some(Err(e)) => Err(StoreError::Corrupt(format!("worker {id}: {e}"))),
        }
    }

    pub fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        let mut workers = Vec::new();
        let entries = match fs::read_dir(self.dir.join("workers")) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(workers),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            if let Ok(Some(Ok(record))) = read_json::<WorkerRecord>(&entry?.path()) {
                workers.push(record);
            }
        }
        workers.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(workers)
    }

    /// Refresh a worker's heartbeat timestamp (and optionally its status).
    pub fn record_heartbeat(
        &self,
        id: &WorkerId,
        status: Option<WorkerStatus>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let mut record = match self.worker(id) {
            Ok(record) => record,
            // Team directory already torn down; the heartbeat is moot.
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        record.last_heartbeat_ms = now_ms;
        if let Some(status) = status {
            record.status = status;
        }
        self.upsert_worker(&record)
    }

    pub fn set_worker_status(&self, id: &WorkerId, status: WorkerStatus) -> Result<(), StoreError> {
        let mut record = match self.worker(id) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        record.status = status;
        self.upsert_worker(&record)
    }

    // ---- mailboxes ----

    fn mail_dir(&self, addr: &MailAddress) -> PathBuf {
        self.dir.join("mail").join(addr.file_stem())
    }

    /// Append a message to the recipient's mailbox.
    pub fn post(&self, entry: &MailboxEntry) -> Result<(), StoreError> {
        if !self.dir.exists() {
            return Ok(()); // team torn down; late post is benign
        }
        let dir = self.mail_dir(&entry.to);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{:013}-{}.json", entry.created_at_ms, entry.id.suffix()));
        benign(write_json_atomic(&path, entry))
    }

    /// Take undelivered messages for a recipient, in posting order, marking
    /// each delivered. Receivers deduplicate by entry id, so re-delivery
    /// after a crash between read and mark is harmless.
    pub fn take_undelivered(&self, addr: &MailAddress) -> Result<Vec<MailboxEntry>, StoreError> {
        let dir = self.mail_dir(addr);
        let mut paths: Vec<PathBuf> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        paths.sort();

        let mut taken = Vec::new();
        for path in paths {
            let Ok(Some(Ok(mut entry))) = read_json::<MailboxEntry>(&path) else {
                continue; // in-flight write, pick it up next poll
            };
            if entry.delivered {
                continue;
            }
            entry.delivered = true;
            write_json_atomic(&path, &entry)?;
            taken.push(entry);
        }
        Ok(taken)
    }

    // ---- aggregate views ----

    pub fn metrics(&self) -> Result<TaskMetrics, StoreError> {
        Ok(TaskMetrics::from_tasks(&self.list_tasks()?))
    }

    /// Point-in-time snapshot for the status query.
    pub fn snapshot(&self) -> Result<TeamSnapshot, StoreError> {
        let tasks = self.list_tasks()?;
        let current_task = tasks
            .iter()
            .filter(|t| t.status.is_held())
            .max_by_key(|t| t.claimed_at_ms)
            .map(|t| t.id);
        Ok(TeamSnapshot {
            name: self.name.clone(),
            phase: self.phase(),
            current_task,
            metrics: TaskMetrics::from_tasks(&tasks),
            tasks,
            workers: self.list_workers()?,
        })
    }

    /// Tear down the team directory. Idempotent.
    pub fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn take_task_lock(&self, id: TaskId, now_ms: u64) -> Result<LockGuard, StoreError> {
        Ok(LockGuard::acquire(
            self.task_lock_path(id),
            &format!("{}", std::process::id()),
            now_ms,
            &self.lock_options,
        )?)
    }
}

/// Map "directory vanished" to success for write paths racing shutdown.
fn benign(result: std::io::Result<()>) -> Result<(), StoreError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("late write after team teardown ignored");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "team_dir_tests.rs"]
mod tests;
