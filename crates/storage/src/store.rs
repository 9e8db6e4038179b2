// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable job record store.
//!
//! One directory per job holding the record (`job.json`), its append-only
//! event log (`events.jsonl`), and the advisory lock marker (`job.lock`).
//! The record is mutated only through [`JobStore::update`]; nothing else is
//! permitted to write `job.json` directly.

use crate::lock::{LockError, LockGuard, LockOptions};
use crate::util::{read_json, write_json_atomic};
use crewd_core::{CoordError, Job, JobEvent, JobId};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from job store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    /// Operation invalid for the record's current state.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("record unreadable: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for CoordError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => CoordError::NotFound(what),
            StoreError::AlreadyExists(id) => CoordError::Conflict(format!("job exists: {id}")),
            StoreError::Conflict(msg) => CoordError::Conflict(msg),
            StoreError::Corrupt(msg) => CoordError::Corrupt(msg),
            StoreError::Lock(LockError::Busy(msg)) => CoordError::Busy(msg),
            StoreError::Lock(LockError::Io(e)) => CoordError::Io(e),
            StoreError::Io(e) => CoordError::Io(e),
            StoreError::Json(e) => CoordError::Json(e),
        }
    }
}

/// Mapping from an idempotency key to the job it created.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdempotencyRecord {
    pub job_id: JobId,
    /// Canonical serialization of the creating request; a repeat of the key
    /// with a different fingerprint is a conflict.
    pub fingerprint: String,
}

/// File-backed store for job records and their event logs.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
    lock_options: LockOptions,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_options: LockOptions::default(),
        }
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join("jobs").join(id.as_str())
    }

    fn record_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join("job.json")
    }

    fn events_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join("events.jsonl")
    }

    fn lock_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join("job.lock")
    }

    /// Persist a freshly created job. Never clobbers an existing record.
    pub fn create(&self, job: &Job) -> Result<Job, StoreError> {
        let dir = self.job_dir(&job.id);
        fs::create_dir_all(&dir)?;
        let path = self.record_path(&job.id);
        if path.exists() {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        write_json_atomic(&path, job)?;
        tracing::debug!(job_id = %job.id, "job record created");
        Ok(job.clone())
    }

    /// Read a job record.
    ///
    /// Unknown status/approval values normalize to safe defaults during
    /// deserialization; a file that is not JSON at all is `Corrupt`.
    pub fn read(&self, id: &JobId) -> Result<Job, StoreError> {
        match read_json::<Job>(&self.record_path(id))? {
            None => Err(StoreError::NotFound(id.to_string())),
            Some(Ok(job)) => Ok(job),
            Some(Err(e)) => Err(StoreError::Corrupt(format!("{id}: {e}"))),
        }
    }

    /// Atomic read-modify-write under the per-job lock.
    ///
    /// The closure sees the freshest persisted record; the result is written
    /// back via temp-file + rename before the lock is released.
    pub fn update<F>(&self, id: &JobId, now_ms: u64, f: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        self.try_update(id, now_ms, |job| {
            f(job);
            Ok(())
        })
    }

    /// Like [`JobStore::update`] but the closure may refuse the mutation.
    ///
    /// On `Err` nothing is written and the error propagates, so state-machine
    /// checks can run against the freshest record under the lock.
    pub fn try_update<F>(&self, id: &JobId, now_ms: u64, f: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), StoreError>,
    {
        let _guard = self.take_lock(id, now_ms)?;
        let mut job = self.read(id)?;
        f(&mut job)?;
        job.updated_at_ms = now_ms;
        write_json_atomic(&self.record_path(id), &job)?;
        Ok(job)
    }

    /// Append one event to the job's log. Events are never rewritten.
    pub fn append_event(
        &self,
        id: &JobId,
        event_type: &str,
        message: &str,
        payload: Option<serde_json::Value>,
        now_ms: u64,
    ) -> Result<JobEvent, StoreError> {
        if !self.record_path(id).exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let event = JobEvent::new(id.clone(), event_type, message, payload, now_ms);
        let _guard = self.take_lock(id, now_ms)?;
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path(id))?;
        file.write_all(line.as_bytes())?;
        tracing::debug!(job_id = %id, event_type, "event appended");
        Ok(event)
    }

    /// Most recent events in append order, at most `limit`.
    ///
    /// The sequence is finite and not restartable across calls; callers
    /// track their own cursor (e.g. by event id). A torn trailing line from
    /// an in-flight append parses as "no update yet" and is skipped.
    pub fn list_events(&self, id: &JobId, limit: usize) -> Result<Vec<JobEvent>, StoreError> {
        let data = match fs::read_to_string(self.events_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.record_path(id).exists() {
                    return Ok(Vec::new());
                }
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let events: Vec<JobEvent> = data
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let skip = events.len().saturating_sub(limit);
        Ok(events.into_iter().skip(skip).collect())
    }

    /// List every stored job id.
    pub fn list_ids(&self) -> Result<Vec<JobId>, StoreError> {
        let jobs_dir = self.root.join("jobs");
        let mut ids = Vec::new();
        let entries = match fs::read_dir(&jobs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                ids.push(JobId::from_string(name));
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    /// Root directory for team workspaces sharing this store's state dir.
    pub fn teams_root(&self) -> PathBuf {
        self.root.join("teams")
    }

    fn idempotency_path(&self, key: &str) -> PathBuf {
        let stem: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.root.join("idempotency").join(format!("{stem}.json"))
    }

    /// Look up an idempotency key: the job it created and the request
    /// fingerprint it was recorded with.
    pub fn idempotency_get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        match read_json::<IdempotencyRecord>(&self.idempotency_path(key))? {
            None => Ok(None),
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(StoreError::Corrupt(format!("idempotency {key}: {e}"))),
        }
    }

    /// Record an idempotency key. First writer wins; a concurrent duplicate
    /// is benign because both writers recorded the same fingerprint check.
    pub fn idempotency_put(
        &self,
        key: &str,
        job_id: &JobId,
        fingerprint: &str,
    ) -> Result<(), StoreError> {
        let path = self.idempotency_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record =
            IdempotencyRecord { job_id: job_id.clone(), fingerprint: fingerprint.to_string() };
        write_json_atomic(&path, &record)?;
        Ok(())
    }

    fn take_lock(&self, id: &JobId, now_ms: u64) -> Result<LockGuard, StoreError> {
        Ok(LockGuard::acquire(
            self.lock_path(id),
            &owner_tag(),
            now_ms,
            &self.lock_options,
        )?)
    }
}

/// Lock owner tag: process id plus thread id, for post-mortem debugging.
fn owner_tag() -> String {
    format!("{}/{:?}", std::process::id(), std::thread::current().id())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
