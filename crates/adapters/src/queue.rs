// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue backends: how submitted jobs reach workers.
//!
//! Two implementations share one trait. [`BrokerQueue`] publishes the job id
//! to a networked broker (at-least-once, fire-and-forget); [`FileQueue`]
//! drops a descriptor file under `pending/` and lets workers claim work with
//! an atomic rename into `processing/`. Enqueue is idempotent in both: a job
//! id already queued or claimed is a no-op.

use async_trait::async_trait;
use crewd_core::{CoordError, JobId};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QueueError> for CoordError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::PublishFailed(msg) => CoordError::Busy(msg),
            QueueError::Io(e) => CoordError::Io(e),
        }
    }
}

/// Adapter for handing a job id to the worker side.
#[async_trait]
pub trait QueueAdapter: Send + Sync + 'static {
    /// Enqueue a job for pickup. Idempotent: enqueueing an id that is
    /// already queued or claimed is a no-op.
    async fn enqueue(&self, job_id: &JobId) -> Result<(), QueueError>;
}

#[async_trait]
impl QueueAdapter for Box<dyn QueueAdapter> {
    async fn enqueue(&self, job_id: &JobId) -> Result<(), QueueError> {
        (**self).enqueue(job_id).await
    }
}

/// Client half of a networked broker. Injected so the transport stays out
/// of the queue logic.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), QueueError>;
}

/// Queue backed by a networked broker.
///
/// Delivery is at-least-once; consumers deduplicate by job id. A publish
/// failure surfaces to the caller, but the job record stays `queued` and a
/// later re-enqueue (or the file fallback) picks it up.
pub struct BrokerQueue<C> {
    client: C,
    topic: String,
}

impl<C: BrokerClient> BrokerQueue<C> {
    pub fn new(client: C, topic: impl Into<String>) -> Self {
        Self { client, topic: topic.into() }
    }
}

#[async_trait]
impl<C: BrokerClient> QueueAdapter for BrokerQueue<C> {
    async fn enqueue(&self, job_id: &JobId) -> Result<(), QueueError> {
        self.client.publish(&self.topic, job_id.as_str()).await?;
        tracing::debug!(%job_id, topic = %self.topic, "job published");
        Ok(())
    }
}

/// Filesystem queue: `pending/<job-id>` descriptors claimed by renaming
/// into `processing/<job-id>`.
///
/// Rename is the sole claim operation, so at most one worker wins a given
/// descriptor and no lock is needed.
pub struct FileQueue {
    root: PathBuf,
}

impl FileQueue {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pending_dir(&self) -> PathBuf {
        self.root.join("pending")
    }

    fn processing_dir(&self) -> PathBuf {
        self.root.join("processing")
    }

    /// Claim the oldest pending job, if any.
    ///
    /// A rename that fails because the descriptor vanished means another
    /// worker won that race; the next candidate is tried.
    pub fn poll_claim(&self) -> Result<Option<JobId>, QueueError> {
        let mut names: Vec<String> = match fs::read_dir(self.pending_dir()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        names.sort();

        for name in names {
            fs::create_dir_all(self.processing_dir())?;
            match fs::rename(self.pending_dir().join(&name), self.processing_dir().join(&name)) {
                Ok(()) => {
                    tracing::debug!(job_id = %name, "job claimed from file queue");
                    return Ok(Some(JobId::from_string(name)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Remove the processing marker once the job reaches a terminal state.
    pub fn complete(&self, job_id: &JobId) -> Result<(), QueueError> {
        match fs::remove_file(self.processing_dir().join(job_id.as_str())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl QueueAdapter for FileQueue {
    async fn enqueue(&self, job_id: &JobId) -> Result<(), QueueError> {
        if self.processing_dir().join(job_id.as_str()).exists() {
            return Ok(());
        }
        fs::create_dir_all(self.pending_dir())?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.pending_dir().join(job_id.as_str()))
        {
            Ok(_) => {
                tracing::debug!(%job_id, "job enqueued to file queue");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pick the queue backend: the broker when a URL is configured, the file
/// fallback otherwise. A missing broker never blocks submission.
pub fn select_queue<C: BrokerClient>(
    broker_url: Option<&str>,
    state_dir: &Path,
    client: C,
) -> Box<dyn QueueAdapter> {
    match broker_url {
        Some(url) => {
            tracing::info!(%url, "using broker queue");
            Box::new(BrokerQueue::new(client, "crewd.jobs"))
        }
        None => {
            tracing::info!(dir = %state_dir.display(), "using file queue");
            Box::new(FileQueue::new(state_dir.join("queue")))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{BrokerClient, QueueError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FakeBrokerState {
        publishes: Vec<(String, String)>,
        fail: bool,
    }

    /// Fake broker client for testing
    #[derive(Clone)]
    pub struct FakeBroker {
        inner: Arc<Mutex<FakeBrokerState>>,
    }

    impl Default for FakeBroker {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeBrokerState { publishes: Vec::new(), fail: false })),
            }
        }
    }

    impl FakeBroker {
        pub fn new() -> Self {
            Self::default()
        }

        /// All recorded (topic, payload) publishes.
        pub fn publishes(&self) -> Vec<(String, String)> {
            self.inner.lock().publishes.clone()
        }

        /// Make subsequent publishes fail.
        pub fn set_failing(&self, fail: bool) {
            self.inner.lock().fail = fail;
        }
    }

    #[async_trait]
    impl BrokerClient for FakeBroker {
        async fn publish(&self, topic: &str, payload: &str) -> Result<(), QueueError> {
            let mut state = self.inner.lock();
            if state.fail {
                return Err(QueueError::PublishFailed("broker unreachable".to_string()));
            }
            state.publishes.push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBroker;

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
