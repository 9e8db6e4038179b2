// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory per-record locks.
//!
//! A lock is a marker file recording the owner and acquisition time. The
//! marker appears atomically with its full contents: the taker writes a
//! staging file and hard-links it into place, so no observer ever reads a
//! half-written marker from a live owner. Acquisition retries with a fixed
//! interval inside a bounded budget, then fails `Busy`.
//!
//! A marker older than the staleness threshold is presumed abandoned
//! (owner crashed) and reclaimed. Reclaim must not turn into a free-for-all
//! under contention: it runs under a short-lived reclaim mutex next to the
//! marker, and the marker is re-verified under that mutex before removal.
//! A marker whose contents no longer match what was judged stale was
//! re-created by a live owner in the meantime and is left untouched.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from lock acquisition
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock busy: {0}")]
    Busy(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tuning knobs for lock acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub retry_interval: Duration,
    /// Total time to keep retrying before giving up with `Busy`.
    pub retry_budget: Duration,
    /// Age past which a held lock is presumed abandoned.
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(25),
            retry_budget: Duration::from_secs(2),
            stale_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockMarker {
    owner: String,
    acquired_at_ms: u64,
}

/// Held lock. Removes the marker file on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}

impl LockGuard {
    /// Acquire the lock at `path`, retrying within the configured budget.
    pub fn acquire(
        path: PathBuf,
        owner: &str,
        now_ms: u64,
        options: &LockOptions,
    ) -> Result<Self, LockError> {
        let started = Instant::now();
        loop {
            match try_take(&path, owner, now_ms) {
                Ok(true) => return Ok(Self { path }),
                Ok(false) => {}
                Err(e) => return Err(e.into()),
            }

            // Lock held by someone else. Reclaim it if the marker is stale.
            if let Some(judged) = stale_contents(&path, now_ms, options.stale_after) {
                reclaim(&path, &judged, owner, now_ms, options);
                continue;
            }

            if started.elapsed() >= options.retry_budget {
                return Err(LockError::Busy(format!(
                    "could not acquire {} within {:?}",
                    path.display(),
                    options.retry_budget
                )));
            }
            std::thread::sleep(options.retry_interval);
        }
    }
}

/// Attempt a single atomic take. `Ok(false)` means the lock is held.
///
/// The marker is staged under a unique name and hard-linked to `path`:
/// link fails if the path exists, and the marker is never visible without
/// its full contents.
fn try_take(path: &Path, owner: &str, now_ms: u64) -> std::io::Result<bool> {
    let marker = LockMarker {
        owner: owner.to_string(),
        acquired_at_ms: now_ms,
    };
    let staging = side_path(path, "take");
    fs::write(&staging, serde_json::to_vec(&marker)?)?;
    let linked = fs::hard_link(&staging, path);
    let _ = fs::remove_file(&staging);
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// The marker's raw contents when it is judged stale, `None` otherwise.
/// An unparseable marker counts as stale: a crash left it torn.
fn stale_contents(path: &Path, now_ms: u64, stale_after: Duration) -> Option<String> {
    // Read failure means released or racing; the retry loop decides.
    let data = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<LockMarker>(&data) {
        Ok(marker)
            if now_ms.saturating_sub(marker.acquired_at_ms) > stale_after.as_millis() as u64 =>
        {
            Some(data)
        }
        Ok(_) => None,
        Err(_) => Some(data),
    }
}

/// Retire a marker previously judged stale.
///
/// Reclaimers serialize on a mutex marker next to the lock, then re-read
/// the lock under it: only a marker whose contents still match what was
/// judged stale is removed. A marker re-created by a live owner between
/// the staleness check and the mutex acquisition no longer matches and is
/// left untouched, so a waiter can never delete a live lock.
fn reclaim(path: &Path, judged: &str, owner: &str, now_ms: u64, options: &LockOptions) {
    let mutex = path.with_file_name(format!(
        "{}.reclaim",
        path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default()
    ));
    match try_take(&mutex, owner, now_ms) {
        Ok(true) => {}
        Ok(false) => {
            // A reclaimer that crashed holding the mutex would wedge the
            // lock forever; its marker ages out like any other.
            if stale_contents(&mutex, now_ms, options.stale_after).is_some() {
                let _ = fs::remove_file(&mutex);
            }
            return;
        }
        Err(_) => return,
    }
    if fs::read_to_string(path).map(|contents| contents == judged).unwrap_or(false) {
        tracing::warn!(path = %path.display(), "reclaiming stale lock");
        let _ = fs::remove_file(path);
    }
    let _ = fs::remove_file(&mutex);
}

/// Unique sibling path for staging files.
fn side_path(path: &Path, tag: &str) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{tag}-{}-{n}", std::process::id()))
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
