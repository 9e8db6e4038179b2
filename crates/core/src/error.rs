// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the coordination engine.
//!
//! Every crate maps its local errors into [`CoordError`] at the crate seam
//! so callers can branch on the category without knowing the source.

use thiserror::Error;

/// Error categories surfaced across crate boundaries.
#[derive(Debug, Error)]
pub enum CoordError {
    /// Unknown job, task, or worker id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Action is invalid for the current state (e.g. approving a job that
    /// is not waiting for approval). Never retried — indicates caller error.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lock contention exceeded the retry budget.
    #[error("busy: {0}")]
    Busy(String),

    /// Task, worker-readiness, or team-wide budget exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Agent invocation returned failure or produced no parsable result.
    #[error("external process failure: {0}")]
    ExternalProcessFailure(String),

    /// Persisted record unreadable and not recoverable by normalization.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoordError {
    /// True for errors a caller may retry with backoff.
    ///
    /// `Conflict` is deliberately excluded: it indicates a state-machine
    /// violation that retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoordError::Busy(_) | CoordError::Io(_))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
