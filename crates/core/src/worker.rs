// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identifier and registry record.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a worker process, formatted `<team>/worker-<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a new WorkerId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the canonical id for slot `n` of a team.
    pub fn for_slot(team: &str, n: u32) -> Self {
        Self(format!("{team}/worker-{n}"))
    }

    /// Get the string value of this WorkerId.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Team name component, if the id is well-formed.
    pub fn team(&self) -> Option<&str> {
        self.0.split_once('/').map(|(team, _)| team)
    }

    /// Worker slot index, if the id is well-formed.
    pub fn slot(&self) -> Option<u32> {
        self.0
            .rsplit_once("worker-")
            .and_then(|(_, n)| n.parse().ok())
    }

    /// Filesystem-safe form of the id (`/` replaced).
    pub fn file_stem(&self) -> String {
        self.0.replace('/', "--")
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Liveness status of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    /// Missed a heartbeat deadline or failed the readiness probe.
    Unresponsive,
    /// Confirmed shutdown.
    Exited,
}

crate::simple_display! {
    WorkerStatus {
        Idle => "idle",
        Busy => "busy",
        Unresponsive => "unresponsive",
        Exited => "exited",
    }
}

/// Registry record for one spawned worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub role: String,
    pub status: WorkerStatus,
    /// Epoch-ms of the most recent heartbeat.
    pub last_heartbeat_ms: u64,
    /// Opaque handle of the underlying process/session, if still attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_handle: Option<String>,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, role: impl Into<String>, epoch_ms: u64) -> Self {
        Self {
            id,
            role: role.into(),
            status: WorkerStatus::Idle,
            last_heartbeat_ms: epoch_ms,
            process_handle: None,
        }
    }

    /// True when the heartbeat deadline has been missed.
    pub fn heartbeat_expired(&self, now_ms: u64, deadline_ms: u64) -> bool {
        matches!(self.status, WorkerStatus::Idle | WorkerStatus::Busy)
            && now_ms.saturating_sub(self.last_heartbeat_ms) > deadline_ms
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
