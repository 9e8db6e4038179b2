// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task records: the schedulable units of a team's task graph.

use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Numeric task identifier, unique within one team.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl TaskId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaskId {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

/// Status of a task within its team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for claiming once all dependencies complete.
    Pending,
    /// A worker holds the claim but has not started executing.
    Claimed,
    /// The claiming worker is executing.
    InProgress,
    Completed,
    /// Attempts exhausted or unrecoverable error.
    Failed,
    /// A dependency failed permanently; this task will never run.
    Blocked,
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Claimed => "claimed",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Blocked => "blocked",
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Blocked
        )
    }

    /// True while a worker holds the task (claim-release semantics apply).
    pub fn is_held(&self) -> bool {
        matches!(self, TaskStatus::Claimed | TaskStatus::InProgress)
    }
}

/// One caller-declared task in a job submission. Dependencies refer to
/// positions in the submitted list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub role: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

/// One schedulable unit within a team.
///
/// Invariants: the status can only advance into `Claimed` when every
/// dependency is `Completed`, and at most one worker holds a
/// `Claimed`/`InProgress` task at a time. Both are enforced by the team
/// store's locked claim path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Which capability executes this task (planner, researcher, ...).
    pub role: String,
    /// Short description handed to the executing agent.
    pub description: String,
    /// Task ids that must reach `Completed` before this one can be claimed.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    pub max_attempts: u32,
    /// Worker currently holding the claim, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    /// Per-claim execution timeout in milliseconds.
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at_ms: Option<u64>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        role: impl Into<String>,
        description: impl Into<String>,
        depends_on: Vec<TaskId>,
        timeout_ms: u64,
        max_attempts: u32,
        epoch_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            description: description.into(),
            depends_on,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts,
            worker_id: None,
            timeout_ms,
            claimed_at_ms: None,
            created_at_ms: epoch_ms,
            finished_at_ms: None,
            result: None,
            error: None,
        }
    }

    /// True when every declared dependency appears in `completed`.
    pub fn deps_satisfied(&self, completed: &HashSet<TaskId>) -> bool {
        self.depends_on.iter().all(|d| completed.contains(d))
    }

    /// True when a held claim has outlived its timeout.
    pub fn claim_expired(&self, now_ms: u64) -> bool {
        match (self.status.is_held(), self.claimed_at_ms) {
            (true, Some(at)) => now_ms.saturating_sub(at) > self.timeout_ms,
            _ => false,
        }
    }

    /// Release a held claim back to `Pending`, counting the attempt.
    pub fn release_claim(&mut self) {
        self.status = TaskStatus::Pending;
        self.worker_id = None;
        self.claimed_at_ms = None;
        self.attempts += 1;
    }

    /// True when the attempt budget is exhausted.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
