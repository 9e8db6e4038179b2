// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and state machine.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job instance.
    ///
    /// Each submitted job gets a unique ID used to track its state, query
    /// its status, and reference it in events and logs.
    pub struct JobId("job-");
}

/// Execution strategy for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// One agent process works the job end to end.
    #[default]
    Solo,
    /// A leader decomposes the job into a task graph executed by N workers.
    Team,
}

crate::simple_display! {
    JobMode {
        Solo => "solo",
        Team => "team",
    }
}

/// Status of a job.
///
/// Unknown persisted values normalize to `Queued` on read so that schema
/// drift never corrupts the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum JobStatus {
    Queued,
    Running,
    WaitingApproval,
    Succeeded,
    Failed,
    Canceled,
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "running" => JobStatus::Running,
            "waiting_approval" => JobStatus::WaitingApproval,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            "canceled" => JobStatus::Canceled,
            // "queued" and anything from a newer or older schema
            _ => JobStatus::Queued,
        }
    }
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Running => "running",
        WaitingApproval => "waiting_approval",
        Succeeded => "succeeded",
        Failed => "failed",
        Canceled => "canceled",
    }
}

impl JobStatus {
    /// Terminal states are final: no action may move a job out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Canceled` is reachable from any non-terminal state.
    pub fn allows(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Canceled {
            return true;
        }
        match self {
            JobStatus::Queued => matches!(next, JobStatus::Running | JobStatus::Failed),
            JobStatus::Running => matches!(
                next,
                JobStatus::WaitingApproval | JobStatus::Succeeded | JobStatus::Failed
            ),
            JobStatus::WaitingApproval => matches!(next, JobStatus::Queued | JobStatus::Failed),
            _ => false,
        }
    }
}

/// Approval gate state.
///
/// `Required` implies the job is, or was, `waiting_approval`. Unknown
/// persisted values normalize to `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ApprovalState {
    #[default]
    None,
    Required,
    Approved,
    Rejected,
}

impl From<String> for ApprovalState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "required" => ApprovalState::Required,
            "approved" => ApprovalState::Approved,
            "rejected" => ApprovalState::Rejected,
            _ => ApprovalState::None,
        }
    }
}

crate::simple_display! {
    ApprovalState {
        None => "none",
        Required => "required",
        Approved => "approved",
        Rejected => "rejected",
    }
}

/// Actions a caller may apply to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Cancel,
    Approve,
    Reject,
}

crate::simple_display! {
    JobAction {
        Cancel => "cancel",
        Approve => "approve",
        Reject => "reject",
    }
}

/// Recognized job options with documented defaults.
///
/// Unrecognized keys land in `extra` for forward compatibility; they are
/// carried but never interpreted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Number of worker processes in team mode.
    #[serde(default = "defaults::worker_count")]
    pub worker_count: u32,
    /// Per-task execution timeout in milliseconds.
    #[serde(default = "defaults::task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Attempts before a task is failed and its dependents blocked.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    /// Overall wall-clock budget for a team run in milliseconds.
    #[serde(default = "defaults::team_budget_ms")]
    pub team_budget_ms: u64,
    /// When true the job stops at the approval gate before executing.
    #[serde(default)]
    pub require_approval: bool,
    /// Model designation inherited by every role unless overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Explicit per-role model overrides (highest precedence).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub model_overrides: HashMap<String, String>,
    /// Caller-supplied task graph. When empty the fixed role template
    /// is used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<crate::task::PlannedTask>,
    /// Unrecognized option keys, preserved verbatim.
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

mod defaults {
    pub fn worker_count() -> u32 {
        3
    }
    pub fn task_timeout_ms() -> u64 {
        300_000
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn team_budget_ms() -> u64 {
        3_600_000
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            worker_count: defaults::worker_count(),
            task_timeout_ms: defaults::task_timeout_ms(),
            max_attempts: defaults::max_attempts(),
            team_budget_ms: defaults::team_budget_ms(),
            require_approval: false,
            default_model: None,
            model_overrides: HashMap::new(),
            plan: Vec::new(),
            extra: HashMap::new(),
        }
    }
}

/// Configuration for creating a new job
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub id: JobId,
    pub provider: String,
    pub mode: JobMode,
    pub repo: String,
    pub git_ref: String,
    pub task: String,
    pub options: JobOptions,
}

impl JobConfig {
    pub fn builder(provider: impl Into<String>, task: impl Into<String>) -> JobConfigBuilder {
        JobConfigBuilder {
            id: JobId::new(),
            provider: provider.into(),
            mode: JobMode::Solo,
            repo: String::new(),
            git_ref: "main".to_string(),
            task: task.into(),
            options: JobOptions::default(),
        }
    }
}

pub struct JobConfigBuilder {
    id: JobId,
    provider: String,
    mode: JobMode,
    repo: String,
    git_ref: String,
    task: String,
    options: JobOptions,
}

impl JobConfigBuilder {
    crate::setters! {
        into {
            repo: String,
            git_ref: String,
        }
        set {
            id: JobId,
            mode: JobMode,
            options: JobOptions,
        }
    }

    pub fn build(self) -> JobConfig {
        JobConfig {
            id: self.id,
            provider: self.provider,
            mode: self.mode,
            repo: self.repo,
            git_ref: self.git_ref,
            task: self.task,
            options: self.options,
        }
    }
}

/// A job record: one client-submitted unit of orchestrated work.
///
/// Mutated only through the store's locked update path. Invariant:
/// `finished_at` is set if and only if the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Which agent backend executes this job.
    pub provider: String,
    #[serde(default)]
    pub mode: JobMode,
    pub repo: String,
    pub git_ref: String,
    /// Task description (the goal handed to the agent).
    pub task: String,
    #[serde(default)]
    pub options: JobOptions,
    pub status: JobStatus,
    #[serde(default)]
    pub approval: ApprovalState,
    /// Free-form result produced by the final agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl Job {
    /// Create a new queued job from a config.
    pub fn new(config: JobConfig, clock: &impl Clock) -> Self {
        let now = clock.epoch_ms();
        let approval = if config.options.require_approval {
            ApprovalState::Required
        } else {
            ApprovalState::None
        };
        Self {
            id: config.id,
            provider: config.provider,
            mode: config.mode,
            repo: config.repo,
            git_ref: config.git_ref,
            task: config.task,
            options: config.options,
            status: JobStatus::Queued,
            approval,
            output: None,
            error: None,
            created_at_ms: now,
            updated_at_ms: now,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to a terminal status, stamping `finished_at_ms`.
    pub fn finish(&mut self, status: JobStatus, error: Option<String>, epoch_ms: u64) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.error = error;
        self.updated_at_ms = epoch_ms;
        self.finished_at_ms = Some(epoch_ms);
    }

    /// Move to a non-terminal status.
    pub fn advance(&mut self, status: JobStatus, epoch_ms: u64) {
        debug_assert!(!status.is_terminal());
        if status == JobStatus::Running && self.started_at_ms.is_none() {
            self.started_at_ms = Some(epoch_ms);
        }
        self.status = status;
        self.updated_at_ms = epoch_ms;
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            provider: String = "claude",
            repo: String = "git@example.com:acme/app.git",
            git_ref: String = "main",
            task: String = "test task",
        }
        set {
            id: JobId = JobId::from_string("job-test0000000000000001"),
            mode: JobMode = JobMode::Solo,
            options: JobOptions = JobOptions::default(),
            status: JobStatus = JobStatus::Queued,
            approval: ApprovalState = ApprovalState::None,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            output: serde_json::Value = None,
            error: String = None,
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
