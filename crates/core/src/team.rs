// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Team: the decomposition of one job into a task graph executed by N
//! worker processes.

use crate::job::{Job, JobOptions};
use crate::task::{Task, TaskId, TaskStatus};
use crate::worker::WorkerRecord;
use serde::{Deserialize, Serialize};

/// Roles of the fixed task-graph template, in execution order.
pub const DEFAULT_ROLES: [&str; 4] = ["planner", "researcher", "implementer", "verifier"];

/// Fallback model designation per role, used when neither an explicit
/// override nor an inherited default is configured.
fn role_model_fallback(role: &str) -> &'static str {
    match role {
        "planner" => "sonnet",
        "researcher" => "haiku",
        "verifier" => "haiku",
        _ => "sonnet",
    }
}

/// Derive the team name deterministically from a job.
///
/// The task description is reduced to a short `[a-z0-9-]` slug; the job id
/// suffix keeps names collision-resistant across jobs with similar tasks.
pub fn team_name(job: &Job) -> String {
    let mut slug = String::new();
    for c in job.task.chars().take(48) {
        if slug.len() >= 20 {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        format!("crew-{}", job.id.short(8))
    } else {
        format!("crew-{}-{}", slug, job.id.short(8))
    }
}

/// Resolve the model designation for a role.
///
/// Precedence: explicit per-role override > inherited job default >
/// role-based fallback.
pub fn resolve_model(role: &str, options: &JobOptions) -> String {
    if let Some(m) = options.model_overrides.get(role) {
        return m.clone();
    }
    if let Some(m) = &options.default_model {
        return m.clone();
    }
    role_model_fallback(role).to_string()
}

/// Team configuration written to the team manifest at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub job_id: crate::job::JobId,
    pub worker_count: u32,
    /// Role assigned to each worker slot, by index.
    pub roles: Vec<String>,
    pub task_timeout_ms: u64,
    pub team_budget_ms: u64,
}

impl TeamConfig {
    pub fn for_job(job: &Job) -> Self {
        let worker_count = job.options.worker_count.max(1);
        let roles = (0..worker_count)
            .map(|n| DEFAULT_ROLES[n as usize % DEFAULT_ROLES.len()].to_string())
            .collect();
        Self {
            name: team_name(job),
            job_id: job.id.clone(),
            worker_count,
            roles,
            task_timeout_ms: job.options.task_timeout_ms,
            team_budget_ms: job.options.team_budget_ms,
        }
    }
}

/// Build the fixed planner→research→implement→verify task template.
pub fn template_tasks(job: &Job, epoch_ms: u64) -> Vec<Task> {
    DEFAULT_ROLES
        .iter()
        .enumerate()
        .map(|(n, role)| {
            let deps = if n == 0 {
                Vec::new()
            } else {
                vec![TaskId(n as u32 - 1)]
            };
            Task::new(
                n as u32,
                *role,
                format!("{role}: {}", job.task),
                deps,
                job.options.task_timeout_ms,
                job.options.max_attempts,
                epoch_ms,
            )
        })
        .collect()
}

/// Task graph for a job: the caller's plan when one was submitted,
/// otherwise the fixed role template.
pub fn job_tasks(job: &Job, epoch_ms: u64) -> Vec<Task> {
    if job.options.plan.is_empty() {
        return template_tasks(job, epoch_ms);
    }
    job.options
        .plan
        .iter()
        .enumerate()
        .map(|(n, planned)| {
            Task::new(
                n as u32,
                &planned.role,
                planned.description.clone(),
                planned.depends_on.iter().copied().map(TaskId).collect(),
                job.options.task_timeout_ms,
                job.options.max_attempts,
                epoch_ms,
            )
        })
        .collect()
}

/// Counts of tasks by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub pending: usize,
    pub claimed: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl TaskMetrics {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut m = TaskMetrics::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => m.pending += 1,
                TaskStatus::Claimed => m.claimed += 1,
                TaskStatus::InProgress => m.in_progress += 1,
                TaskStatus::Completed => m.completed += 1,
                TaskStatus::Failed => m.failed += 1,
                TaskStatus::Blocked => m.blocked += 1,
            }
        }
        m
    }

    /// Completion condition: nothing pending or held.
    ///
    /// Tasks in `failed`/`blocked` do not keep the team running; whether
    /// the run counts as a success is decided by [`TaskMetrics::is_clean`].
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.claimed == 0 && self.in_progress == 0
    }

    /// True when every task completed (success condition).
    pub fn is_clean(&self) -> bool {
        self.is_settled() && self.failed == 0 && self.blocked == 0
    }
}

/// Phase of a team run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamPhase {
    Starting,
    Running,
    ShuttingDown,
    Done,
    Failed,
}

crate::simple_display! {
    TeamPhase {
        Starting => "starting",
        Running => "running",
        ShuttingDown => "shutting_down",
        Done => "done",
        Failed => "failed",
    }
}

/// Point-in-time view of a team, returned by the status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub name: String,
    pub phase: TeamPhase,
    /// Most recently claimed or started task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskId>,
    pub metrics: TaskMetrics,
    pub tasks: Vec<Task>,
    pub workers: Vec<WorkerRecord>,
}

impl TeamSnapshot {
    /// Tasks that keep the team from completing cleanly.
    pub fn unresolved(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| !matches!(t.status, TaskStatus::Completed))
            .map(|t| t.id)
            .collect()
    }
}

#[cfg(test)]
#[path = "team_tests.rs"]
mod tests;
