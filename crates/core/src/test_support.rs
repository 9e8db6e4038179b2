// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers and proptest strategies.

use crate::task::{Task, TaskId};

/// Build a pending task with test defaults.
pub fn test_task(id: u32, deps: &[u32]) -> Task {
    Task::new(
        id,
        "implementer",
        format!("task {id}"),
        deps.iter().copied().map(TaskId).collect(),
        60_000,
        3,
        1_000_000,
    )
}

/// Proptest strategies for domain types.
pub mod strategies {
    use crate::job::JobStatus;
    use crate::task::TaskStatus;
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Queued),
            Just(JobStatus::Running),
            Just(JobStatus::WaitingApproval),
            Just(JobStatus::Succeeded),
            Just(JobStatus::Failed),
            Just(JobStatus::Canceled),
        ]
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::Claimed),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::Completed),
            Just(TaskStatus::Failed),
            Just(TaskStatus::Blocked),
        ]
    }
}
